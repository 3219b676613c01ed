//! # Assetflow
//!
//! A streaming build pipeline for static web assets.
//!
//! A project's source files and installed dependencies are read once, forked
//! per build configuration, and pushed through an ordered chain of stages
//! before being written to that build's output directory:
//!
//! - **Isolation**: every build gets its own copy of every record
//! - **HTML splitting**: inline scripts and styles are optimized as files and
//!   folded back into their documents
//! - **Optional stages**: legacy-syntax adapter, bundler, prefetch links,
//!   base path rewriting and a push manifest, in a fixed order
//! - **Completion gate**: one future per build that settles after the last
//!   write, or with the first error
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use assetflow::prelude::*;
//!
//! let config = ProjectConfig::new("./my-app")
//!     .with_build(BuildConfig::named("es5").with_js(JsOptions::compile("es5")));
//! let toolchain = Toolchain::new().with_optimizer(Arc::new(my_optimizer));
//!
//! let report = build_project(config, toolchain).await?;
//! println!("wrote {} files to {}", report.files.len(), report.output_dir.display());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod project;
pub mod source;
pub mod stages;
pub mod stream;
pub mod testing;
pub mod toolchain;

pub use project::{build_project, Project};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        BasePathSetting, BuildConfig, BundleSetting, CompileTarget, JsOptions, OptimizeOptions,
        ProjectConfig, ResolvedBuild,
    };
    pub use crate::core::{ContentKind, FileRecord, RecordOrigin};
    pub use crate::errors::{
        BuildError, BuildResult, ConfigError, DuplicatePathError, ErrorCategory, ErrorInfo,
        OrphanedExtractError, UnsafePathError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_logging;
    pub use crate::pipeline::{BuildReport, CompletionGate, PipelineBuilder, StagePlan, StageSlot};
    pub use crate::project::{build_project, Project};
    pub use crate::source::{AssetSource, FsAssetSource};
    pub use crate::stages::{RecordTransform, Stage};
    pub use crate::stream::RecordStream;
    pub use crate::toolchain::{Bundler, OptimizeOp, Optimizer, StandardOptimizer, Toolchain};
    pub use std::sync::Arc;
}
