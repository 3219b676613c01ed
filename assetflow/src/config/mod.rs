//! Project and build configuration.
//!
//! [`ProjectConfig`] and [`BuildConfig`] mirror the on-disk project file.
//! [`ResolvedBuild`] is the validated form every pipeline is built from.

mod build;
mod project;
mod resolve;

pub use build::{
    BasePathSetting, BuildConfig, BundleSetting, CompileSetting, CssOptions, HtmlOptions,
    JsOptions,
};
pub use project::{ModuleResolution, ProjectConfig};
pub use resolve::{
    default_bundler_options, merge_bundler_options, normalize_base_path, BundlerOptions,
    CompileTarget, JsOptimizeOptions, OptimizeOptions, ResolvedBuild, BUILD_DIRECTORY,
};
