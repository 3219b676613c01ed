//! Core domain model types for assetflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - File records and their content buffers
//! - Content kinds
//! - Logical path helpers and the reference scanner

mod kind;
pub mod paths;
mod record;
pub mod references;

pub use kind::ContentKind;
pub use record::{Content, ExtractOrigin, ExtractSlot, FileRecord, RecordOrigin};
pub use references::{DependencyGraph, Reference, ReferenceKind};
