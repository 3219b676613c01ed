//! Testing utilities for assetflow builds.
//!
//! This module provides:
//! - An in-memory asset source
//! - Recording, failing and tagging stages
//! - Assertions over record lists and output trees

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_output_tree, assert_paths, read_output};
pub use fixtures::{es5_project, MemorySource};
pub use mocks::{FailingTransform, RecordingStage, SlowTransform, TaggingTransform};
