//! Pipeline construction and execution.
//!
//! This module provides:
//! - The declarative stage plan derived from a resolved build
//! - The builder that validates slot order and composes the stage chain
//! - The directory sink and the completion gate that settles a build

mod builder;
mod gate;
mod plan;
mod sink;

pub use builder::PipelineBuilder;
pub use gate::{BuildReport, CompletionGate};
pub use plan::{StagePlan, StageSlot};
pub use sink::{DirectorySink, SinkReport};
