//! Pipeline builder with validation.

use super::plan::{StagePlan, StageSlot};
use crate::errors::{BuildResult, ConfigError, ErrorInfo};
use crate::stages::{BaseTagUpdater, Chain, HtmlSplitter, PrefetchLinker, PushManifestGenerator, Stage};
use crate::toolchain::Toolchain;
use std::sync::Arc;
use tracing::debug;

/// Builder for the stage chain of one build.
///
/// Stages are added slot by slot; a slot may appear at most once and only
/// after every slot that precedes it in the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The build name.
    name: String,
    /// Stages with their slots, in insertion order.
    stages: Vec<(StageSlot, Arc<dyn Stage>)>,
    /// Capacity of the hand-off between stage tasks, if decoupled.
    channel_capacity: Option<usize>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            channel_capacity: None,
        }
    }

    /// Runs every stage on its own task with bounded hand-offs of `capacity`.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Adds a stage in `slot`.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-007-STAGE_ORDER` if the slot repeats or comes before a
    /// slot already added.
    pub fn stage(mut self, slot: StageSlot, stage: Arc<dyn Stage>) -> Result<Self, ConfigError> {
        self.add_stage(slot, stage)?;
        Ok(self)
    }

    /// Adds a stage in `slot`.
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::stage`].
    pub fn add_stage(&mut self, slot: StageSlot, stage: Arc<dyn Stage>) -> Result<(), ConfigError> {
        if let Some((last, _)) = self.stages.last() {
            if slot.rank() <= last.rank() {
                return Err(ConfigError::new(
                    &self.name,
                    format!("stage '{slot}' cannot follow '{last}'"),
                    ErrorInfo::new("CONFIG-007-STAGE_ORDER", "Stage out of pipeline order")
                        .with_fix_hint("Add stages in pipeline order, each at most once.")
                        .with_context_entry("stage", slot.name())
                        .with_context_entry("previous", last.name()),
                ));
            }
        }
        debug!(build = %self.name, slot = slot.name(), stage = stage.name(), "Added stage");
        self.stages.push((slot, stage));
        Ok(())
    }

    /// Instantiates every slot of `plan` with the collaborators of `toolchain`.
    ///
    /// # Errors
    ///
    /// Fails if a collaborator is missing or rejects its options.
    pub fn from_plan(plan: &StagePlan, toolchain: &Toolchain) -> BuildResult<Self> {
        let mut builder =
            Self::new(&plan.build).with_channel_capacity(toolchain.settings.channel_capacity);
        let splitter = HtmlSplitter::new();
        for slot in &plan.slots {
            let stage = instantiate(&plan.build, slot, toolchain, &splitter)?;
            builder.add_stage(slot.clone(), stage)?;
        }
        Ok(builder)
    }

    /// Composes the stages into one chain.
    #[must_use]
    pub fn build(self) -> Chain {
        let chain = self
            .stages
            .into_iter()
            .fold(Chain::new(), |chain, (_, stage)| chain.then(stage));
        match self.channel_capacity {
            Some(capacity) => chain.with_task_boundaries(capacity),
            None => chain,
        }
    }

    /// Returns the build name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the slot names in order.
    #[must_use]
    pub fn slot_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(slot, _)| slot.name()).collect()
    }
}

fn instantiate(
    build: &str,
    slot: &StageSlot,
    toolchain: &Toolchain,
    splitter: &HtmlSplitter,
) -> BuildResult<Arc<dyn Stage>> {
    let stage: Arc<dyn Stage> = match slot {
        StageSlot::LegacyAdapter => toolchain.legacy_adapter_stage(),
        StageSlot::Bundler { options } => toolchain.bundler_stage(build, options)?,
        StageSlot::Split => Arc::new(splitter.split()),
        StageSlot::Optimize { options } => toolchain.optimizer_stage(options)?,
        StageSlot::Rejoin => Arc::new(splitter.rejoin()),
        StageSlot::PrefetchLinks { entrypoints } => {
            Arc::new(PrefetchLinker::new(entrypoints.iter().cloned()))
        }
        StageSlot::BasePath {
            entrypoint,
            base_path,
        } => Arc::new(BaseTagUpdater::new(entrypoint.clone(), base_path.clone()).stage()),
        StageSlot::PushManifest { entrypoints } => Arc::new(
            PushManifestGenerator::new(entrypoints.iter().cloned())
                .with_events(toolchain.events.clone()),
        ),
    };
    Ok(stage)
}
