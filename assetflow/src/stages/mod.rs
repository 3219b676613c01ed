//! Stage trait and implementations.
//!
//! A stage consumes a [`RecordStream`] and produces another. Stages are pure
//! with respect to their input: a record that must change is rewritten on the
//! stage's own copy, never through a handle another consumer can see.

mod base_tag;
mod es5_adapter;
mod prefetch;
mod push_manifest;
mod splitter;

pub use base_tag::BaseTagUpdater;
pub use es5_adapter::{Es5AdapterInjector, ES5_ADAPTER_FILE, ES5_SHIM_ID};
pub use prefetch::PrefetchLinker;
pub use push_manifest::{PushManifestGenerator, PUSH_MANIFEST_PATH};
pub use splitter::{HtmlSplitter, RejoinStage, SplitStage};

use crate::core::FileRecord;
use crate::errors::BuildResult;
use crate::stream::{self, RecordStream};
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// `apply` only wires the stage into the stream; no record is touched until
/// the returned stream is polled.
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Composes this stage onto `input`.
    fn apply(&self, input: RecordStream) -> RecordStream;

    /// Returns true if the stage passes its input through untouched.
    fn is_identity(&self) -> bool {
        false
    }
}

/// The pass-through stage. Applying it returns the input stream itself.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
}

impl Identity {
    /// Creates a new identity stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for Identity {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        input
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Sequence composition of stages.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn Stage>>,
    boundary_capacity: Option<usize>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn then(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Runs each non-identity stage on its own task, handing records to the
    /// next stage over a bounded channel of `capacity`.
    #[must_use]
    pub fn with_task_boundaries(mut self, capacity: usize) -> Self {
        self.boundary_capacity = Some(capacity);
        self
    }

    /// Names of the stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages, identities included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        self.stages.iter().fold(input, |records, stage| {
            if stage.is_identity() {
                return records;
            }
            let output = stage.apply(records);
            match self.boundary_capacity {
                Some(capacity) => stream::decouple(output, capacity),
                None => output,
            }
        })
    }

    fn is_identity(&self) -> bool {
        self.stages.iter().all(|s| s.is_identity())
    }
}

/// A per-record rewrite, run by a [`TransformStage`].
#[async_trait]
pub trait RecordTransform: Send + Sync + Debug {
    /// Returns the name of the transform.
    fn name(&self) -> &str;

    /// Returns true if `record` should be transformed; others pass through.
    fn accepts(&self, record: &FileRecord) -> bool {
        let _ = record;
        true
    }

    /// Rewrites one record.
    async fn transform(&self, record: FileRecord) -> BuildResult<FileRecord>;
}

/// Runs a [`RecordTransform`] over every accepted record, keeping up to
/// `concurrency` records in flight while preserving order.
#[derive(Debug, Clone)]
pub struct TransformStage {
    transform: Arc<dyn RecordTransform>,
    concurrency: usize,
}

impl TransformStage {
    /// Creates a transform stage.
    #[must_use]
    pub fn new(transform: Arc<dyn RecordTransform>) -> Self {
        Self {
            transform,
            concurrency: 1,
        }
    }

    /// Sets the number of records transformed concurrently.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Stage for TransformStage {
    fn name(&self) -> &str {
        self.transform.name()
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let transform = self.transform.clone();
        input
            .map(move |item| {
                let transform = transform.clone();
                async move {
                    let record = item?;
                    if transform.accepts(&record) {
                        transform.transform(record).await
                    } else {
                        Ok(record)
                    }
                }
            })
            .buffered(self.concurrency)
            .boxed()
    }
}

/// A synchronous function-based transform.
pub struct FnTransform<F>
where
    F: Fn(FileRecord) -> BuildResult<FileRecord> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(FileRecord) -> BuildResult<FileRecord> + Send + Sync,
{
    /// Creates a new function-based transform.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTransform<F>
where
    F: Fn(FileRecord) -> BuildResult<FileRecord> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> RecordTransform for FnTransform<F>
where
    F: Fn(FileRecord) -> BuildResult<FileRecord> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, record: FileRecord) -> BuildResult<FileRecord> {
        (self.func)(record)
    }
}
