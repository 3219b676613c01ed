//! Completion gate: the single future that settles one build.

use super::sink::DirectorySink;
use crate::cancellation::CancellationToken;
use crate::errors::{BuildError, BuildResult};
use crate::events::{EventSink, BUILD_COMPLETED, BUILD_FAILED, BUILD_STARTED};
use crate::observability::BuildTimer;
use crate::stream::RecordStream;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// Build name.
    pub build: String,
    /// Directory the build wrote to.
    pub output_dir: PathBuf,
    /// Logical paths written, in write order.
    pub files: Vec<String>,
    /// Total bytes written.
    pub bytes: u64,
    /// When the build started.
    pub started_at: DateTime<Utc>,
    /// When the sink finished.
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: f64,
}

/// Handle on a running build.
///
/// The build runs on its own task from the moment the gate is created;
/// [`CompletionGate::wait`] resolves once every record has been written, or
/// rejects with the first error anywhere upstream.
#[derive(Debug)]
pub struct CompletionGate {
    build: String,
    run_id: Uuid,
    token: Arc<CancellationToken>,
    handle: JoinHandle<BuildResult<BuildReport>>,
}

impl CompletionGate {
    /// Starts draining `records` into `sink`.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(
        build: impl Into<String>,
        records: RecordStream,
        sink: DirectorySink,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let build = build.into();
        let run_id = Uuid::now_v7();
        let token = Arc::new(CancellationToken::new());
        let run = BuildRun {
            build: build.clone(),
            run_id,
            events,
            sink: sink.with_cancellation(token.clone()),
        };
        let handle = tokio::spawn(run.execute(records, token.clone()));
        Self {
            build,
            run_id,
            token,
            handle,
        }
    }

    /// Build name.
    #[must_use]
    pub fn build(&self) -> &str {
        &self.build
    }

    /// Identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Requests cancellation; the gate then rejects with
    /// [`BuildError::Cancelled`] unless the build already settled.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns true once the build has settled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the build to settle.
    ///
    /// # Errors
    ///
    /// Returns the first error of the build.
    pub async fn wait(self) -> BuildResult<BuildReport> {
        self.handle
            .await
            .map_err(|e| BuildError::Internal(format!("build '{}' task failed: {e}", self.build)))?
    }
}

struct BuildRun {
    build: String,
    run_id: Uuid,
    events: Arc<dyn EventSink>,
    sink: DirectorySink,
}

impl BuildRun {
    async fn execute(
        self,
        records: RecordStream,
        token: Arc<CancellationToken>,
    ) -> BuildResult<BuildReport> {
        let timer = BuildTimer::start(&self.build);

        let mut started = false;
        let build = self.build.clone();
        let events = self.events.clone();
        let run_id = self.run_id;
        let records = records
            .inspect(move |item| {
                if !started && item.is_ok() {
                    started = true;
                    info!(build = %build, "({build}) Building...");
                    events.try_emit(BUILD_STARTED, Some(json!({"build": build, "run_id": run_id})));
                }
            })
            .boxed();

        let outcome = tokio::select! {
            drained = self.sink.drain(records) => drained,
            () = token.cancelled() => Err(BuildError::Cancelled(
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            )),
        };

        let started_at = timer.started_at();
        let (finished_at, duration_ms) = timer.finish();
        match outcome {
            Ok(sink) => {
                info!(
                    build = %self.build,
                    files = sink.files.len(),
                    duration_ms,
                    "({}) Build complete!",
                    self.build
                );
                self.events
                    .emit(
                        BUILD_COMPLETED,
                        Some(json!({
                            "build": self.build,
                            "run_id": self.run_id,
                            "files": sink.files.len(),
                            "bytes": sink.bytes,
                            "duration_ms": duration_ms,
                        })),
                    )
                    .await;
                Ok(BuildReport {
                    run_id: self.run_id,
                    build: self.build,
                    output_dir: self.sink.output_dir().to_path_buf(),
                    files: sink.files,
                    bytes: sink.bytes,
                    started_at,
                    finished_at,
                    duration_ms,
                })
            }
            Err(err) => {
                error!(build = %self.build, error = %err, "({}) Build failed", self.build);
                let mut payload = json!({
                    "build": self.build,
                    "run_id": self.run_id,
                    "error": err.to_string(),
                    "category": err.category(),
                });
                if let Some(info) = err.error_info() {
                    payload["error_info"] = info.to_json();
                }
                self.events.emit(BUILD_FAILED, Some(payload)).await;
                Err(err)
            }
        }
    }
}
