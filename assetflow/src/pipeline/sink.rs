//! Pipeline sink: persists records under an output directory.

use crate::cancellation::CancellationToken;
use crate::core::{paths, FileRecord, RecordOrigin};
use crate::errors::{BuildError, BuildResult, DuplicatePathError, OrphanedExtractError, UnsafePathError};
use crate::stream::RecordStream;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// What the sink wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    /// Logical paths written, in write order.
    pub files: Vec<String>,
    /// Total bytes written.
    pub bytes: u64,
}

impl SinkReport {
    /// Number of files written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Writes each terminal record to `<output_dir>/<logical path>`.
///
/// The first failure ends the drain; files already written stay on disk.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    output_dir: PathBuf,
    cancel: Option<Arc<CancellationToken>>,
}

impl DirectorySink {
    /// Creates a sink writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cancel: None,
        }
    }

    /// Stops draining once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination of a logical path.
    #[must_use]
    pub fn destination(&self, logical: &str) -> PathBuf {
        logical
            .split('/')
            .fold(self.output_dir.clone(), |dir, segment| dir.join(segment))
    }

    /// Writes every record of `records`, one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first upstream error, a duplicate or unsafe path, an extract
    /// that was never rejoined, a write failure, or cancellation.
    pub async fn drain(&self, mut records: RecordStream) -> BuildResult<SinkReport> {
        let mut seen: HashMap<String, RecordOrigin> = HashMap::new();
        let mut report = SinkReport::default();

        loop {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
                    return Err(BuildError::Cancelled(reason));
                }
            }
            let Some(item) = records.next().await else {
                break;
            };
            let record = item?;
            let logical = admit(&record, &mut seen)?;
            let bytes = self.write(&logical, &record).await?;
            report.bytes += bytes;
            report.files.push(logical);
        }

        debug!(
            output = %self.output_dir.display(),
            files = report.files.len(),
            bytes = report.bytes,
            "Sink drained"
        );
        Ok(report)
    }

    async fn write(&self, logical: &str, record: &FileRecord) -> BuildResult<u64> {
        let destination = self.destination(logical);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::io(parent, e))?;
        }
        tokio::fs::write(&destination, record.content.as_bytes())
            .await
            .map_err(|e| BuildError::io(&destination, e))?;
        trace!(path = %logical, bytes = record.content.len(), "Wrote record");
        Ok(record.content.len() as u64)
    }
}

/// Validates a record for writing and returns its normalized logical path.
fn admit(record: &FileRecord, seen: &mut HashMap<String, RecordOrigin>) -> BuildResult<String> {
    if let Some(origin) = &record.extract_of {
        return Err(OrphanedExtractError::new(
            &record.path,
            &origin.parent,
            "extract reached the sink without being rejoined",
        )
        .into());
    }
    let logical = paths::is_safe_relative(&record.path)
        .then(|| paths::normalize(&record.path))
        .flatten()
        .ok_or_else(|| UnsafePathError::new(&record.path))?;
    if let Some(first) = seen.get(&logical) {
        return Err(DuplicatePathError::new(&logical, first.to_string(), record.origin.to_string()).into());
    }
    seen.insert(logical.clone(), record.origin);
    Ok(logical)
}
