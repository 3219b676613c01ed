//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ContentKind, FileRecord};
use crate::errors::{BuildError, BuildResult};
use crate::stages::{RecordTransform, Stage};
use crate::stream::RecordStream;
use futures::StreamExt;

/// A pass-through stage that records every path it sees, in order.
#[derive(Debug, Clone)]
pub struct RecordingStage {
    name: String,
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Paths seen so far.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    /// Number of records seen.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Clears the recorded paths.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let seen = self.seen.clone();
        input
            .inspect(move |item| {
                if let Ok(record) = item {
                    seen.lock().push(record.path.clone());
                }
            })
            .boxed()
    }
}

/// A transform that fails on one logical path and passes everything else.
#[derive(Debug, Clone)]
pub struct FailingTransform {
    name: String,
    path: String,
    message: String,
}

impl FailingTransform {
    /// Creates a transform failing on `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl RecordTransform for FailingTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, record: FileRecord) -> BuildResult<FileRecord> {
        if record.path == self.path {
            Err(BuildError::stage(&self.name, &self.message))
        } else {
            Ok(record)
        }
    }
}

/// A transform that appends a marker to every record of one kind.
///
/// Stands in for real optimizer steps: the output shows which records the
/// step saw and in what order steps ran.
#[derive(Debug, Clone)]
pub struct TaggingTransform {
    name: String,
    kind: ContentKind,
    tag: String,
}

impl TaggingTransform {
    /// Creates a transform appending `tag` to records of `kind`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ContentKind, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            tag: tag.into(),
        }
    }

    /// Appends `/*tag*/` to scripts.
    #[must_use]
    pub fn script(tag: &str) -> Self {
        Self::new(format!("tag-{tag}"), ContentKind::Script, format!("/*{tag}*/"))
    }
}

#[async_trait]
impl RecordTransform for TaggingTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, record: &FileRecord) -> bool {
        record.kind == self.kind
    }

    async fn transform(&self, mut record: FileRecord) -> BuildResult<FileRecord> {
        let text = format!("{}{}", record.text()?, self.tag);
        record.set_text(text);
        Ok(record)
    }
}

/// A transform that sleeps before passing each record through.
///
/// Clones share their counters, so a test can keep one clone and hand the
/// other to a pipeline.
#[derive(Debug, Clone)]
pub struct SlowTransform {
    name: String,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl SlowTransform {
    /// Creates a transform delaying every record by `ms` milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(ms),
            in_flight: Arc::default(),
            peak: Arc::default(),
            finished: Arc::default(),
        }
    }

    /// The most records that were ever being transformed at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of records transformed so far.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordTransform for SlowTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, record: FileRecord) -> BuildResult<FileRecord> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::TransformStage;
    use crate::stream::{collect_records, from_records};

    fn records() -> Vec<FileRecord> {
        vec![
            FileRecord::source("index.html", "<p>"),
            FileRecord::source("app.js", "run()"),
        ]
    }

    #[tokio::test]
    async fn test_recording_stage() {
        let stage = RecordingStage::new("recorder");
        let out = collect_records(stage.apply(from_records(records()))).await.unwrap();
        assert_eq!(out, records());
        assert_eq!(stage.paths(), vec!["index.html", "app.js"]);
        assert_eq!(stage.record_count(), 2);

        stage.clear();
        assert_eq!(stage.record_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_transform() {
        let stage = TransformStage::new(Arc::new(FailingTransform::new("minify", "app.js", "parse error")));
        let err = collect_records(stage.apply(from_records(records()))).await.unwrap_err();
        assert_eq!(err.to_string(), "Stage 'minify' failed: parse error");
    }

    #[tokio::test]
    async fn test_tagging_transform_only_touches_kind() {
        let stage = TransformStage::new(Arc::new(TaggingTransform::script("es5")));
        let out = collect_records(stage.apply(from_records(records()))).await.unwrap();
        assert_eq!(out[0].text().unwrap(), "<p>");
        assert_eq!(out[1].text().unwrap(), "run()/*es5*/");
    }

    #[tokio::test]
    async fn test_slow_transform() {
        let slow = SlowTransform::with_delay_ms("slow", 20);
        let stage = TransformStage::new(Arc::new(slow.clone()));
        let start = std::time::Instant::now();
        let out = collect_records(stage.apply(from_records(records()))).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(slow.finished(), 2);
        assert_eq!(slow.peak_in_flight(), 1);
    }
}
