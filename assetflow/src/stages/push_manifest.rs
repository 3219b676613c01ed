//! HTTP/2 push manifest generation.

use super::Stage;
use crate::core::{DependencyGraph, FileRecord, RecordOrigin};
use crate::errors::{BuildError, BuildResult};
use crate::events::{EventSink, MANIFEST_GENERATED};
use crate::stream::RecordStream;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Logical path of the generated manifest.
pub const PUSH_MANIFEST_PATH: &str = "push-manifest.json";

/// One pushed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEntry {
    /// Resource type (`script`, `style`, `document`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Push weight.
    pub weight: u8,
}

/// Document path to the resources pushed with it.
pub type PushManifest = BTreeMap<String, BTreeMap<String, PushEntry>>;

/// Passes every record through, then appends `push-manifest.json` listing the
/// transitive dependencies of each entrypoint, shell and fragment.
#[derive(Clone)]
pub struct PushManifestGenerator {
    entrypoints: Arc<Vec<String>>,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for PushManifestGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushManifestGenerator")
            .field("entrypoints", &self.entrypoints)
            .field("has_events", &self.events.is_some())
            .finish()
    }
}

impl PushManifestGenerator {
    /// Creates a generator for the given entrypoint paths.
    #[must_use]
    pub fn new(entrypoints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entrypoints: Arc::new(entrypoints.into_iter().map(Into::into).collect()),
            events: None,
        }
    }

    /// Reports the generated manifest to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the manifest from a complete reference graph.
    #[must_use]
    pub fn manifest(&self, graph: &DependencyGraph) -> PushManifest {
        self.entrypoints
            .iter()
            .filter(|entry| graph.contains(entry))
            .map(|entry| {
                let resources = graph
                    .transitive(entry)
                    .into_iter()
                    .map(|r| {
                        let entry = PushEntry {
                            kind: r.kind.as_str().to_string(),
                            weight: 1,
                        };
                        (r.path, entry)
                    })
                    .collect();
                (entry.clone(), resources)
            })
            .collect()
    }
}

fn manifest_record(manifest: &PushManifest) -> BuildResult<FileRecord> {
    let json = serde_json::to_string_pretty(manifest).map_err(|e| {
        BuildError::stage("push-manifest", format!("could not serialize manifest: {e}"))
    })?;
    Ok(FileRecord::new(PUSH_MANIFEST_PATH, json, RecordOrigin::Synthetic))
}

impl Stage for PushManifestGenerator {
    fn name(&self) -> &str {
        "push-manifest"
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let graph = Arc::new(Mutex::new(Some(DependencyGraph::new())));

        let observer = graph.clone();
        let passthrough = input.inspect(move |item| {
            let mut guard = observer.lock();
            match item {
                Ok(record) => {
                    if let Some(graph) = guard.as_mut() {
                        graph.observe(record);
                    }
                }
                Err(_) => *guard = None,
            }
        });

        let generator = self.clone();
        let manifest = stream::once(async move {
            let Some(graph) = graph.lock().take() else {
                return None;
            };
            let manifest = generator.manifest(&graph);
            let record = manifest_record(&manifest);
            if record.is_ok() {
                info!(documents = manifest.len(), "Generated {}", PUSH_MANIFEST_PATH);
                if let Some(events) = &generator.events {
                    events.try_emit(
                        MANIFEST_GENERATED,
                        Some(serde_json::json!({
                            "path": PUSH_MANIFEST_PATH,
                            "documents": manifest.len(),
                        })),
                    );
                }
            }
            Some(record)
        })
        .filter_map(futures::future::ready);

        passthrough.chain(manifest).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::stream::{collect_records, from_records};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn project() -> Vec<FileRecord> {
        vec![
            FileRecord::source(
                "index.html",
                "<link rel=\"stylesheet\" href=\"theme.css\"><script type=\"module\" src=\"src/app.js\"></script>",
            ),
            FileRecord::source("theme.css", "body { font: url(fonts/a.woff2); }"),
            FileRecord::source("src/app.js", "import './view.js';"),
            FileRecord::source("src/view.js", "export {};"),
        ]
    }

    #[tokio::test]
    async fn test_manifest_appended_after_records() {
        let events = Arc::new(CollectingEventSink::new());
        let generator = PushManifestGenerator::new(["index.html", "src/missing.html"])
            .with_events(events.clone());
        let out = collect_records(generator.apply(from_records(project()))).await.unwrap();

        assert_eq!(out.len(), 5);
        let manifest = out.last().unwrap();
        assert_eq!(manifest.path, PUSH_MANIFEST_PATH);
        assert_eq!(manifest.origin, RecordOrigin::Synthetic);

        let parsed: serde_json::Value = serde_json::from_str(manifest.text().unwrap()).unwrap();
        assert_eq!(
            parsed,
            json!({
                "index.html": {
                    "src/app.js": {"type": "script", "weight": 1},
                    "src/view.js": {"type": "script", "weight": 1},
                    "theme.css": {"type": "style", "weight": 1}
                }
            })
        );
        assert_eq!(events.payloads(MANIFEST_GENERATED), vec![json!({"path": PUSH_MANIFEST_PATH, "documents": 1})]);
    }

    #[tokio::test]
    async fn test_manifest_follows_inline_module_imports() {
        let records = vec![
            FileRecord::source(
                "index.html",
                "<script type=\"module\">import './src/my-app.js';</script>",
            ),
            FileRecord::source("src/my-app.js", "import './my-view.js';"),
            FileRecord::source("src/my-view.js", "export {};"),
        ];
        let out = collect_records(PushManifestGenerator::new(["index.html"]).apply(from_records(records)))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(out.last().unwrap().text().unwrap()).unwrap();
        assert_eq!(
            parsed,
            json!({
                "index.html": {
                    "src/my-app.js": {"type": "script", "weight": 1},
                    "src/my-view.js": {"type": "script", "weight": 1}
                }
            })
        );
    }

    #[tokio::test]
    async fn test_no_manifest_after_upstream_error() {
        let input = from_records(project())
            .chain(crate::stream::failed(BuildError::Internal("read failed".into())))
            .boxed();
        let mut out = PushManifestGenerator::new(["index.html"]).apply(input);
        let mut last = None;
        while let Some(item) = out.next().await {
            last = Some(item);
        }
        assert!(last.unwrap().is_err());
    }
}
