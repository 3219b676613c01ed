//! Prefetch link insertion.

use super::Stage;
use crate::core::{paths, ContentKind, DependencyGraph, FileRecord};
use crate::errors::BuildResult;
use crate::stream::RecordStream;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Adds `<link rel="prefetch">` tags to entrypoint, shell and fragment
/// documents for every record they reach only indirectly.
///
/// Those documents are held back until the end of the stream, when the whole
/// reference graph is known; every other record passes straight through.
#[derive(Debug, Clone)]
pub struct PrefetchLinker {
    entrypoints: Arc<HashSet<String>>,
}

impl PrefetchLinker {
    /// Creates a linker for the given entrypoint paths.
    #[must_use]
    pub fn new(entrypoints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entrypoints: Arc::new(entrypoints.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Default)]
struct PrefetchState {
    graph: DependencyGraph,
    held: Vec<FileRecord>,
    failed: bool,
}

impl PrefetchState {
    fn observe(&mut self, record: FileRecord, entrypoints: &HashSet<String>) -> Option<FileRecord> {
        self.graph.observe(&record);
        if record.kind == ContentKind::Markup && entrypoints.contains(&record.path) {
            self.held.push(record);
            None
        } else {
            Some(record)
        }
    }

    fn finish(&mut self) -> Vec<BuildResult<FileRecord>> {
        if self.failed {
            return Vec::new();
        }
        std::mem::take(&mut self.held)
            .into_iter()
            .map(|mut record| {
                let direct: HashSet<String> = self
                    .graph
                    .direct(&record.path)
                    .into_iter()
                    .map(|r| r.path)
                    .collect();
                let hrefs: Vec<String> = self
                    .graph
                    .transitive(&record.path)
                    .into_iter()
                    .filter(|r| !direct.contains(&r.path))
                    .map(|r| paths::relative(&record.path, &r.path))
                    .collect();
                if hrefs.is_empty() {
                    return Ok(record);
                }
                let text = insert_links(record.text()?, &hrefs);
                debug!(path = %record.path, links = hrefs.len(), "Inserted prefetch links");
                record.set_text(text);
                Ok(record)
            })
            .collect()
    }
}

fn insert_links(document: &str, hrefs: &[String]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!("<link rel=\"prefetch\" href=\"{href}\">\n"))
        .collect();
    let lower = document.to_ascii_lowercase();
    let at = lower
        .find("</head>")
        .or_else(|| find_open_tag(&lower, "<body"))
        .unwrap_or(0);

    let mut out = String::with_capacity(document.len() + links.len());
    out.push_str(&document[..at]);
    out.push_str(&links);
    out.push_str(&document[at..]);
    out
}

/// Finds `tag` (such as `<body`) only where the tag name ends, so
/// `<body-wrapper>` is not taken for `<body>`.
fn find_open_tag(lower: &str, tag: &str) -> Option<usize> {
    lower.match_indices(tag).map(|(at, _)| at).find(|&at| {
        lower[at + tag.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
    })
}

impl Stage for PrefetchLinker {
    fn name(&self) -> &str {
        "prefetch-links"
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let state = Arc::new(Mutex::new(PrefetchState::default()));
        let entrypoints = self.entrypoints.clone();

        let observer = state.clone();
        let passthrough = input.filter_map(move |item| {
            let outcome = match item {
                Ok(record) => observer.lock().observe(record, &entrypoints).map(Ok),
                Err(e) => {
                    observer.lock().failed = true;
                    Some(Err(e))
                }
            };
            futures::future::ready(outcome)
        });
        let held = stream::once(async move { state.lock().finish() }).flat_map(stream::iter);

        passthrough.chain(held).boxed()
    }
}
