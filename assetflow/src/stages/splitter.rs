//! Document splitter and rejoiner.
//!
//! [`SplitStage`] lifts inline `<script>` and `<style>` bodies out of markup
//! documents into synthetic records so the optimizer sees them as ordinary
//! scripts and styles. [`RejoinStage`] folds the optimized bodies back in.
//! Both halves of one [`HtmlSplitter`] share a ledger of split documents;
//! every build gets its own splitter.

use super::Stage;
use crate::core::{ContentKind, ExtractOrigin, ExtractSlot, FileRecord, RecordOrigin};
use crate::errors::{BuildError, BuildResult, DuplicatePathError, OrphanedExtractError};
use crate::stream::RecordStream;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::debug;

fn script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)(<script\b[^>]*>)(.*?)</script\s*>").expect("static pattern")
    })
}

fn style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)(<style\b[^>]*>)(.*?)</style\s*>").expect("static pattern")
    })
}

#[derive(Debug, Default)]
struct Ledger {
    split: Mutex<HashMap<String, usize>>,
}

/// Creates matching split and rejoin stages for one build.
#[derive(Debug, Clone)]
pub struct HtmlSplitter {
    ledger: Arc<Ledger>,
    nonce: String,
}

impl Default for HtmlSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlSplitter {
    /// Creates a splitter with a fresh ledger and placeholder nonce.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(Ledger::default()),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// The splitting half.
    #[must_use]
    pub fn split(&self) -> SplitStage {
        SplitStage {
            splitter: self.clone(),
        }
    }

    /// The rejoining half.
    #[must_use]
    pub fn rejoin(&self) -> RejoinStage {
        RejoinStage {
            splitter: self.clone(),
        }
    }

    /// Number of documents split so far.
    #[must_use]
    pub fn split_documents(&self) -> usize {
        self.ledger.split.lock().len()
    }

    fn placeholder(&self, index: usize) -> String {
        format!("__ASSETFLOW_EXTRACT_{}_{index}__", self.nonce)
    }

    fn split_record(&self, mut record: FileRecord) -> Vec<FileRecord> {
        if record.kind != ContentKind::Markup || record.is_extract() || record.is_split() {
            return vec![record];
        }
        let content = record.content.clone();
        let Ok(text) = content.as_text() else {
            return vec![record];
        };
        let blocks = find_blocks(text);
        if blocks.is_empty() {
            return vec![record];
        }

        let mut document = String::with_capacity(text.len());
        let mut extracts = Vec::with_capacity(blocks.len());
        let mut cursor = 0;
        for (index, block) in blocks.iter().enumerate() {
            let path = format!(
                "{}_{}_{index}.{}",
                record.path,
                block.kind,
                block.kind.extension()
            );
            let placeholder = self.placeholder(index);
            document.push_str(&text[cursor..block.start]);
            document.push_str(&placeholder);
            cursor = block.end;

            let mut extract = FileRecord::new(
                path.clone(),
                &text[block.start..block.end],
                RecordOrigin::Synthetic,
            )
            .with_kind(block.kind);
            extract.extract_of = Some(ExtractOrigin {
                parent: record.path.clone(),
                index,
            });
            extracts.push(extract);
            record.extracts.push(ExtractSlot { path, placeholder });
        }
        document.push_str(&text[cursor..]);

        debug!(path = %record.path, extracts = extracts.len(), "Split document");
        self.ledger
            .split
            .lock()
            .insert(record.path.clone(), extracts.len());
        record.set_text(document);

        let mut out = Vec::with_capacity(extracts.len() + 1);
        out.push(record);
        out.extend(extracts);
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    kind: ContentKind,
    start: usize,
    end: usize,
}

/// Finds inline script and style bodies in source order, skipping empty
/// bodies, external scripts, non-JavaScript script types and anything nested
/// inside an earlier block.
fn find_blocks(text: &str) -> Vec<Block> {
    let scripts = script_pattern().captures_iter(text).filter_map(|caps| {
        let open = caps.get(1)?.as_str();
        if crate::core::references::attribute(open, "src").is_some() {
            return None;
        }
        let script_type = crate::core::references::attribute(open, "type");
        if !crate::core::references::is_javascript_type(script_type.as_deref()) {
            return None;
        }
        let body = caps.get(2)?;
        Some(Block {
            kind: ContentKind::Script,
            start: body.start(),
            end: body.end(),
        })
    });
    let styles = style_pattern().captures_iter(text).filter_map(|caps| {
        let body = caps.get(2)?;
        Some(Block {
            kind: ContentKind::Style,
            start: body.start(),
            end: body.end(),
        })
    });

    let mut candidates: Vec<Block> = scripts.chain(styles).collect();
    candidates.sort_by_key(|b| b.start);

    let mut blocks: Vec<Block> = Vec::with_capacity(candidates.len());
    let mut covered = 0;
    for block in candidates {
        if block.start < covered {
            continue;
        }
        covered = block.end;
        if !text[block.start..block.end].trim().is_empty() {
            blocks.push(block);
        }
    }
    blocks
}

/// Lifts inline blocks out of markup documents.
#[derive(Debug, Clone)]
pub struct SplitStage {
    splitter: HtmlSplitter,
}

impl Stage for SplitStage {
    fn name(&self) -> &str {
        "html-split"
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let splitter = self.splitter.clone();
        input
            .flat_map(move |item| {
                let items: Vec<BuildResult<FileRecord>> = match item {
                    Ok(record) => splitter.split_record(record).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed()
    }
}

/// Folds extracts back into the documents they were split from.
#[derive(Debug, Clone)]
pub struct RejoinStage {
    splitter: HtmlSplitter,
}

impl Stage for RejoinStage {
    fn name(&self) -> &str {
        "html-rejoin"
    }

    fn apply(&self, input: RecordStream) -> RecordStream {
        let state = Rejoiner::new(self.splitter.ledger.clone());
        stream::unfold(Some((input, state)), |current| async move {
            let (mut input, mut state) = current?;
            loop {
                match input.next().await {
                    Some(Ok(record)) => match state.accept(record) {
                        Ok(ready) if ready.is_empty() => {}
                        Ok(ready) => {
                            let items: Vec<BuildResult<FileRecord>> =
                                ready.into_iter().map(Ok).collect();
                            return Some((items, Some((input, state))));
                        }
                        Err(e) => return Some((vec![Err(e)], None)),
                    },
                    Some(Err(e)) => return Some((vec![Err(e)], None)),
                    None => {
                        return match state.finish() {
                            Ok(()) => None,
                            Err(e) => Some((vec![Err(e)], None)),
                        }
                    }
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

#[derive(Debug)]
struct PendingDocument {
    record: FileRecord,
    bodies: Vec<Option<String>>,
}

impl PendingDocument {
    fn is_complete(&self) -> bool {
        self.bodies.iter().all(Option::is_some)
    }

    fn assemble(mut self) -> BuildResult<FileRecord> {
        let mut text = self.record.text()?.to_string();
        for (slot, body) in self.record.extracts.iter().zip(self.bodies) {
            let body = body.unwrap_or_default();
            if !text.contains(&slot.placeholder) {
                return Err(OrphanedExtractError::new(
                    &slot.path,
                    &self.record.path,
                    "placeholder was removed from the parent document",
                )
                .into());
            }
            text = text.replacen(&slot.placeholder, &body, 1);
        }
        self.record.extracts.clear();
        self.record.set_text(text);
        Ok(self.record)
    }
}

#[derive(Debug)]
struct Rejoiner {
    ledger: Arc<Ledger>,
    pending: HashMap<String, PendingDocument>,
    early: HashMap<String, Vec<FileRecord>>,
    emitted: HashSet<String>,
}

impl Rejoiner {
    fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            pending: HashMap::new(),
            early: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// Takes one record and returns the records ready to move on.
    fn accept(&mut self, record: FileRecord) -> BuildResult<Vec<FileRecord>> {
        if let Some(origin) = record.extract_of.clone() {
            return self.accept_extract(record, &origin);
        }
        if !record.is_split() {
            return Ok(vec![record]);
        }

        let path = record.path.clone();
        if self.pending.contains_key(&path) || self.emitted.contains(&path) {
            return Err(DuplicatePathError::new(&path, "split document", "split document").into());
        }
        let bodies = vec![None; record.extracts.len()];
        self.pending.insert(
            path.clone(),
            PendingDocument { record, bodies },
        );
        for extract in self.early.remove(&path).unwrap_or_default() {
            let origin = extract
                .extract_of
                .clone()
                .ok_or_else(|| BuildError::Internal("buffered extract lost its origin".into()))?;
            self.fill(extract, &origin)?;
        }
        self.complete(&path)
    }

    fn accept_extract(
        &mut self,
        extract: FileRecord,
        origin: &ExtractOrigin,
    ) -> BuildResult<Vec<FileRecord>> {
        if self.emitted.contains(&origin.parent) {
            return Err(OrphanedExtractError::new(
                &extract.path,
                &origin.parent,
                "parent document was already emitted",
            )
            .into());
        }
        if self.pending.contains_key(&origin.parent) {
            self.fill(extract, origin)?;
            return self.complete(&origin.parent);
        }
        if !self.ledger.split.lock().contains_key(&origin.parent) {
            return Err(OrphanedExtractError::new(
                &extract.path,
                &origin.parent,
                "parent document was never split",
            )
            .into());
        }
        self.early
            .entry(origin.parent.clone())
            .or_default()
            .push(extract);
        Ok(Vec::new())
    }

    fn fill(&mut self, extract: FileRecord, origin: &ExtractOrigin) -> BuildResult<()> {
        let Some(document) = self.pending.get_mut(&origin.parent) else {
            return Err(OrphanedExtractError::new(
                &extract.path,
                &origin.parent,
                "parent document is missing",
            )
            .into());
        };
        let Some(slot) = document.bodies.get_mut(origin.index) else {
            return Err(OrphanedExtractError::new(
                &extract.path,
                &origin.parent,
                format!("parent has no extract slot {}", origin.index),
            )
            .into());
        };
        if slot.is_some() {
            return Err(
                DuplicatePathError::new(&extract.path, "extract", "extract").into(),
            );
        }
        *slot = Some(extract.text()?.to_string());
        Ok(())
    }

    fn complete(&mut self, parent: &str) -> BuildResult<Vec<FileRecord>> {
        if !self.pending.get(parent).is_some_and(PendingDocument::is_complete) {
            return Ok(Vec::new());
        }
        let Some(document) = self.pending.remove(parent) else {
            return Ok(Vec::new());
        };
        self.emitted.insert(parent.to_string());
        Ok(vec![document.assemble()?])
    }

    /// Fails if anything is still waiting at end of stream.
    fn finish(&mut self) -> BuildResult<()> {
        if let Some((parent, extracts)) = self.early.iter().next() {
            let extract = extracts.first().map_or("", |e| e.path.as_str());
            return Err(OrphanedExtractError::new(
                extract,
                parent,
                "parent document never reached the rejoiner",
            )
            .into());
        }
        if let Some((parent, document)) = self.pending.iter().next() {
            let missing = document
                .record
                .extracts
                .iter()
                .zip(&document.bodies)
                .find(|(_, body)| body.is_none())
                .map_or("", |(slot, _)| slot.path.as_str());
            return Err(OrphanedExtractError::new(
                missing,
                parent,
                "extract was dropped before the rejoiner",
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::stream::{collect_records, from_records};
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <style>
    body { margin: 0; }
  </style>
  <script src="node_modules/loader.js"></script>
  <script type="application/ld+json">{"@type": "WebSite"}</script>
</head>
<body>
  <my-app></my-app>
  <script type="module">
    import './src/my-app.js';
  </script>
  <script>   </script>
  <script>window.ready = true;</script>
</body>
</html>
"#;

    async fn split_all(splitter: &HtmlSplitter, records: Vec<FileRecord>) -> Vec<FileRecord> {
        collect_records(splitter.split().apply(from_records(records)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_split_extracts_inline_blocks_in_source_order() {
        let splitter = HtmlSplitter::new();
        let out = split_all(&splitter, vec![FileRecord::source("index.html", PAGE)]).await;

        let paths: Vec<&str> = out.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "index.html",
                "index.html_style_0.css",
                "index.html_script_1.js",
                "index.html_script_2.js",
            ]
        );
        assert_eq!(out[1].kind, ContentKind::Style);
        assert_eq!(out[2].kind, ContentKind::Script);
        assert_eq!(out[3].text().unwrap(), "window.ready = true;");
        assert_eq!(
            out[2].extract_of,
            Some(ExtractOrigin {
                parent: "index.html".into(),
                index: 1
            })
        );

        let document = out[0].text().unwrap();
        assert!(!document.contains("margin"));
        assert!(document.contains("application/ld+json"));
        assert!(document.contains(&out[0].extracts[2].placeholder));
        assert_eq!(splitter.split_documents(), 1);
    }

    #[tokio::test]
    async fn test_split_then_rejoin_is_identity() {
        let splitter = HtmlSplitter::new();
        let input = vec![
            FileRecord::source("index.html", PAGE),
            FileRecord::source("src/app.js", "export const x = 1;"),
            FileRecord::source("plain.html", "<p>no inline code</p>"),
        ];
        let stream = splitter.rejoin().apply(splitter.split().apply(from_records(input.clone())));
        let out = collect_records(stream).await.unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_rejoin_substitutes_transformed_bodies() {
        let splitter = HtmlSplitter::new();
        let mut records = split_all(
            &splitter,
            vec![FileRecord::source(
                "index.html",
                "<script>var a = 1;</script><style>p { }</style>",
            )],
        )
        .await;
        for record in &mut records[1..] {
            let text = format!("/*min*/{}", record.text().unwrap());
            record.set_text(text);
        }

        let out = collect_records(splitter.rejoin().apply(from_records(records)))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].text().unwrap(),
            "<script>/*min*/var a = 1;</script><style>/*min*/p { }</style>"
        );
        assert!(!out[0].is_split());
    }

    #[tokio::test]
    async fn test_rejoin_accepts_extracts_before_parent() {
        let splitter = HtmlSplitter::new();
        let mut records = split_all(
            &splitter,
            vec![FileRecord::source("a.html", "<script>one()</script><script>two()</script>")],
        )
        .await;
        records.rotate_left(1);

        let out = collect_records(splitter.rejoin().apply(from_records(records)))
            .await
            .unwrap();
        assert_eq!(out[0].text().unwrap(), "<script>one()</script><script>two()</script>");
    }

    #[tokio::test]
    async fn test_extract_without_split_parent_is_orphaned() {
        let splitter = HtmlSplitter::new();
        let mut stray = FileRecord::new("ghost.html_script_0.js", "x()", RecordOrigin::Synthetic);
        stray.extract_of = Some(ExtractOrigin {
            parent: "ghost.html".into(),
            index: 0,
        });
        let err = collect_records(splitter.rejoin().apply(from_records(vec![stray])))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::PipelineData);
        assert_eq!(
            err.error_info().map(|i| i.code.as_str()),
            Some("PIPELINE-002-ORPHANED_EXTRACT")
        );
    }

    #[tokio::test]
    async fn test_extract_after_parent_emitted_is_orphaned() {
        let splitter = HtmlSplitter::new();
        let records = split_all(&splitter, vec![FileRecord::source("a.html", "<script>x()</script>")]).await;
        let extract = records[1].clone();
        let mut replayed = records;
        replayed.push(extract);

        let err = collect_records(splitter.rejoin().apply(from_records(replayed)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already emitted"));
    }

    #[tokio::test]
    async fn test_dropped_extract_fails_at_end_of_stream() {
        let splitter = HtmlSplitter::new();
        let mut records = split_all(&splitter, vec![FileRecord::source("a.html", "<style>p{}</style>")]).await;
        records.truncate(1);

        let err = collect_records(splitter.rejoin().apply(from_records(records)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("a.html_style_0.css"));
    }

    #[tokio::test]
    async fn test_missing_parent_fails_at_end_of_stream() {
        let splitter = HtmlSplitter::new();
        let records = split_all(&splitter, vec![FileRecord::source("a.html", "<style>p{}</style>")]).await;

        let err = collect_records(splitter.rejoin().apply(from_records(records[1..].to_vec())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("never reached"));
    }

    #[test]
    fn test_find_blocks_skips_nested_and_external() {
        let text = r#"<script>var s = "<style>x{}</style>";</script><script src="a.js"></script>"#;
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, ContentKind::Script);
    }

    #[test]
    fn test_splitters_use_distinct_placeholders() {
        assert_ne!(HtmlSplitter::new().placeholder(0), HtmlSplitter::new().placeholder(0));
    }
}
