//! Base path rewriting.

use super::{RecordTransform, TransformStage};
use crate::core::{ContentKind, FileRecord};
use crate::errors::BuildResult;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

fn base_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<base\b[^>]*>").expect("static pattern"))
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(\shref\s*=\s*)(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("static pattern")
    })
}

/// Rewrites the `href` of the entrypoint's `<base>` tag.
///
/// Documents without a `<base>` tag, and every other record, are untouched.
#[derive(Debug, Clone)]
pub struct BaseTagUpdater {
    entrypoint: String,
    base_path: String,
}

impl BaseTagUpdater {
    /// Creates an updater for `entrypoint` with an already normalized path.
    #[must_use]
    pub fn new(entrypoint: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            base_path: base_path.into(),
        }
    }

    /// Wraps the updater in a stage.
    #[must_use]
    pub fn stage(self) -> TransformStage {
        TransformStage::new(Arc::new(self))
    }

    /// Returns the document with its base tag rewritten, if it has one.
    #[must_use]
    pub fn rewrite(&self, document: &str) -> Option<String> {
        let tag = base_tag_pattern().find(document)?;
        let open = tag.as_str();
        let rewritten = if href_pattern().is_match(open) {
            href_pattern()
                .replace(open, |caps: &regex::Captures<'_>| {
                    format!("{}\"{}\"", &caps[1], self.base_path)
                })
                .into_owned()
        } else {
            let insert_at = "<base".len();
            format!("{} href=\"{}\"{}", &open[..insert_at], self.base_path, &open[insert_at..])
        };
        Some(format!(
            "{}{}{}",
            &document[..tag.start()],
            rewritten,
            &document[tag.end()..]
        ))
    }
}

#[async_trait]
impl RecordTransform for BaseTagUpdater {
    fn name(&self) -> &str {
        "base-path"
    }

    fn accepts(&self, record: &FileRecord) -> bool {
        record.kind == ContentKind::Markup && record.path == self.entrypoint
    }

    async fn transform(&self, mut record: FileRecord) -> BuildResult<FileRecord> {
        let rewritten = self.rewrite(record.text()?);
        if let Some(text) = rewritten {
            debug!(path = %record.path, base = %self.base_path, "Updated base tag");
            record.set_text(text);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;
    use crate::stream::{collect_records, from_records};

    #[test]
    fn test_rewrite_existing_href() {
        let updater = BaseTagUpdater::new("index.html", "/app/");
        assert_eq!(
            updater.rewrite("<head><base href=\"/\"></head>").as_deref(),
            Some("<head><base href=\"/app/\"></head>")
        );
        assert_eq!(
            updater.rewrite("<BASE target=_self href='/old/'>").as_deref(),
            Some("<BASE target=_self href=\"/app/\">")
        );
    }

    #[test]
    fn test_rewrite_base_without_href() {
        let updater = BaseTagUpdater::new("index.html", "/es5/");
        assert_eq!(
            updater.rewrite("<base target=\"_blank\">").as_deref(),
            Some("<base href=\"/es5/\" target=\"_blank\">")
        );
    }

    #[test]
    fn test_no_base_tag() {
        let updater = BaseTagUpdater::new("index.html", "/app/");
        assert_eq!(updater.rewrite("<head></head>"), None);
    }

    #[tokio::test]
    async fn test_stage_rewrites_only_entrypoint() {
        let page = "<base href=\"/\">";
        let input = vec![
            FileRecord::source("index.html", page),
            FileRecord::source("src/other.html", page),
        ];
        let stage = BaseTagUpdater::new("index.html", "/app/").stage();
        let out = collect_records(stage.apply(from_records(input))).await.unwrap();
        assert_eq!(out[0].text().unwrap(), "<base href=\"/app/\">");
        assert_eq!(out[1].text().unwrap(), page);
    }
}
