//! Custom-elements ES5 adapter injection.
//!
//! Compiling custom element classes down to ES5 breaks them on browsers with
//! native custom elements unless `custom-elements-es5-adapter.js` is loaded
//! first. This transform inserts that script, guarded so it removes itself on
//! browsers without native support, in front of the web components loader.

use super::{RecordTransform, TransformStage};
use crate::core::{references, ContentKind, FileRecord};
use crate::errors::BuildResult;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Element id of the injected block; its presence marks a document as done.
pub const ES5_SHIM_ID: &str = "autogenerated-ce-es5-shim";

/// File name of the adapter script, next to the loader.
pub const ES5_ADAPTER_FILE: &str = "custom-elements-es5-adapter.js";

const LOADERS: &[&str] = &["webcomponents-loader.js", "webcomponents-bundle.js"];

fn script_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<script\b[^>]*>").expect("static pattern"))
}

/// Inserts the ES5 adapter in documents that load the web components polyfills.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es5AdapterInjector;

impl Es5AdapterInjector {
    /// Wraps the injector in a stage.
    #[must_use]
    pub fn stage() -> TransformStage {
        TransformStage::new(Arc::new(Self))
    }

    /// Returns the document with the adapter inserted, or `None` if it needs
    /// no change.
    #[must_use]
    pub fn inject(document: &str) -> Option<String> {
        if document.contains(ES5_SHIM_ID) {
            return None;
        }
        let (tag, src) = script_tag_pattern().find_iter(document).find_map(|tag| {
            let src = references::attribute(tag.as_str(), "src")?;
            let file = src.split(['?', '#']).next().unwrap_or_default();
            LOADERS
                .iter()
                .any(|loader| file.rsplit('/').next() == Some(*loader))
                .then_some((tag, src))
        })?;

        let directory = src.rfind('/').map_or("", |idx| &src[..=idx]);
        let indent: String = document[..tag.start()]
            .rsplit('\n')
            .next()
            .unwrap_or_default()
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        let shim = format!(
            "<div id=\"{ES5_SHIM_ID}\">\n\
             {indent}  <script type=\"text/javascript\">\n\
             {indent}    if (!window.customElements) {{\n\
             {indent}      var ce = document.getElementById('{ES5_SHIM_ID}');\n\
             {indent}      ce.parentElement.removeChild(ce);\n\
             {indent}    }}\n\
             {indent}  </script>\n\
             {indent}  <script type=\"text/javascript\" src=\"{directory}{ES5_ADAPTER_FILE}\"></script>\n\
             {indent}</div>\n\
             {indent}"
        );

        let mut out = String::with_capacity(document.len() + shim.len());
        out.push_str(&document[..tag.start()]);
        out.push_str(&shim);
        out.push_str(&document[tag.start()..]);
        Some(out)
    }
}

#[async_trait]
impl RecordTransform for Es5AdapterInjector {
    fn name(&self) -> &str {
        "es5-adapter"
    }

    fn accepts(&self, record: &FileRecord) -> bool {
        record.kind == ContentKind::Markup && !record.is_extract()
    }

    async fn transform(&self, mut record: FileRecord) -> BuildResult<FileRecord> {
        let Ok(text) = record.text() else {
            return Ok(record);
        };
        if let Some(injected) = Self::inject(text) {
            debug!(path = %record.path, "Injected custom-elements ES5 adapter");
            record.set_text(injected);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;
    use crate::stream::{collect_records, from_records};

    const PAGE: &str = "<head>\n    <script src=\"node_modules/@webcomponents/webcomponentsjs/webcomponents-loader.js\"></script>\n</head>";

    #[test]
    fn test_inject_before_loader() {
        let out = Es5AdapterInjector::inject(PAGE).unwrap();
        let shim = out.find(ES5_SHIM_ID).unwrap();
        let loader = out.find("webcomponents-loader.js").unwrap();
        assert!(shim < loader);
        assert!(out.contains(
            "src=\"node_modules/@webcomponents/webcomponentsjs/custom-elements-es5-adapter.js\""
        ));
        assert!(out.starts_with("<head>\n    <div id="));
        assert!(out.contains("\n    <script src=\"node_modules"));
    }

    #[test]
    fn test_inject_is_idempotent() {
        let once = Es5AdapterInjector::inject(PAGE).unwrap();
        assert_eq!(Es5AdapterInjector::inject(&once), None);
    }

    #[test]
    fn test_bundle_loader_and_bare_src() {
        let out = Es5AdapterInjector::inject("<script src=\"webcomponents-bundle.js?v=1\"></script>").unwrap();
        assert!(out.contains("src=\"custom-elements-es5-adapter.js\""));
    }

    #[test]
    fn test_documents_without_loader_untouched() {
        assert_eq!(Es5AdapterInjector::inject("<script src=\"app.js\"></script>"), None);
        assert_eq!(Es5AdapterInjector::inject("<p>webcomponents-loader.js</p>"), None);
    }

    #[tokio::test]
    async fn test_stage_only_touches_markup() {
        let script = FileRecord::source("loader-ref.js", "load('webcomponents-loader.js')");
        let page = FileRecord::source("index.html", PAGE);
        let out = collect_records(Es5AdapterInjector::stage().apply(from_records(vec![script.clone(), page])))
            .await
            .unwrap();
        assert_eq!(out[0], script);
        assert!(out[1].text().unwrap().contains(ES5_SHIM_ID));
    }
}
