//! Reference scanning for markup, script and style records.
//!
//! Markup is parsed with `scraper`; scripts and stylesheets get a lexical
//! scan. Either way only the references the post-optimizer stages need
//! (prefetch links, push manifests) are found.

use super::paths;
use super::{ContentKind, FileRecord};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::OnceLock;

/// What kind of resource a reference loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A script (classic or module).
    Script,
    /// A stylesheet.
    Style,
    /// An imported HTML document.
    Document,
    /// An image.
    Image,
    /// A web font.
    Font,
    /// Anything else fetched by the page.
    Fetch,
}

impl ReferenceKind {
    /// The resource type string used in push manifests.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::Document => "document",
            Self::Image => "image",
            Self::Font => "font",
            Self::Fetch => "fetch",
        }
    }

    /// Guesses the kind from a target path's extension.
    #[must_use]
    pub fn from_target(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" | "cjs" => Self::Script,
            "css" => Self::Style,
            "html" | "htm" => Self::Document,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" => Self::Image,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            _ => Self::Fetch,
        }
    }
}

/// A resolved reference from one record to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Logical path of the referenced record.
    pub path: String,
    /// What kind of resource it is.
    pub kind: ReferenceKind,
}

fn markup_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("script, link[href], img[src]").expect("static pattern"))
}

fn module_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)(?:\b(?:import|export)\s+(?:[^'";]*?\s+from\s+)?|\bimport\s*\(\s*)["']([^"']+)["']"#,
        )
        .expect("static pattern")
    })
}

fn css_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*["']?([^"')\s]+)["']?\s*\)|@import\s+["']([^"']+)["']"#)
            .expect("static pattern")
    })
}

/// Script `type` values that hold JavaScript.
const SCRIPT_TYPES: &[&str] = &["", "text/javascript", "application/javascript", "module"];

/// Returns true if a script element with this `type` attribute runs as
/// JavaScript. A missing attribute counts as JavaScript.
#[must_use]
pub fn is_javascript_type(script_type: Option<&str>) -> bool {
    let script_type = script_type.unwrap_or_default().trim().to_ascii_lowercase();
    SCRIPT_TYPES.contains(&script_type.as_str())
}

/// Returns the value of one attribute of an opening tag such as
/// `<script src="a.js" defer>`. Valueless attributes yield an empty string.
#[must_use]
pub fn attribute(open_tag: &str, name: &str) -> Option<String> {
    let fragment = Html::parse_fragment(open_tag);
    let element = fragment
        .root_element()
        .children()
        .find_map(ElementRef::wrap)?;
    element.value().attr(name).map(str::to_string)
}

/// Scans a record for references to other records.
///
/// Non-text records and records that are not valid UTF-8 have none.
#[must_use]
pub fn scan(record: &FileRecord) -> Vec<Reference> {
    let Ok(text) = record.text() else {
        return Vec::new();
    };
    let mut found = match record.kind {
        ContentKind::Markup => scan_markup(&record.path, text),
        ContentKind::Script => scan_script(&record.path, text),
        ContentKind::Style => scan_style(&record.path, text),
        ContentKind::Other => Vec::new(),
    };
    found.sort();
    found.dedup();
    found
}

fn scan_markup(document: &str, text: &str) -> Vec<Reference> {
    let html = Html::parse_document(text);
    let mut found = Vec::new();
    for element in html.select(markup_selector()) {
        let tag = element.value();
        let (target, kind) = match tag.name() {
            "script" => match tag.attr("src") {
                Some(src) => (src, ReferenceKind::Script),
                None => {
                    if is_javascript_type(tag.attr("type")) {
                        let body: String = element.text().collect();
                        found.extend(scan_script(document, &body));
                    }
                    continue;
                }
            },
            "img" => match tag.attr("src") {
                Some(src) => (src, ReferenceKind::Image),
                None => continue,
            },
            _ => {
                let rel = tag.attr("rel").unwrap_or_default().to_ascii_lowercase();
                let kind = match rel.as_str() {
                    "stylesheet" => ReferenceKind::Style,
                    "import" => ReferenceKind::Document,
                    "modulepreload" => ReferenceKind::Script,
                    "preload" => match tag.attr("as") {
                        Some("font") => ReferenceKind::Font,
                        Some("style") => ReferenceKind::Style,
                        Some("script") => ReferenceKind::Script,
                        _ => continue,
                    },
                    _ => continue,
                };
                match tag.attr("href") {
                    Some(href) => (href, kind),
                    None => continue,
                }
            }
        };
        if let Some(path) = paths::resolve(document, target) {
            found.push(Reference { path, kind });
        }
    }
    found
}

/// Resolves the relative module specifiers of `text` against `script`, which
/// may also be the document holding an inline script.
fn scan_script(script: &str, text: &str) -> Vec<Reference> {
    module_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let specifier = caps.get(1)?.as_str();
            let relative = specifier.starts_with("./")
                || specifier.starts_with("../")
                || specifier.starts_with('/');
            if !relative {
                return None;
            }
            let path = paths::resolve(script, specifier)?;
            Some(Reference {
                kind: ReferenceKind::from_target(&path),
                path,
            })
        })
        .collect()
}

fn scan_style(sheet: &str, text: &str) -> Vec<Reference> {
    css_url_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let target = caps.get(1).or_else(|| caps.get(2))?.as_str();
            let path = paths::resolve(sheet, target)?;
            Some(Reference {
                kind: ReferenceKind::from_target(&path),
                path,
            })
        })
        .collect()
}

/// References between the records of one build, collected as they stream by.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<Reference>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `record` as present and scans its references.
    pub fn observe(&mut self, record: &FileRecord) {
        self.edges.insert(record.path.clone(), scan(record));
    }

    /// Returns true if a record with this path has been observed.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.edges.contains_key(path)
    }

    /// References made directly by `path` to observed records.
    #[must_use]
    pub fn direct(&self, path: &str) -> Vec<Reference> {
        self.edges
            .get(path)
            .map(|refs| refs.iter().filter(|r| self.contains(&r.path)).cloned().collect())
            .unwrap_or_default()
    }

    /// Every observed record reachable from `path`, excluding `path` itself,
    /// sorted by path. Each keeps the kind of the first edge that reached it.
    #[must_use]
    pub fn transitive(&self, path: &str) -> Vec<Reference> {
        let mut seen: BTreeMap<String, ReferenceKind> = BTreeMap::new();
        let mut queue: VecDeque<&str> = VecDeque::from([path]);
        while let Some(current) = queue.pop_front() {
            for reference in self.edges.get(current).into_iter().flatten() {
                if reference.path == path || !self.contains(&reference.path) {
                    continue;
                }
                if !seen.contains_key(&reference.path) {
                    seen.insert(reference.path.clone(), reference.kind);
                    queue.push_back(&reference.path);
                }
            }
        }
        seen.into_iter()
            .map(|(path, kind)| Reference { path, kind })
            .collect()
    }
}
