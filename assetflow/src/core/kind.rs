//! Content kinds carried by file records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a file record contains, as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// An HTML document.
    Markup,
    /// JavaScript, either a file or an extracted inline block.
    Script,
    /// CSS, either a file or an extracted inline block.
    Style,
    /// Anything the optimizer does not touch.
    Other,
}

impl Default for ContentKind {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markup => write!(f, "markup"),
            Self::Script => write!(f, "script"),
            Self::Style => write!(f, "style"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ContentKind {
    /// Infers the kind from a logical path's extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Self::Other,
        };
        match ext.as_str() {
            "html" | "htm" => Self::Markup,
            "js" | "mjs" | "cjs" => Self::Script,
            "css" => Self::Style,
            _ => Self::Other,
        }
    }

    /// The file extension used for synthetic records of this kind.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markup => "html",
            Self::Script => "js",
            Self::Style => "css",
            Self::Other => "bin",
        }
    }

    /// Returns true for kinds the optimizer treats as text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        !matches!(self, Self::Other)
    }
}
