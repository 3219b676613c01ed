//! The file record flowing through every stage.

use super::ContentKind;
use crate::errors::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Immutable content buffer.
///
/// Cloning shares the bytes; replacing content on a record swaps the buffer
/// instead of writing through it, so forks never observe each other.
#[derive(Clone, PartialEq, Eq)]
pub struct Content(Arc<[u8]>);

impl Content {
    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the content as UTF-8 text, if it is valid.
    pub fn as_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if both handles point at the same buffer.
    #[must_use]
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content").field("len", &self.0.len()).finish()
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::from(text.into_bytes())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self(Arc::from(text.as_bytes()))
    }
}

/// Where a record entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// The project's own files.
    Source,
    /// External dependency files.
    Dependency,
    /// Created by a stage (extracts, manifests).
    Synthetic,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Dependency => write!(f, "dependency"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Back-reference from a synthetic extract to the document it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOrigin {
    /// Logical path of the parent document.
    pub parent: String,
    /// Position of the extract among the parent's extracts (source order).
    pub index: usize,
}

/// One extract slot recorded on a split document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSlot {
    /// Logical path of the synthetic record.
    pub path: String,
    /// The marker left in the document where the extract belongs.
    pub placeholder: String,
}

/// The unit of data flowing through a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative POSIX path, unique within one build.
    pub path: String,
    /// The payload.
    pub content: Content,
    /// Content kind, inferred from the path unless set explicitly.
    pub kind: ContentKind,
    /// Where the record entered the pipeline.
    pub origin: RecordOrigin,
    /// Set on synthetic extracts produced by the splitter.
    pub extract_of: Option<ExtractOrigin>,
    /// Set on split documents, in source order.
    pub extracts: Vec<ExtractSlot>,
}

impl FileRecord {
    /// Creates a record with the kind inferred from the path.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<Content>, origin: RecordOrigin) -> Self {
        let path = path.into();
        Self {
            kind: ContentKind::from_path(&path),
            path,
            content: content.into(),
            origin,
            extract_of: None,
            extracts: Vec::new(),
        }
    }

    /// Creates a project source record.
    #[must_use]
    pub fn source(path: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(path, content, RecordOrigin::Source)
    }

    /// Creates a dependency record.
    #[must_use]
    pub fn dependency(path: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(path, content, RecordOrigin::Dependency)
    }

    /// Overrides the inferred kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the content as text.
    pub fn text(&self) -> BuildResult<&str> {
        self.content
            .as_text()
            .map_err(|e| BuildError::stage("decode", format!("'{}' is not UTF-8: {e}", self.path)))
    }

    /// Replaces the content with new text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.content = Content::from(text.into());
    }

    /// Returns true if this record is a synthetic extract.
    #[must_use]
    pub fn is_extract(&self) -> bool {
        self.extract_of.is_some()
    }

    /// Returns true if this record is a document carrying extract slots.
    #[must_use]
    pub fn is_split(&self) -> bool {
        !self.extracts.is_empty()
    }
}
