//! Error types for assetflow builds.
//!
//! Errors fall into three families: configuration errors detected before a
//! pipeline is constructed, pipeline data errors detected while records
//! stream, and I/O errors. All of them reject the Completion Gate of the
//! build they belong to and never leak into sibling builds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for assetflow operations.
///
/// `Clone` so that a failure observed upstream of the Stream Isolator can be
/// delivered, unchanged, to every forked sequence.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A build configuration is malformed or contradictory.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Two records with the same logical path reached the sink.
    #[error("{0}")]
    DuplicatePath(#[from] DuplicatePathError),

    /// A synthetic extract could not be folded back into its document.
    #[error("{0}")]
    OrphanedExtract(#[from] OrphanedExtractError),

    /// A record carries a logical path that would escape the output tree.
    #[error("{0}")]
    UnsafePath(#[from] UnsafePathError),

    /// Filesystem read or write failure.
    #[error("IO error at '{}': {source}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        source: Arc<std::io::Error>,
    },

    /// A transform stage rejected a record.
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// The stage name.
        stage: String,
        /// The failure message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The build was cancelled before the sink drained.
    #[error("Build cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The error taxonomy used to report failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or contradictory configuration.
    Configuration,
    /// Duplicate paths, orphaned extracts and similar streaming faults.
    PipelineData,
    /// Read or write failure.
    Io,
    /// A collaborator stage failed.
    Stage,
    /// The build was cancelled.
    Cancelled,
    /// Anything else.
    Internal,
}

impl BuildError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a stage failure.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::Serialization(_) => ErrorCategory::Configuration,
            Self::DuplicatePath(_) | Self::OrphanedExtract(_) | Self::UnsafePath(_) => {
                ErrorCategory::PipelineData
            }
            Self::Io { .. } => ErrorCategory::Io,
            Self::Stage { .. } => ErrorCategory::Stage,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the diagnostics attached to this error, if any.
    #[must_use]
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Config(e) => Some(&e.error_info),
            Self::DuplicatePath(e) => Some(&e.error_info),
            Self::OrphanedExtract(e) => Some(&e.error_info),
            Self::UnsafePath(e) => Some(&e.error_info),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "CONFIG-002-BASE_PATH").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        serde_json::Value::Object(map)
    }
}

/// Error raised when a build configuration cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Configuration error in build '{build}': {message}")]
pub struct ConfigError {
    /// The build the error belongs to.
    pub build: String,
    /// The error message.
    pub message: String,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(build: impl Into<String>, message: impl Into<String>, error_info: ErrorInfo) -> Self {
        Self {
            build: build.into(),
            message: message.into(),
            error_info,
        }
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }
}

/// Error raised when two records share a logical path within one build.
#[derive(Debug, Clone, Error)]
#[error("Duplicate logical path '{path}' ({first} and {second})")]
pub struct DuplicatePathError {
    /// The conflicting logical path.
    pub path: String,
    /// Origin of the record that arrived first.
    pub first: String,
    /// Origin of the record that arrived second.
    pub second: String,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl DuplicatePathError {
    /// Creates a new duplicate path error.
    #[must_use]
    pub fn new(path: impl Into<String>, first: impl Into<String>, second: impl Into<String>) -> Self {
        let path = path.into();
        let info = ErrorInfo::new(
            "PIPELINE-001-DUPLICATE_PATH",
            format!("'{path}' is produced more than once in the same build"),
        )
        .with_fix_hint(
            "Exclude the file from either the project sources or the dependency globs.",
        )
        .with_context_entry("path", path.clone());

        Self {
            path,
            first: first.into(),
            second: second.into(),
            error_info: info,
        }
    }
}

/// Error raised when a synthetic extract has no document to return to.
#[derive(Debug, Clone, Error)]
#[error("Orphaned extract '{extract}' of document '{parent}': {reason}")]
pub struct OrphanedExtractError {
    /// The synthetic record's logical path.
    pub extract: String,
    /// The logical path of the document it was split from.
    pub parent: String,
    /// Why it could not be rejoined.
    pub reason: String,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl OrphanedExtractError {
    /// Creates a new orphaned extract error.
    #[must_use]
    pub fn new(
        extract: impl Into<String>,
        parent: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let extract = extract.into();
        let info = ErrorInfo::new(
            "PIPELINE-002-ORPHANED_EXTRACT",
            format!("'{extract}' was never rejoined into its document"),
        )
        .with_fix_hint("Stages between split and rejoin must not drop or rename documents.");

        Self {
            extract,
            parent: parent.into(),
            reason: reason.into(),
            error_info: info,
        }
    }
}

/// Error raised when a logical path is absolute or climbs out of its root.
#[derive(Debug, Clone, Error)]
#[error("Unsafe logical path '{path}'")]
pub struct UnsafePathError {
    /// The rejected path.
    pub path: String,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl UnsafePathError {
    /// Creates a new unsafe path error.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let info = ErrorInfo::new(
            "PIPELINE-003-UNSAFE_PATH",
            format!("'{path}' is not a relative path inside the output directory"),
        );
        Self {
            path,
            error_info: info,
        }
    }
}

/// Convenience alias used across the crate.
pub type BuildResult<T> = Result<T, BuildError>;
