//! Asset sources: where a build's records come from.

mod fs;

pub use fs::FsAssetSource;

use crate::stream::RecordStream;

/// Produces a project's own files and its dependency files as two
/// independent record streams.
///
/// Each call returns a fresh stream; consuming one never affects another.
pub trait AssetSource: Send + Sync {
    /// The project's own files.
    fn sources(&self) -> RecordStream;

    /// External dependency files.
    fn dependencies(&self) -> RecordStream;
}
