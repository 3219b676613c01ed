//! Build event emission.
//!
//! Every build reports its lifecycle (`build.started`, `build.completed`,
//! `build.failed`) and per-stage notices through an [`EventSink`]. The sink is
//! carried by the toolchain rather than a process global, so concurrent
//! builds never share one by accident.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event emitted when the first record reaches a build's sink.
pub const BUILD_STARTED: &str = "build.started";
/// Event emitted when a build's output tree is fully written.
pub const BUILD_COMPLETED: &str = "build.completed";
/// Event emitted when a build fails or is cancelled.
pub const BUILD_FAILED: &str = "build.failed";
/// Event emitted by the push manifest stage once the manifest is generated.
pub const MANIFEST_GENERATED: &str = "manifest.generated";
