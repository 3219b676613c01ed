//! Build timing.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Wall-clock and monotonic timing of one build.
#[derive(Debug, Clone)]
pub struct BuildTimer {
    name: String,
    start: Instant,
    started_at: DateTime<Utc>,
}

impl BuildTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Returns the build name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the timer was started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer, returning the finish time and the duration in
    /// milliseconds.
    #[must_use]
    pub fn finish(self) -> (DateTime<Utc>, f64) {
        (Utc::now(), self.elapsed_ms())
    }
}
