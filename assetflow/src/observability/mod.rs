//! Observability utilities: subscriber setup and build timing.

mod logging;
mod timer;

pub use logging::{init_logging, DEFAULT_LOG_FILTER};
pub use timer::BuildTimer;
