//! Subscriber installation.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the caller ask for anything else.
pub const DEFAULT_LOG_FILTER: &str = "assetflow=info";

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. With `json` set, events
/// are written as one JSON object per line. Returns false if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(default_filter: &str, json: bool) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .try_init()
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
    };
    installed.is_ok()
}
