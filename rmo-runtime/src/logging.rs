//!
//! Logging initialization for programs embedding the runtime.
//!
//! The runtime itself only emits `tracing` events; installing a subscriber is up to the embedder.
//!

use std::error::Error;

use tracing_subscriber::EnvFilter;

/// The environment variable holding the log filter directives.
pub const LOG_ENV: &str = "RMO_LOG";

/// Install a formatting subscriber, filtered by `RMO_LOG` (or `debug` when verbose).
pub fn init(verbose: bool) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}
