//! Process-wide structured logging initialization.
//!
//! Call [`init`] once, from `main`. Honors `RUST_LOG` via `EnvFilter`,
//! defaulting to `info` when unset.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber with an env-filter and human
/// readable formatting. Safe to call more than once in tests; subsequent
/// calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
