//! Telemetry initialization: structured logging via tracing-subscriber.
//!
//! Log filtering is controlled with the standard `RUST_LOG` environment
//! variable. The default filter keeps the service itself at `info` while
//! quieting the HTTP and database layers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Safe to call more than once (subsequent calls are no-ops), which keeps
/// test setups simple.
pub fn init_telemetry() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("badalctl=info,tower_http=info,sqlx=warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
