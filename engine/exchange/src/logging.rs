//! Logging and tracing setup for the binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber: `RUST_LOG` wins, `info` otherwise.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_thread_names(true);
    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
