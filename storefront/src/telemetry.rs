//! Tracing setup for binaries.

use crate::config::Config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// Filter directives come from `config.log_filter`; invalid directives fall back
/// to `info`. A second call is a no-op.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();

    if installed.is_ok() {
        tracing::debug!(filter = %config.log_filter, "Tracing initialised");
    }
}
