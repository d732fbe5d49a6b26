//! Structured logging initialization.
//!
//! Console-only `tracing` setup with environment-driven filtering. The core
//! is usually embedded in a larger process that owns the global subscriber,
//! so initialization is idempotent and yields to an existing subscriber.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging for standalone use.
///
/// Filter level comes from `RUST_LOG`, falling back to `PARLO_LOG_LEVEL`,
/// falling back to `info`. Safe to call more than once; if the embedding
/// process already installed a global subscriber this is a no-op.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| {
                std::env::var("PARLO_LOG_LEVEL").map(EnvFilter::new)
            })
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(filter),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already installed, keeping it");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging();
        init_logging();
    }
}
