//! Maintenance tools for reservation data.

pub mod config;
pub mod import;
pub mod legacy;
pub mod migrate;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Human-readable logs on stderr; `RUST_LOG` overrides the default level.
pub fn init_cli_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
