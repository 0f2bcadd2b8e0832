//! Logging setup and span constructors.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match config.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Standardized span constructors for link observability.
pub mod spans {
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Create a span for a server connection before its name is known.
    pub fn connection(addr: SocketAddr, direction: &'static str) -> Span {
        info_span!("s2s", addr = %addr, direction, peer = tracing::field::Empty)
    }

    /// Create a span for an established server link.
    pub fn peer(sid: &str, name: &str) -> Span {
        info_span!("peer", sid = %sid, name = %name)
    }
}
