//! Spanning-tree tunables.

use serde::Deserialize;
use std::net::SocketAddr;

/// `[linking]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkingConfig {
    /// Seconds between pings on each direct link.
    #[serde(default = "default_ping_freq")]
    pub ping_freq: u64,
    /// Seconds after a ping with no answer before a latency warning. 0 disables.
    #[serde(default = "default_ping_warn_time")]
    pub ping_warn_time: u64,
    /// Do not broadcast QUITs for users lost in a netsplit.
    #[serde(default)]
    pub quiet_bursts: bool,
    /// Show "*.net *.split" instead of the real server names.
    #[serde(default)]
    pub hide_splits: bool,
    /// Outbound line queue per link. A full queue drops the link.
    #[serde(default = "default_sendq")]
    pub sendq: usize,
    /// Seconds between autoconnect attempts.
    #[serde(default = "default_connect_retry")]
    pub connect_retry: u64,
    /// Plaintext S2S listener address.
    pub listen: Option<SocketAddr>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            ping_freq: default_ping_freq(),
            ping_warn_time: default_ping_warn_time(),
            quiet_bursts: false,
            hide_splits: false,
            sendq: default_sendq(),
            connect_retry: default_connect_retry(),
            listen: None,
        }
    }
}

fn default_ping_freq() -> u64 {
    60
}

fn default_ping_warn_time() -> u64 {
    15
}

fn default_sendq() -> usize {
    1024
}

fn default_connect_retry() -> u64 {
    60
}
