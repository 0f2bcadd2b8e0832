//! Server-to-server link configuration.

use serde::Deserialize;

/// Link block configuration for server-to-server connections.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name (e.g., "leaf.straylight.net").
    pub name: String,
    /// Remote server IP/hostname to connect to.
    pub hostname: String,
    /// Remote server port.
    pub port: u16,
    /// Password for authentication (both sides use the same one).
    pub password: String,
    /// Whether to initiate connection to this server automatically.
    #[serde(default)]
    pub autoconnect: bool,
    /// Expected remote SID (optional, checked during the handshake).
    pub sid: Option<String>,
}

impl LinkBlock {
    /// `host:port` for outbound connects.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}
