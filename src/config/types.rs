//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::linking::LinkingConfig;
use super::links::LinkBlock;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// Spanning-tree tunables.
    #[serde(default)]
    pub linking: LinkingConfig,
    /// Link blocks for server peering.
    #[serde(default)]
    pub links: Vec<LinkBlock>,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find the link block for a server name (case-insensitive).
    pub fn link(&self, name: &str) -> Option<&LinkBlock> {
        self.links.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "hub.straylight.net").
    pub name: String,
    /// Network name (e.g., "Straylight").
    pub network: String,
    /// Server ID for TS6 (3 characters).
    pub sid: String,
    /// Server description.
    pub description: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` still overrides the filter.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
name = "hub.straylight.net"
network = "Straylight"
sid = "0HB"
description = "Straylight hub"

[linking]
ping_freq = 30
hide_splits = true
listen = "0.0.0.0:7000"

[[links]]
name = "leaf.straylight.net"
hostname = "10.0.0.2"
port = 7000
password = "s3cret"
autoconnect = true
sid = "0LF"

[logging]
format = "json"
"#;

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "hub.straylight.net");
        assert_eq!(config.linking.ping_freq, 30);
        assert_eq!(config.linking.ping_warn_time, 15);
        assert!(config.linking.hide_splits);
        assert!(!config.linking.quiet_bursts);
        assert_eq!(config.links.len(), 1);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "info");

        let link = config.link("LEAF.straylight.net").unwrap();
        assert_eq!(link.sid.as_deref(), Some("0LF"));
        assert!(link.autoconnect);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nname = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn optional_sections_default() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "solo.example"
network = "Test"
sid = "0SO"
description = "Alone"
"#,
        )
        .unwrap();
        assert!(config.links.is_empty());
        assert_eq!(config.linking.ping_freq, 60);
        assert_eq!(config.linking.sendq, 1024);
        assert!(config.linking.listen.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
    }
}
