//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must contain a dot, got '{0}'")]
    InvalidServerName(String),
    #[error("server.network is required")]
    MissingNetworkName,
    #[error("server.sid must match pattern [0-9][A-Z0-9][A-Z0-9], got '{0}'")]
    InvalidSidFormat(String),
    #[error("linking.ping_freq must be greater than zero")]
    ZeroPingFreq,
    #[error("linking.ping_warn_time ({warn}) must be below linking.ping_freq ({freq})")]
    PingWarnTooLarge { warn: u64, freq: u64 },
    #[error("linking.sendq must be greater than zero")]
    ZeroSendq,
    #[error("link '{0}' is declared more than once")]
    DuplicateLink(String),
    #[error("link '{0}' has an empty password")]
    EmptyLinkPassword(String),
    #[error("link '{name}' has invalid sid '{sid}'")]
    InvalidLinkSid { name: String, sid: String },
    #[error("link '{0}' names this server")]
    SelfLink(String),
}

/// TS6 SID shape: a digit followed by two uppercase letters or digits.
pub fn is_valid_sid(sid: &str) -> bool {
    let bytes = sid.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_digit()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Required fields
    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    } else if !config.server.name.contains('.') {
        errors.push(ValidationError::InvalidServerName(config.server.name.clone()));
    }
    if config.server.network.is_empty() {
        errors.push(ValidationError::MissingNetworkName);
    }
    if !is_valid_sid(&config.server.sid) {
        errors.push(ValidationError::InvalidSidFormat(config.server.sid.clone()));
    }

    // Keepalive
    let linking = &config.linking;
    if linking.ping_freq == 0 {
        errors.push(ValidationError::ZeroPingFreq);
    } else if linking.ping_warn_time >= linking.ping_freq {
        errors.push(ValidationError::PingWarnTooLarge {
            warn: linking.ping_warn_time,
            freq: linking.ping_freq,
        });
    }
    if linking.sendq == 0 {
        errors.push(ValidationError::ZeroSendq);
    }

    // Link blocks
    let mut seen = HashSet::new();
    for link in &config.links {
        let lower = link.name.to_ascii_lowercase();
        if !seen.insert(lower) {
            errors.push(ValidationError::DuplicateLink(link.name.clone()));
        }
        if link.name.eq_ignore_ascii_case(&config.server.name) {
            errors.push(ValidationError::SelfLink(link.name.clone()));
        }
        if link.password.is_empty() {
            errors.push(ValidationError::EmptyLinkPassword(link.name.clone()));
        }
        if let Some(sid) = &link.sid
            && !is_valid_sid(sid)
        {
            errors.push(ValidationError::InvalidLinkSid {
                name: link.name.clone(),
                sid: sid.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
