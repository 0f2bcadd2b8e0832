//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, LoggingConfig)
//! - [`linking`]: Spanning-tree tunables (LinkingConfig)
//! - [`links`]: Server-to-server link configuration (LinkBlock)
//! - [`validation`]: Startup checks that collect every problem at once

mod linking;
mod links;
mod types;
mod validation;

pub use linking::LinkingConfig;
pub use links::LinkBlock;
pub use types::{Config, ConfigError, LogFormat, LoggingConfig, ServerConfig};
pub use validation::{ValidationError, validate};
