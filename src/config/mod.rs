//! Configuration management for fopbox
//!
//! Settings are layered:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file given on the command line
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use fopbox::config::Config;
//!
//! let config = Config::load("conf/fopbox.toml").expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `FOPBOX__<section>__<key>`:
//! - `FOPBOX__SERVER__LISTEN_PORT=9200`
//! - `FOPBOX__SERVER__MAX_FORM_BYTES=64KB`
//! - `FOPBOX__STORAGE__SECRET_KEY=...`
//!
//! Each `[handlers.<name>]` section points at the operation's own config file,
//! which the operation loads itself.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, HandlerConfig, HttpClientConfig, ServerConfig, StorageConfig, StorageProvider,
};
pub use validation::{KNOWN_HANDLERS, ValidationError};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from `path`, `.env` and the environment, then validate
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing or malformed
    /// - Validation fails (unknown handlers, missing credentials, etc.)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = sources::load(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load without reading `.env`
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }
}
