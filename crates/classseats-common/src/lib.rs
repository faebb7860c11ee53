//! # ClassSeats Common
//!
//! Shared configuration, error types, and logging setup for the ClassSeats
//! offline agent.
//!
//! ## Features
//!
//! - Build revision and agent configuration (`AgentConfig`)
//! - Logging configuration and setup
//! - A small error type for configuration and startup failures

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{AgentConfig, BUILD_REVISION, CACHE_PREFIX};
pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};

/// Errors raised while configuring the agent.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be decoded.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Malformed URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Logging could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl CommonError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, CommonError>;
