//! Error types shared across the workspace.

use thiserror::Error;

/// Errors raised outside the GPU layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is malformed or fails validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Window creation or surface handle retrieval failed.
    #[error("Window error: {0}")]
    Window(String),

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A TOML document could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias using the workspace error.
pub type Result<T> = std::result::Result<T, Error>;
