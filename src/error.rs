//! Error types for mau.

use crate::core::profile::ValidationError;
use crate::core::repository::Readiness;
use std::io;
use thiserror::Error;

/// Result type alias for mau operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mau operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage I/O error.
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid state encountered.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Repository used before it finished loading.
    #[error("Repository not ready (state: {0:?})")]
    NotReady(Readiness),

    /// The chat exchange failed (network error or non-success status).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Legacy message list could not be migrated.
    #[error("Malformed legacy data: {0}")]
    MalformedLegacyData(String),

    /// User-supplied input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
