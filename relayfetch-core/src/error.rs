//! Core error types for relayfetch.

use thiserror::Error;

/// Core error type for relayfetch data handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request URL could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL parsed but carries no host.
    #[error("URL has no host: {0}")]
    MissingHost(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
