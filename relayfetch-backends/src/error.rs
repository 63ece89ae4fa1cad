//! Errors raised while assembling backends.

use relayfetch_fetch::{FetchError, RegistryError};
use thiserror::Error;

/// Error type for registry and pipeline construction.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A host client could not be created.
    #[error("Failed to create client: {0}")]
    Client(#[from] FetchError),

    /// A backend could not be registered.
    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),
}
