//! Storage error types.

use signpost_shared::AppError;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Required storage or CDN settings are absent.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Declared upload transport is not the object-storage backend.
    #[error("invalid upload transport: {mode}")]
    InvalidTransport {
        /// The declared mode, or `<unset>`.
        mode: String,
    },

    /// Caller-supplied storage key is unusable.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// The provider or signer rejected the request.
    #[error("storage operation failed: {0}")]
    Transport(String),
}

impl StorageError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid transport error.
    #[must_use]
    pub fn invalid_transport(mode: impl Into<String>) -> Self {
        Self::InvalidTransport { mode: mode.into() }
    }

    /// Create an invalid key error.
    #[must_use]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether this error is a configuration failure (never worth retrying).
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidTransport { .. })
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ => Self::Transport(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(_) | StorageError::InvalidTransport { .. } => {
                Self::Configuration(err.to_string())
            }
            StorageError::InvalidKey(_) => Self::Validation(err.to_string()),
            StorageError::Transport(_) => Self::ExternalService(err.to_string()),
        }
    }
}
