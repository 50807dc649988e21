//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed while serving the request.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    /// No blob exists under the given content id.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The backend answered, but the answer could not be interpreted.
    #[error("invalid blob store response: {0}")]
    InvalidResponse(String),

    /// Content ids must be non-empty.
    #[error("invalid content id: {0:?}")]
    InvalidContentId(String),

    /// Local I/O error (temporary files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    ///
    /// Only transport failures qualify. An unparseable response was delivered
    /// and would be delivered again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
