//! Error types for Seal Bridge core primitives.

use thiserror::Error;

/// Errors raised while building identifiers or decoding envelopes.
///
/// Every variant is structural: the input is wrong, retrying will not help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid policy reference: {0}")]
    InvalidReference(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
