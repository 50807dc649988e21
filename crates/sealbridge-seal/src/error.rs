//! Error types for the seal module.

use thiserror::Error;

use sealbridge_core::{Address, PolicyRef};

/// Errors that can occur while encrypting, authorizing or fetching keys.
#[derive(Debug, Error)]
pub enum SealError {
    /// The encryption capability could not be reached.
    #[error("encryption service unavailable: {0}")]
    EncryptionServiceUnavailable(String),

    /// More shares were requested than key servers can supply.
    #[error("threshold {threshold} is unsatisfiable with {available} key servers")]
    ThresholdUnsatisfiable { threshold: u8, available: usize },

    /// A remote party answered with something inconsistent with the request.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Session lifetime must be positive.
    #[error("invalid session TTL: {0} minutes")]
    InvalidTtl(u32),

    /// The signer does not control the address the session is minted for.
    #[error("signer controls {signer}, not {requested}")]
    SignerMismatch { requested: Address, signer: Address },

    /// The session credential is past its expiry.
    #[error("session key expired")]
    SessionExpired,

    /// The approval transaction does not cover the requested identifiers.
    #[error("policy mismatch: {0}")]
    PolicyMismatch(String),

    /// The on-chain policy denied the caller.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No policy object with this reference exists.
    #[error("unknown policy object {0}")]
    UnknownPolicy(PolicyRef),

    /// Fewer than `required` key servers released usable keys.
    #[error("insufficient key shares: required {required}, received {received}")]
    InsufficientShares { required: usize, received: usize },

    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Malformed key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] sealbridge_core::CoreError),
}

impl SealError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SealError::EncryptionServiceUnavailable(_) | SealError::InsufficientShares { .. }
        )
    }

    /// Whether the failure is a refusal by policy or credential state.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            SealError::SessionExpired | SealError::AccessDenied(_) | SealError::PolicyMismatch(_)
        )
    }
}

/// Result type for seal operations.
pub type Result<T> = std::result::Result<T, SealError>;
