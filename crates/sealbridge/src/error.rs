//! Error types for the pipeline driver.

use sealbridge_core::CoreError;
use sealbridge_seal::SealError;
use sealbridge_store::StoreError;
use thiserror::Error;

/// A missing or invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be used.
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }

    /// The variable this error is about.
    pub fn variable(&self) -> &'static str {
        match self {
            ConfigError::Missing(var) | ConfigError::Invalid { var, .. } => var,
        }
    }
}

/// Errors from the confidential-compute endpoint.
#[derive(Debug, Error)]
pub enum EnclaveError {
    /// The endpoint could not be reached.
    #[error("enclave unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("enclave returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered 2xx with a body that is not JSON.
    #[error("enclave returned an invalid body: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for EnclaveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EnclaveError::InvalidResponse(err.to_string())
        } else {
            EnclaveError::Transport(err.to_string())
        }
    }
}

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Structural validation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Encryption, session or key retrieval error.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// Blob store error.
    #[error("blob store: {0}")]
    Store(#[from] StoreError),

    /// Confidential-compute error.
    #[error(transparent)]
    Enclave(#[from] EnclaveError),
}

impl PipelineError {
    /// Whether the driver may retry the failed step.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Seal(e) => e.is_transient(),
            PipelineError::Store(e) => e.is_transient(),
            PipelineError::Config(_) | PipelineError::Core(_) | PipelineError::Enclave(_) => false,
        }
    }

    /// Whether the failure needs a new session or a different identifier.
    pub fn is_authorization(&self) -> bool {
        matches!(self, PipelineError::Seal(e) if e.is_authorization())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transient: PipelineError =
            SealError::EncryptionServiceUnavailable("down".into()).into();
        assert!(transient.is_transient());
        assert!(!transient.is_authorization());

        let store: PipelineError = StoreError::Unavailable("timeout".into()).into();
        assert!(store.is_transient());

        let not_found: PipelineError = StoreError::NotFound("abc".into()).into();
        assert!(!not_found.is_transient());

        let expired: PipelineError = SealError::SessionExpired.into();
        assert!(expired.is_authorization());
        assert!(!expired.is_transient());

        let config: PipelineError = ConfigError::Missing("SEAL_PACKAGE_ID").into();
        assert!(!config.is_transient());
        assert!(config.to_string().contains("SEAL_PACKAGE_ID"));
    }

    #[test]
    fn test_enclave_status_message_carries_body() {
        let err = EnclaveError::Status {
            status: 500,
            body: "enclave busy".into(),
        };
        let msg = PipelineError::from(err).to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("enclave busy"));
    }
}
