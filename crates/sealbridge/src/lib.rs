//! # Seal Bridge
//!
//! Encrypt payloads under on-chain access policies, publish them to a
//! content-addressed blob store, and release the decryption keys only to
//! callers the policy approves.
//!
//! ## Overview
//!
//! Seal Bridge glues together three external systems: a threshold-encryption
//! service, a decentralized blob store, and a committee of key servers that
//! gate key release on a read-only policy check. The [`Pipeline`] sequences
//! them and is the only place transient failures are retried.
//!
//! ## Key Concepts
//!
//! - **Identifier**: policy object bytes plus a fresh nonce; binds each
//!   ciphertext to exactly one access-control object
//! - **Envelope**: self-describing ciphertext whose header names the
//!   namespace, identifier and threshold
//! - **Session Key**: short-lived credential authorized once by the user
//! - **Approval Transaction**: simulation-only `seal_approve` call, rebuilt
//!   for every key request from the envelope's own identifier
//! - **Content Id**: opaque handle the blob store returns for the envelope
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use sealbridge::{Pipeline, PipelineConfig};
//! use sealbridge::seal::Ed25519Signer;
//!
//! async fn example() -> sealbridge::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let pipeline = Pipeline::connect(config)?;
//!
//!     // Encrypt and publish
//!     let receipt = pipeline.encrypt_and_publish(Bytes::from_static(b"hello")).await?;
//!
//!     // Authorize and decrypt
//!     let user = Ed25519Signer::from_hex("0x...")?;
//!     let session = pipeline.mint_session(&user)?;
//!     let plaintext = pipeline.fetch_and_decrypt(&receipt.content_id, &session).await?;
//!     assert_eq!(plaintext, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `sealbridge::core` - Identifiers and the envelope codec
//! - `sealbridge::store` - Blob store backends
//! - `sealbridge::seal` - Encryption gateway, sessions and key retrieval

pub mod config;
pub mod enclave;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod retry;

// Re-export component crates
pub use sealbridge_core as core;
pub use sealbridge_seal as seal;
pub use sealbridge_store as store;

// Re-export main types for convenience
pub use config::{KeyServerEntry, PipelineConfig, StorageConfig};
pub use enclave::EnclaveClient;
pub use error::{ConfigError, EnclaveError, PipelineError, Result};
pub use job::JobRunner;
pub use pipeline::{connect_store, Components, Pipeline, PublishReceipt};
pub use retry::RetryPolicy;

// Re-export commonly used component types
pub use sealbridge_core::{Envelope, EnvelopeHeader, Identifier, PackageId, PolicyRef, Threshold};
pub use sealbridge_seal::{DataKey, SessionKey};
pub use sealbridge_store::ContentId;
