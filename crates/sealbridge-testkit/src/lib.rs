//! # Seal Bridge Testkit
//!
//! Testing utilities for Seal Bridge.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Envelopes with pinned wire bytes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A fully wired in-process deployment
//!
//! ## Golden Vectors
//!
//! ```rust
//! use sealbridge_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealbridge_testkit::generators::{envelope_from_params, EnvelopeParams};
//!
//! proptest! {
//!     #[test]
//!     fn header_survives_encoding(params: EnvelopeParams) {
//!         let envelope = envelope_from_params(&params);
//!         let parsed = sealbridge_core::Envelope::parse(&envelope.to_bytes()).unwrap();
//!         prop_assert_eq!(parsed.identifier(), &params.identifier);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use sealbridge_testkit::fixtures::Deployment;
//!
//! let d = Deployment::new(3, 2);
//! let receipt = d.pipeline.encrypt_and_publish(b"data".to_vec().into()).await?;
//! let plaintext = d.pipeline.fetch_and_decrypt(&receipt.content_id, &d.session()).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{Deployment, DeploymentBuilder, START_MILLIS};
pub use generators::{envelope_from_params, EnvelopeParams};
pub use vectors::{all_vectors, envelope_from_vector, verify_all_vectors, GoldenEnvelope};
