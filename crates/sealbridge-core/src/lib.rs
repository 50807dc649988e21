//! # Seal Bridge Core
//!
//! Pure primitives for Seal Bridge: policy-bound identifiers, ledger object
//! references and the self-describing envelope codec.
//!
//! This crate contains no I/O, no storage, no networking. Randomness is
//! injected, so every function here is deterministic given its inputs.
//!
//! ## Key Types
//!
//! - [`PolicyRef`] - Reference to the on-chain access-control object
//! - [`PackageId`] - Namespace under which policy checks run
//! - [`Identifier`] - The encryption id, `policy || nonce`
//! - [`Threshold`] - Number of key-server shares required to decrypt
//! - [`Envelope`] - Ciphertext plus the metadata needed to request keys
//!
//! ## Identifiers
//!
//! ```
//! use sealbridge_core::{FixedRandom, IdentifierBuilder};
//! use std::sync::Arc;
//!
//! let builder = IdentifierBuilder::new(Arc::new(FixedRandom::new([1, 2, 3, 4, 5])));
//! let policy = "0x0000000000000000000000000000000000000000000000000000000000000000";
//! let id = builder.build(policy, true).unwrap();
//! assert_eq!(id.len(), 37);
//! ```
//!
//! ## Envelopes
//!
//! See the [`envelope`] module for the wire format. [`EnvelopeHeader::parse`]
//! recovers namespace, identifier and threshold without any key.

pub mod envelope;
pub mod error;
pub mod id;
pub mod types;

pub use envelope::{EncryptedShare, Envelope, EnvelopeHeader, ENVELOPE_MAGIC, ENVELOPE_VERSION};
pub use error::{CoreError, Result};
pub use id::{FixedRandom, IdentifierBuilder, OsRandom, RandomSource, SeededRandom};
pub use types::{
    Address, Identifier, KeyServerId, Nonce, PackageId, PolicyRef, Threshold, NONCE_LEN,
    OBJECT_ID_LEN,
};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn envelope_roundtrip(
            package in any::<[u8; 32]>(),
            id in proptest::collection::vec(any::<u8>(), 1..80),
            threshold in 1u8..4,
            extra in 0u8..3,
            ciphertext in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let count = threshold + extra;
            let shares = (0..count)
                .map(|i| EncryptedShare {
                    server: KeyServerId::from_bytes([i; 32]),
                    share: vec![i; i as usize * 3],
                })
                .collect();
            let envelope = Envelope::new(
                PackageId::from_bytes(package),
                Identifier::from_bytes(id).unwrap(),
                Threshold::new(threshold).unwrap(),
                shares,
                ciphertext,
            )
            .unwrap();

            let parsed = Envelope::parse(&envelope.to_bytes()).unwrap();
            prop_assert_eq!(parsed, envelope);
        }

        #[test]
        fn parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = Envelope::parse(&bytes);
        }

        #[test]
        fn identifier_is_always_policy_bound(policy in any::<[u8; 32]>(), seed in any::<u64>()) {
            let builder = IdentifierBuilder::new(std::sync::Arc::new(SeededRandom::new(seed)));
            let policy = PolicyRef::from_bytes(policy);
            let id = builder.build_for(&policy, true);
            prop_assert_eq!(id.len(), OBJECT_ID_LEN + NONCE_LEN);
            prop_assert_eq!(id.policy_prefix(), Some(policy));
        }
    }
}
