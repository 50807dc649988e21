//! # Seal Bridge Seal
//!
//! Threshold encryption and policy-gated key release.
//!
//! ## Overview
//!
//! Payloads are encrypted under an identifier bound to an on-chain policy
//! object. Decryption keys are held by a committee of key servers; each
//! releases its share only after dry-running an approval transaction
//! against the ledger on behalf of a user-authorized session key.
//!
//! ## Key Concepts
//!
//! - **Encryption Gateway**: front door to the encryption capability, checks
//!   the threshold and validates the returned envelope header
//! - **Session Key**: short-lived Ed25519 key authorized once by the user
//! - **Approval Transaction**: read-only `seal_approve` call the key servers
//!   simulate before releasing keys
//! - **Key Client**: concurrent fan-out to the committee, threshold-gated
//! - **Backup Key**: the data key, released once at encryption time for
//!   disaster recovery
//!
//! ## Encryption Model
//!
//! 1. **Data Key**: encrypts the payload (ChaCha20-Poly1305, `nonce || ct`)
//! 2. **Shares**: the data key encrypted for each key server's identity key
//! 3. **Key Release**: identity keys travel wrapped for an ephemeral X25519 key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use sealbridge_core::{Identifier, PackageId, PolicyRef, Threshold};
//! use sealbridge_seal::{EncryptionGateway, LocalCommittee};
//!
//! async fn example() {
//!     let committee = LocalCommittee::new(3, 42);
//!     let gateway = EncryptionGateway::new(Arc::new(committee.service()), committee.ids());
//!
//!     let id = Identifier::for_policy(&PolicyRef::ZERO);
//!     let threshold = Threshold::new(2).unwrap();
//!     let encrypted = gateway
//!         .encrypt(PackageId::ZERO, id, threshold, Bytes::from_static(b"hello"))
//!         .await
//!         .unwrap();
//!     assert_eq!(encrypted.envelope.header.share_count, 3);
//! }
//! ```

pub mod approval;
pub mod crypto;
pub mod encrypt;
pub mod error;
pub mod http;
pub mod keys;
pub mod keyshare;
pub mod local;
pub mod policy;
pub mod session;

pub use approval::{
    ApprovalCall, ApprovalTransaction, DEFAULT_APPROVAL_FUNCTION, DEFAULT_POLICY_MODULE,
};
pub use crypto::{
    address_for, decrypt_with_backup_key, DataKey, Ed25519PublicKey, Ed25519Signature,
    EncryptionKey, EncryptionNonce, EphemeralKeyPair, Keypair, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use encrypt::{EncryptRequest, Encrypted, EncryptedObject, EncryptionGateway, SealService};
pub use error::{Result, SealError};
pub use http::{HttpKeyServer, HttpSealService};
pub use keys::{
    FetchKeyRequest, FetchKeyResponse, IdentityKey, IdentityKeyResponse, KeyClient, KeyMaterial,
    KeyServer, KeyServerError,
};
pub use keyshare::WrappedKey;
pub use local::{LocalCommittee, LocalKeyServer, LocalSealService};
pub use policy::{MemoryLedger, PolicyLedger, Simulation};
pub use session::{
    Certificate, Clock, Ed25519Signer, ManualClock, PersonalSigner, SessionKey, SessionState,
    SystemClock,
};
