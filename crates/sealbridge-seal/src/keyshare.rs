//! Key sharing via X25519 key agreement.
//!
//! A key server never sends an identity key in the clear. It wraps the key
//! for the ephemeral encryption key named in the request, bound to a context
//! (server id and identifier) so a wrapped key cannot be replayed under
//! another identity.

use serde::{Deserialize, Serialize};

use sealbridge_core::{Identifier, KeyServerId};

use crate::crypto::{EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, SealError};

/// Binding context for a key released by `server` for `identifier`.
pub fn wrap_context(server: &KeyServerId, identifier: &Identifier) -> Vec<u8> {
    let mut context = Vec::with_capacity(32 + identifier.len());
    context.extend_from_slice(server.as_bytes());
    context.extend_from_slice(identifier.as_bytes());
    context
}

/// An identity key as it travels from a key server to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// The server's single-use agreement key.
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    /// AEAD output: 32 key bytes plus tag.
    pub encrypted_key: Vec<u8>,
}

impl WrappedKey {
    /// Wrap `key` for `recipient`, bound to `context`.
    pub fn create(key: &[u8; 32], recipient: &X25519PublicKey, context: &[u8]) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let wrap_key = ephemeral
            .diffie_hellman(recipient)
            .derive_encryption_key(context);

        let nonce = EncryptionNonce::generate();
        let encrypted_key = wrap_key.encrypt(key, &nonce)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            encrypted_key,
        })
    }

    /// Recover the key with the recipient's secret.
    pub fn open(&self, recipient_secret: &X25519StaticSecret, context: &[u8]) -> Result<[u8; 32]> {
        let wrap_key = recipient_secret
            .diffie_hellman(&self.ephemeral_public)
            .derive_encryption_key(context);

        let opened = wrap_key.decrypt(&self.encrypted_key, &self.nonce)?;
        <[u8; 32]>::try_from(opened.as_slice()).map_err(|_| {
            SealError::DecryptionError(format!("unwrapped key is {} bytes", opened.len()))
        })
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SealError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SealError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Vec<u8> {
        wrap_context(
            &KeyServerId::from_bytes([1; 32]),
            &Identifier::from_bytes(vec![2; 37]).unwrap(),
        )
    }

    #[test]
    fn test_wrap_roundtrip() {
        let recipient = X25519StaticSecret::generate();
        let wrapped = WrappedKey::create(&[0x42; 32], &recipient.public_key(), &context()).unwrap();
        assert_eq!(wrapped.open(&recipient, &context()).unwrap(), [0x42; 32]);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = X25519StaticSecret::generate();
        let wrapped = WrappedKey::create(&[0x42; 32], &recipient.public_key(), &context()).unwrap();
        assert!(wrapped.open(&X25519StaticSecret::generate(), &context()).is_err());
    }

    #[test]
    fn test_wrong_context_fails() {
        let recipient = X25519StaticSecret::generate();
        let wrapped = WrappedKey::create(&[0x42; 32], &recipient.public_key(), &context()).unwrap();
        assert!(wrapped.open(&recipient, b"another context").is_err());
    }

    #[test]
    fn test_serialization() {
        let recipient = X25519StaticSecret::generate();
        let wrapped = WrappedKey::create(&[7; 32], &recipient.public_key(), b"ctx").unwrap();
        let recovered = WrappedKey::from_bytes(&wrapped.to_bytes().unwrap()).unwrap();
        assert_eq!(wrapped, recovered);
    }
}
