//! Cryptographic utilities for the seal module.
//!
//! Provides Ed25519 signing for session credentials, X25519 key agreement and
//! ChaCha20-Poly1305 authenticated encryption for keys in transit, and the
//! data key that encrypts payloads.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use sealbridge_core::{Address, Envelope};

use crate::error::{Result, SealError};

/// Length of the ChaCha20-Poly1305 nonce prefixed to sealed data.
pub const AEAD_NONCE_LEN: usize = 12;

/// Length of the Poly1305 tag appended to sealed data.
pub const AEAD_TAG_LEN: usize = 16;

/// Derive the ledger address controlled by an Ed25519 public key.
pub fn address_for(public_key: &Ed25519PublicKey) -> Address {
    Address::from_bytes(blake3::derive_key(
        "sealbridge address v1",
        public_key.as_bytes(),
    ))
}

/// Verifying half of a session or user signing key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check `signature` over `message`.
    ///
    /// Key servers call this on every certificate and request signature, so a
    /// malformed point is reported as [`SealError::InvalidKey`] rather than a
    /// failed signature.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| SealError::InvalidKey(format!("session public key: {e}")))?;
        key.verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| SealError::InvalidSignature("signature does not match key".into()))
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionPub")
            .field(&format_args!("{}", &self.to_hex()[..16]))
            .finish()
    }
}

/// Detached signature carried in certificates and key requests.
///
/// Hex on the wire so CBOR and JSON bodies agree.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| SealError::InvalidSignature(format!("signature hex: {e}")))?;
        match <[u8; 64]>::try_from(raw.as_slice()) {
            Ok(bytes) => Ok(Self(bytes)),
            Err(_) => Err(SealError::InvalidSignature(format!(
                "signature is {} bytes, want 64",
                raw.len()
            ))),
        }
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature")
            .field(&format_args!("{}..", &self.to_hex()[..16]))
            .finish()
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Ephemeral signing key behind a [`SessionKey`](crate::SessionKey).
///
/// The secret half never leaves the process; only the public key is put in
/// the certificate the user signs.
#[derive(Clone)]
pub struct Keypair {
    secret: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic key, for wallets imported from a seed and for tests.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.secret.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.secret.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?}, <secret>)", self.public_key())
    }
}

/// Key-agreement public key. Requesters publish one per key request so the
/// servers can wrap their shares to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(pk.to_bytes())
    }
}

/// The requester's unwrap secret, held for the lifetime of one key request.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        PublicKey::from(&self.0).into()
    }

    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(self.0.diffie_hellman(&peer.to_dalek()).to_bytes())
    }
}

/// Single-use secret a key server wraps one share with.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret).into();
        Self { secret, public }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Agree on a wrap secret with `peer`. Taking `self` by value makes a
    /// second agreement with the same ephemeral impossible.
    pub fn diffie_hellman(self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(self.secret.diffie_hellman(&peer.to_dalek()).to_bytes())
    }
}

/// Raw X25519 output. Never used as a key directly; see
/// [`SharedKey::derive_encryption_key`].
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Wrap key for one share, bound to `context` (identifier and server).
    pub fn derive_encryption_key(&self, context: &[u8]) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key("sealbridge key wrap v1");
        hasher.update(&self.0);
        hasher.update(context);
        EncryptionKey(*hasher.finalize().as_bytes())
    }
}

/// ChaCha20-Poly1305 key used for share wrapping and the payload body.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| SealError::EncryptionError("aead seal failed".into()))
    }

    /// Fails with [`SealError::DecryptionError`] on a wrong key or any
    /// tampering with `ciphertext`.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| SealError::DecryptionError("authentication tag mismatch".into()))
    }

    /// `nonce || ciphertext || tag` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = EncryptionNonce::generate();
        let mut out = nonce.as_bytes().to_vec();
        out.append(&mut self.encrypt(plaintext, &nonce)?);
        Ok(out)
    }

    /// Reverse [`EncryptionKey::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let min = AEAD_NONCE_LEN + AEAD_TAG_LEN;
        if sealed.len() < min {
            return Err(SealError::DecryptionError(format!(
                "sealed data is {} bytes, need at least {min}",
                sealed.len()
            )));
        }
        let (head, body) = sealed.split_at(AEAD_NONCE_LEN);
        let nonce = EncryptionNonce::try_from(head)?;
        self.decrypt(body, &nonce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; AEAD_NONCE_LEN]);

impl EncryptionNonce {
    pub fn generate() -> Self {
        let mut nonce = Self([0u8; AEAD_NONCE_LEN]);
        rand::thread_rng().fill_bytes(&mut nonce.0);
        nonce
    }

    pub const fn as_bytes(&self) -> &[u8; AEAD_NONCE_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for EncryptionNonce {
    type Error = SealError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        <[u8; AEAD_NONCE_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| SealError::DecryptionError(format!("nonce is {} bytes", bytes.len())))
    }
}

/// The symmetric key that encrypts a payload.
///
/// Returned once from encryption as the backup key. Holding it bypasses the
/// key servers entirely, so its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey([u8; 32]);

impl DataKey {
    /// A fresh key for one payload.
    pub fn generate() -> Self {
        let mut key = Self([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut key.0);
        key
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, as written to `.backupKey.hex` files.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex; surrounding whitespace and a `0x` prefix are accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let raw = hex::decode(digits)
            .map_err(|e| SealError::InvalidKey(format!("backup key hex: {e}")))?;
        <[u8; 32]>::try_from(raw.as_slice())
            .map(Self)
            .map_err(|_| SealError::InvalidKey(format!("backup key is {} bytes, want 32", raw.len())))
    }

    /// Encrypt a payload, producing `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        EncryptionKey::from_bytes(self.0).seal(plaintext)
    }

    /// Decrypt a payload sealed with [`DataKey::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        EncryptionKey::from_bytes(self.0).open(sealed)
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(<redacted>)")
    }
}

/// Decrypt an envelope with its backup key, without contacting any key server.
pub fn decrypt_with_backup_key(envelope: &Envelope, key: &DataKey) -> Result<Vec<u8>> {
    key.open(&envelope.ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_secrets_agree() {
        let alice = X25519StaticSecret::generate();
        let bob = X25519StaticSecret::generate();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice.public_key());

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_share_wrap_agreement() {
        let server = X25519StaticSecret::generate();
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let sender_shared = ephemeral.diffie_hellman(&server.public_key());
        let receiver_shared = server.diffie_hellman(&ephemeral_public);

        assert_eq!(sender_shared.as_bytes(), receiver_shared.as_bytes());
    }

    #[test]
    fn test_seal_open() {
        let key = DataKey::generate();
        let sealed = key.seal(b"hello, world!").unwrap();
        assert_eq!(sealed.len(), AEAD_NONCE_LEN + 13 + AEAD_TAG_LEN);
        assert_eq!(key.open(&sealed).unwrap(), b"hello, world!");
    }

    #[test]
    fn test_seal_empty_plaintext() {
        let key = DataKey::generate();
        let sealed = key.seal(b"").unwrap();
        assert_eq!(sealed.len(), AEAD_NONCE_LEN + AEAD_TAG_LEN);
        assert!(key.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let sealed = DataKey::generate().seal(b"secret").unwrap();
        assert!(matches!(
            DataKey::generate().open(&sealed),
            Err(SealError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_open_truncated_fails() {
        let key = DataKey::generate();
        assert!(key.open(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_data_key_hex() {
        let key = DataKey::from_bytes([0xab; 32]);
        let recovered = DataKey::from_hex(&format!("0x{}\n", key.to_hex())).unwrap();
        assert_eq!(key, recovered);
        assert!(DataKey::from_hex("abcd").is_err());
        assert_eq!(format!("{key:?}"), "DataKey(<redacted>)");
    }

    #[test]
    fn test_signature_verify() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let sig = keypair.sign(b"message");
        assert!(keypair.public_key().verify(b"message", &sig).is_ok());
        assert!(keypair.public_key().verify(b"other", &sig).is_err());
    }

    #[test]
    fn test_signature_serde_hex() {
        let sig = Keypair::generate().sign(b"m");
        let json = serde_json::to_string(&sig).unwrap();
        let back: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, back);
    }

    #[test]
    fn test_wrap_key_bound_to_context() {
        let shared = SharedKey([0x42; 32]);
        let a = shared.derive_encryption_key(b"context-a");
        let b = shared.derive_encryption_key(b"context-b");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_address_is_deterministic() {
        let pk = Keypair::from_seed(&[1; 32]).public_key();
        assert_eq!(address_for(&pk), address_for(&pk));
        assert_ne!(address_for(&pk), Address::ZERO);
    }
}
