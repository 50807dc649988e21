//! Session credentials.
//!
//! A [`SessionKey`] is a short-lived Ed25519 key the user authorizes once,
//! by signing a personal message with their long-term key. Key servers accept
//! requests signed by the session key until it expires, so the user's wallet
//! is involved only at mint time.
//!
//! ```text
//! (none) --mint--> Active --now >= expiry--> Expired
//! ```
//!
//! Expiry is terminal. A new session has to be minted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use sealbridge_core::{Address, PackageId};

use crate::crypto::{address_for, Ed25519PublicKey, Ed25519Signature, Keypair, X25519PublicKey};
use crate::error::{Result, SealError};

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Source of the current time in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: u64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A wallet-style signer for personal messages.
pub trait PersonalSigner: Send + Sync {
    /// The address this signer controls.
    fn address(&self) -> Address;

    fn public_key(&self) -> Ed25519PublicKey;

    fn sign_personal_message(&self, message: &[u8]) -> Result<Ed25519Signature>;
}

/// Signs with a local Ed25519 key.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    keypair: Keypair,
}

impl Ed25519Signer {
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(seed),
        }
    }

    /// Parse a 32-byte hex seed, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| SealError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            SealError::InvalidKey(format!("signer seed must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }
}

impl PersonalSigner for Ed25519Signer {
    fn address(&self) -> Address {
        address_for(&self.keypair.public_key())
    }

    fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    fn sign_personal_message(&self, message: &[u8]) -> Result<Ed25519Signature> {
        Ok(self.keypair.sign(message))
    }
}

/// The message a user signs to authorize a session key.
pub fn personal_message(
    package: &PackageId,
    ttl_minutes: u32,
    creation_ms: u64,
    session_vk: &Ed25519PublicKey,
) -> String {
    format!(
        "Accessing keys of package {package} for {ttl_minutes} mins from {creation_ms}, session key {}",
        session_vk.to_hex()
    )
}

/// The bytes a session key signs for one key request.
pub fn request_message(tx_bytes: &[u8], enc_key: &X25519PublicKey) -> Vec<u8> {
    let mut message = Vec::with_capacity(24 + 32 + 32);
    message.extend_from_slice(b"sealbridge fetch key v1");
    message.extend_from_slice(blake3::hash(tx_bytes).as_bytes());
    message.extend_from_slice(enc_key.as_bytes());
    message
}

/// Lifecycle state of a minted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
}

/// What a key server checks before serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub user: Address,
    pub user_public_key: Ed25519PublicKey,
    pub session_vk: Ed25519PublicKey,
    pub package: PackageId,
    pub creation_ms: u64,
    pub ttl_minutes: u32,
    /// User signature over [`personal_message`].
    pub signature: Ed25519Signature,
}

impl Certificate {
    pub fn expires_at_ms(&self) -> u64 {
        self.creation_ms
            .saturating_add(u64::from(self.ttl_minutes).saturating_mul(MILLIS_PER_MINUTE))
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    /// Check the address derivation and the user's signature.
    pub fn verify(&self) -> Result<()> {
        if address_for(&self.user_public_key) != self.user {
            return Err(SealError::InvalidSignature(format!(
                "public key does not control {}",
                self.user
            )));
        }
        let message = personal_message(
            &self.package,
            self.ttl_minutes,
            self.creation_ms,
            &self.session_vk,
        );
        self.user_public_key.verify(message.as_bytes(), &self.signature)
    }

    /// Check a request signature made by this certificate's session key.
    pub fn verify_request(
        &self,
        tx_bytes: &[u8],
        enc_key: &X25519PublicKey,
        signature: &Ed25519Signature,
    ) -> Result<()> {
        self.session_vk
            .verify(&request_message(tx_bytes, enc_key), signature)
    }
}

/// A minted, user-authorized session key.
#[derive(Debug, Clone)]
pub struct SessionKey {
    certificate: Certificate,
    session: Keypair,
}

impl SessionKey {
    /// Mint a session for `address` scoped to `package`.
    ///
    /// Fails with `InvalidTtl` when `ttl_minutes` is zero and with
    /// `SignerMismatch` when `signer` does not control `address`.
    pub fn mint(
        address: Address,
        package: PackageId,
        ttl_minutes: u32,
        signer: &dyn PersonalSigner,
        clock: &dyn Clock,
    ) -> Result<Self> {
        if ttl_minutes == 0 {
            return Err(SealError::InvalidTtl(ttl_minutes));
        }
        let signer_address = signer.address();
        if signer_address != address {
            return Err(SealError::SignerMismatch {
                requested: address,
                signer: signer_address,
            });
        }

        let session = Keypair::generate();
        let session_vk = session.public_key();
        let creation_ms = clock.now_millis();
        let message = personal_message(&package, ttl_minutes, creation_ms, &session_vk);
        let signature = signer.sign_personal_message(message.as_bytes())?;

        tracing::debug!(%address, %package, ttl_minutes, "minted session key");

        Ok(Self {
            certificate: Certificate {
                user: address,
                user_public_key: signer.public_key(),
                session_vk,
                package,
                creation_ms,
                ttl_minutes,
                signature,
            },
            session,
        })
    }

    pub fn address(&self) -> &Address {
        &self.certificate.user
    }

    pub fn package(&self) -> &PackageId {
        &self.certificate.package
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.certificate.expires_at_ms()
    }

    pub fn state(&self, clock: &dyn Clock) -> SessionState {
        if self.certificate.is_expired_at(clock.now_millis()) {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// Fail with `SessionExpired` unless the session is active now.
    pub fn ensure_active(&self, clock: &dyn Clock) -> Result<()> {
        match self.state(clock) {
            SessionState::Active => Ok(()),
            SessionState::Expired => Err(SealError::SessionExpired),
        }
    }

    /// Sign a key request with the session key.
    pub fn sign_request(&self, tx_bytes: &[u8], enc_key: &X25519PublicKey) -> Ed25519Signature {
        self.session.sign(&request_message(tx_bytes, enc_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u64 = 1_700_000_000_000;

    fn mint(ttl: u32, clock: &ManualClock) -> Result<SessionKey> {
        let signer = Ed25519Signer::from_seed(&[3; 32]);
        SessionKey::mint(
            signer.address(),
            PackageId::from_bytes([9; 32]),
            ttl,
            &signer,
            clock,
        )
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let clock = ManualClock::new(START);
        assert!(matches!(mint(0, &clock), Err(SealError::InvalidTtl(0))));
    }

    #[test]
    fn test_signer_mismatch() {
        let clock = ManualClock::new(START);
        let signer = Ed25519Signer::from_seed(&[3; 32]);
        let result = SessionKey::mint(
            Address::from_bytes([1; 32]),
            PackageId::ZERO,
            10,
            &signer,
            &clock,
        );
        assert!(matches!(result, Err(SealError::SignerMismatch { .. })));
    }

    #[test]
    fn test_expiry_boundary() {
        let clock = ManualClock::new(START);
        let session = mint(10, &clock).unwrap();
        assert_eq!(session.expires_at_ms(), START + 600_000);

        clock.set(START + 599_999);
        assert_eq!(session.state(&clock), SessionState::Active);
        assert!(session.ensure_active(&clock).is_ok());

        clock.set(START + 600_000);
        assert_eq!(session.state(&clock), SessionState::Expired);
        assert!(matches!(
            session.ensure_active(&clock),
            Err(SealError::SessionExpired)
        ));
    }

    #[test]
    fn test_certificate_verifies() {
        let clock = ManualClock::new(START);
        let session = mint(5, &clock).unwrap();
        assert!(session.certificate().verify().is_ok());
    }

    #[test]
    fn test_tampered_certificate_fails() {
        let clock = ManualClock::new(START);
        let session = mint(5, &clock).unwrap();

        let mut longer = session.certificate().clone();
        longer.ttl_minutes = 500;
        assert!(longer.verify().is_err());

        let mut other_user = session.certificate().clone();
        other_user.user = Address::from_bytes([1; 32]);
        assert!(other_user.verify().is_err());
    }

    #[test]
    fn test_request_signature() {
        let clock = ManualClock::new(START);
        let session = mint(5, &clock).unwrap();
        let enc_key = X25519PublicKey::from_bytes([4; 32]);

        let sig = session.sign_request(b"tx", &enc_key);
        let cert = session.certificate();
        assert!(cert.verify_request(b"tx", &enc_key, &sig).is_ok());
        assert!(cert.verify_request(b"other tx", &enc_key, &sig).is_err());
    }

    #[test]
    fn test_personal_message_format() {
        let vk = Ed25519PublicKey::from_bytes([0; 32]);
        let message = personal_message(&PackageId::from_bytes([0x11; 32]), 10, 42, &vk);
        assert!(message.starts_with("Accessing keys of package 0x1111"));
        assert!(message.contains(" for 10 mins from 42, session key 0000"));
    }

    #[test]
    fn test_signer_from_hex() {
        let a = Ed25519Signer::from_hex(&hex::encode([5u8; 32])).unwrap();
        let b = Ed25519Signer::from_seed(&[5; 32]);
        assert_eq!(a.address(), b.address());
        assert!(Ed25519Signer::from_hex("00").is_err());
    }
}
