//! Identifier construction.
//!
//! An identifier is the policy object's bytes, optionally followed by a fresh
//! nonce. Binding the identifier to the policy object ties every ciphertext to
//! exactly one access-control object; the nonce lets many ciphertexts share a
//! policy without colliding.
//!
//! Randomness is injected through [`RandomSource`] so the builder stays pure
//! and can be driven by a fixed seed in tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::Result;
use crate::types::{Identifier, Nonce, PolicyRef, NONCE_LEN};

/// A source of random bytes.
///
/// Implementations must be safe to share between concurrent pipeline runs.
pub trait RandomSource: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Deterministic generator seeded once; for tests only.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Create from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn fill(&self, buf: &mut [u8]) {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.fill_bytes(buf);
    }
}

/// Repeats a fixed byte pattern. Used for golden vectors.
#[derive(Debug, Clone)]
pub struct FixedRandom {
    pattern: Vec<u8>,
}

impl FixedRandom {
    /// Create from a non-empty pattern; an empty pattern yields zeros.
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl RandomSource for FixedRandom {
    fn fill(&self, buf: &mut [u8]) {
        if self.pattern.is_empty() {
            buf.fill(0);
            return;
        }
        for (dst, src) in buf.iter_mut().zip(self.pattern.iter().cycle()) {
            *dst = *src;
        }
    }
}

/// Builds policy-bound identifiers.
#[derive(Clone)]
pub struct IdentifierBuilder {
    random: Arc<dyn RandomSource>,
}

impl IdentifierBuilder {
    /// Create a builder drawing nonces from `random`.
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// A builder backed by the OS CSPRNG.
    pub fn os() -> Self {
        Self::new(Arc::new(OsRandom))
    }

    /// Draw a fresh nonce.
    pub fn nonce(&self) -> Nonce {
        let mut bytes = [0u8; NONCE_LEN];
        self.random.fill(&mut bytes);
        Nonce::from_bytes(bytes)
    }

    /// Build an identifier from a hex policy reference.
    ///
    /// Fails with `InvalidReference` unless `policy_ref_hex` decodes to exactly
    /// 32 bytes.
    pub fn build(&self, policy_ref_hex: &str, include_nonce: bool) -> Result<Identifier> {
        let policy = PolicyRef::from_hex(policy_ref_hex)?;
        Ok(self.build_for(&policy, include_nonce))
    }

    /// Build an identifier from a parsed policy reference.
    pub fn build_for(&self, policy: &PolicyRef, include_nonce: bool) -> Identifier {
        if include_nonce {
            Identifier::for_policy_with_nonce(policy, &self.nonce())
        } else {
            Identifier::for_policy(policy)
        }
    }
}

impl Default for IdentifierBuilder {
    fn default() -> Self {
        Self::os()
    }
}

impl fmt::Debug for IdentifierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::collections::HashSet;

    const POLICY_HEX: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_build_without_nonce_is_policy_alone() {
        let builder = IdentifierBuilder::os();
        let id = builder.build(POLICY_HEX, false).unwrap();
        assert_eq!(id.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_build_with_fixed_nonce() {
        let builder = IdentifierBuilder::new(Arc::new(FixedRandom::new([1, 2, 3, 4, 5])));
        let id = builder.build(POLICY_HEX, true).unwrap();

        let mut expected = vec![0u8; 32];
        expected.extend_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(id.as_bytes(), expected.as_slice());
        assert_eq!(id.to_hex(), hex::encode(&expected));
    }

    #[test]
    fn test_build_rejects_bad_reference() {
        let builder = IdentifierBuilder::os();
        assert!(matches!(
            builder.build("0x1234", true),
            Err(CoreError::InvalidReference(_))
        ));
        assert!(matches!(
            builder.build("not hex", false),
            Err(CoreError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = IdentifierBuilder::new(Arc::new(SeededRandom::new(9)));
        let b = IdentifierBuilder::new(Arc::new(SeededRandom::new(9)));
        assert_eq!(a.nonce(), b.nonce());
    }

    #[test]
    fn test_concurrent_nonces_are_distinct() {
        let builder = IdentifierBuilder::os();
        let policy = PolicyRef::ZERO;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let builder = builder.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .map(|_| builder.build_for(&policy, true))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id.is_bound_to(&policy));
                assert!(seen.insert(id), "duplicate identifier");
            }
        }
        assert_eq!(seen.len(), 16 * 64);
    }
}
