//! Strong type definitions for Seal Bridge.
//!
//! Ledger object references are 32-byte newtypes so a policy object can never
//! be passed where a package or an address is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Length of every ledger object reference in bytes.
pub const OBJECT_ID_LEN: usize = 32;

/// Length of the per-request nonce appended to identifiers.
pub const NONCE_LEN: usize = 5;

/// Strip an optional `0x` prefix and decode exactly 32 bytes of hex.
pub(crate) fn decode_object_hex(s: &str) -> std::result::Result<[u8; OBJECT_ID_LEN], String> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| format!("{trimmed:?}: {e}"))?;
    if bytes.len() != OBJECT_ID_LEN {
        return Err(format!(
            "{trimmed:?}: expected {OBJECT_ID_LEN} bytes, got {}",
            bytes.len()
        ));
    }
    let mut arr = [0u8; OBJECT_ID_LEN];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident, $err:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; OBJECT_ID_LEN]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
                &self.0
            }

            /// Lowercase hex without prefix.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex, with or without a `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self> {
                decode_object_hex(s).map(Self).map_err(CoreError::$err)
            }

            /// The all-zero reference.
            pub const ZERO: Self = Self([0u8; OBJECT_ID_LEN]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hex(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; OBJECT_ID_LEN]> for $name {
            fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
                Self(bytes)
            }
        }
    };
}

object_id!(
    /// Reference to an on-chain access-control object (e.g. an allowlist).
    ///
    /// Looked up, never mutated.
    PolicyRef,
    InvalidReference
);

object_id!(
    /// The namespace ("package") under which policy checks are evaluated.
    PackageId,
    InvalidObjectId
);

object_id!(
    /// A ledger account address.
    Address,
    InvalidObjectId
);

object_id!(
    /// On-chain object id of a key server.
    KeyServerId,
    InvalidObjectId
);

/// Random bytes appended to a policy reference for per-object uniqueness.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// The encryption id: `PolicyRef` optionally followed by a `Nonce`.
///
/// The same value is passed to encryption, checked by the on-chain policy and
/// recovered from the envelope header.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    /// Maximum encoded length (bounded by the u16 length field of the envelope).
    pub const MAX_LEN: usize = u16::MAX as usize;

    /// Create from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CoreError::InvalidIdentifier("identifier is empty".into()));
        }
        if bytes.len() > Self::MAX_LEN {
            return Err(CoreError::InvalidIdentifier(format!(
                "identifier is {} bytes, maximum is {}",
                bytes.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(bytes))
    }

    /// Identifier for a bare policy reference.
    pub fn for_policy(policy: &PolicyRef) -> Self {
        Self(policy.0.to_vec())
    }

    /// Identifier for `policy || nonce`.
    pub fn for_policy_with_nonce(policy: &PolicyRef, nonce: &Nonce) -> Self {
        let mut bytes = Vec::with_capacity(OBJECT_ID_LEN + NONCE_LEN);
        bytes.extend_from_slice(&policy.0);
        bytes.extend_from_slice(&nonce.0);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; identifiers cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(digits).map_err(|e| CoreError::InvalidIdentifier(format!("{s:?}: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// The policy object this identifier is namespaced under, if long enough.
    pub fn policy_prefix(&self) -> Option<PolicyRef> {
        let head = self.0.get(..OBJECT_ID_LEN)?;
        let mut arr = [0u8; OBJECT_ID_LEN];
        arr.copy_from_slice(head);
        Some(PolicyRef(arr))
    }

    /// Whether this identifier is namespaced under `policy`.
    pub fn is_bound_to(&self, policy: &PolicyRef) -> bool {
        self.0.starts_with(&policy.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Identifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Number of key-server shares required to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Threshold(u8);

impl Threshold {
    /// Create a threshold; zero is rejected.
    pub fn new(value: u8) -> Result<Self> {
        if value == 0 {
            return Err(CoreError::InvalidThreshold("threshold must be >= 1".into()));
        }
        Ok(Self(value))
    }

    /// The raw value.
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// As a count.
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Fail when more shares are required than `server_count` servers can supply.
    pub fn check_against(&self, server_count: usize) -> Result<()> {
        if self.as_usize() > server_count {
            return Err(CoreError::InvalidThreshold(format!(
                "threshold {} exceeds {} configured key servers",
                self.0, server_count
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Threshold {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_ref_hex_roundtrip() {
        let policy = PolicyRef::from_bytes([0x42; 32]);
        let recovered = PolicyRef::from_hex(&policy.to_string()).unwrap();
        assert_eq!(policy, recovered);

        let unprefixed = PolicyRef::from_hex(&policy.to_hex()).unwrap();
        assert_eq!(policy, unprefixed);
    }

    #[test]
    fn test_policy_ref_wrong_length_is_invalid_reference() {
        let err = PolicyRef::from_hex("0x00").unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference(_)));

        let err = PolicyRef::from_hex("0xzz").unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference(_)));
    }

    #[test]
    fn test_package_id_display() {
        let package = PackageId::from_bytes([0xab; 32]);
        let display = package.to_string();
        assert!(display.starts_with("0xabab"));
        assert_eq!(display.len(), 66);
    }

    #[test]
    fn test_identifier_prefix() {
        let policy = PolicyRef::from_bytes([7; 32]);
        let nonce = Nonce::from_bytes([1, 2, 3, 4, 5]);
        let id = Identifier::for_policy_with_nonce(&policy, &nonce);

        assert_eq!(id.len(), 37);
        assert_eq!(id.policy_prefix(), Some(policy));
        assert!(id.is_bound_to(&policy));
        assert!(!id.is_bound_to(&PolicyRef::ZERO));
    }

    #[test]
    fn test_identifier_rejects_empty() {
        assert!(Identifier::from_bytes(Vec::new()).is_err());
        assert!(Identifier::from_hex("0x").is_err());
    }

    #[test]
    fn test_identifier_hex_accepts_prefix() {
        let a = Identifier::from_hex("0x0102").unwrap();
        let b = Identifier::from_hex("0102").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), "0102");
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(Threshold::new(0).is_err());
        let t = Threshold::new(2).unwrap();
        assert!(t.check_against(2).is_ok());
        assert!(t.check_against(1).is_err());
    }
}
