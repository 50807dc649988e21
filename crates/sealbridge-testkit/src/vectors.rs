//! Golden test vectors for deterministic verification.
//!
//! Each vector pins the exact wire bytes of an envelope so that any change to
//! the codec layout shows up as a test failure rather than as envelopes other
//! tools can no longer read.

use sealbridge_core::{
    EncryptedShare, Envelope, Identifier, KeyServerId, Nonce, PackageId, PolicyRef, Threshold,
};

/// Policy object of the reference scenario: 32 zero bytes.
pub const SCENARIO_POLICY: PolicyRef = PolicyRef::ZERO;

/// Nonce of the reference scenario.
pub const SCENARIO_NONCE: [u8; 5] = [0x01, 0x02, 0x03, 0x04, 0x05];

/// Plaintext of the reference scenario.
pub const SCENARIO_PLAINTEXT: &[u8] = b"hello";

/// Threshold of the reference scenario, over two servers.
pub const SCENARIO_THRESHOLD: u8 = 2;

/// Number of key servers in the reference scenario.
pub const SCENARIO_SERVERS: usize = 2;

/// The reference scenario identifier: zero policy followed by `01..05`.
pub fn scenario_identifier() -> Identifier {
    Identifier::for_policy_with_nonce(&SCENARIO_POLICY, &Nonce::from_bytes(SCENARIO_NONCE))
}

/// A golden envelope vector.
#[derive(Debug, Clone)]
pub struct GoldenEnvelope {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub package: [u8; 32],
    pub identifier: &'static [u8],
    pub threshold: u8,
    /// `(server, share)` pairs in envelope order.
    pub shares: &'static [([u8; 32], &'static [u8])],
    pub ciphertext: &'static [u8],
    /// Expected encoding (hex).
    pub expected_hex: &'static str,
}

const NONCED_ID: [u8; 37] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0x01, 0x02, 0x03, 0x04, 0x05,
];

const TWO_SHARES: &[([u8; 32], &[u8])] = &[([0xaa; 32], b"share-a"), ([0xbb; 32], b"share-b")];
const EMPTY_SHARE: &[([u8; 32], &[u8])] = &[([0xcc; 32], b"")];

/// Get all golden envelope vectors.
pub fn all_vectors() -> Vec<GoldenEnvelope> {
    vec![
        GoldenEnvelope {
            name: "two shares, nonced identifier",
            package: [0x11; 32],
            identifier: &NONCED_ID,
            threshold: 2,
            shares: TWO_SHARES,
            ciphertext: b"hello",
            expected_hex: concat!(
                "53424556",
                "01",
                "1111111111111111111111111111111111111111111111111111111111111111",
                "0025",
                "0000000000000000000000000000000000000000000000000000000000000000",
                "0102030405",
                "02",
                "02",
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "0007",
                "73686172652d61",
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "0007",
                "73686172652d62",
                "00000005",
                "68656c6c6f",
            ),
        },
        GoldenEnvelope {
            name: "single empty share, bare policy identifier",
            package: [0x00; 32],
            identifier: &[0x22; 32],
            threshold: 1,
            shares: EMPTY_SHARE,
            ciphertext: b"",
            expected_hex: concat!(
                "53424556",
                "01",
                "0000000000000000000000000000000000000000000000000000000000000000",
                "0020",
                "2222222222222222222222222222222222222222222222222222222222222222",
                "01",
                "01",
                "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc",
                "0000",
                "00000000",
            ),
        },
    ]
}

/// Build the envelope a golden vector describes.
pub fn envelope_from_vector(vector: &GoldenEnvelope) -> Envelope {
    let shares = vector
        .shares
        .iter()
        .map(|(server, share)| EncryptedShare {
            server: KeyServerId::from_bytes(*server),
            share: share.to_vec(),
        })
        .collect();

    Envelope::new(
        PackageId::from_bytes(vector.package),
        Identifier::from_bytes(vector.identifier).expect("vector identifier is valid"),
        Threshold::new(vector.threshold).expect("vector threshold is valid"),
        shares,
        vector.ciphertext,
    )
    .expect("vector envelope is valid")
}

/// Verify all golden vectors encode to their expected bytes.
///
/// Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = hex::encode(envelope_from_vector(v).to_bytes());
            (v.name.to_string(), hex == v.expected_hex, hex)
        })
        .collect()
}
