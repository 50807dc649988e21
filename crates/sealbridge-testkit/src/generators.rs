//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealbridge_core::{
    EncryptedShare, Envelope, Identifier, KeyServerId, Nonce, PackageId, PolicyRef, Threshold,
};

/// Generate a random PackageId.
pub fn package_id() -> impl Strategy<Value = PackageId> {
    any::<[u8; 32]>().prop_map(PackageId::from_bytes)
}

/// Generate a random PolicyRef.
pub fn policy_ref() -> impl Strategy<Value = PolicyRef> {
    any::<[u8; 32]>().prop_map(PolicyRef::from_bytes)
}

/// Generate a policy-namespaced identifier, with or without a nonce.
pub fn identifier() -> impl Strategy<Value = Identifier> {
    (policy_ref(), any::<Option<[u8; 5]>>()).prop_map(|(policy, nonce)| match nonce {
        Some(nonce) => Identifier::for_policy_with_nonce(&policy, &Nonce::from_bytes(nonce)),
        None => Identifier::for_policy(&policy),
    })
}

/// Generate a `(threshold, server_count)` pair with `1 <= t <= n <= max`.
pub fn threshold_and_servers(max: u8) -> impl Strategy<Value = (Threshold, usize)> {
    (1u8..=max.max(1))
        .prop_flat_map(|n| (1u8..=n, Just(n)))
        .prop_map(|(t, n)| {
            (
                Threshold::new(t).expect("t is at least 1"),
                usize::from(n),
            )
        })
}

/// Generate plaintext bytes of specified max length.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating an envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    pub package: PackageId,
    pub identifier: Identifier,
    pub threshold: Threshold,
    pub shares: Vec<EncryptedShare>,
    pub ciphertext: Vec<u8>,
}

impl Arbitrary for EnvelopeParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            package_id(),
            identifier(),
            threshold_and_servers(8),
            prop::collection::vec(any::<u8>(), 0..=64), // share bytes
            plaintext(512),
        )
            .prop_map(|(package, identifier, (threshold, n), share, ciphertext)| {
                let shares = (0..n)
                    .map(|i| EncryptedShare {
                        server: KeyServerId::from_bytes([i as u8 + 1; 32]),
                        share: share.clone(),
                    })
                    .collect();
                EnvelopeParams {
                    package,
                    identifier,
                    threshold,
                    shares,
                    ciphertext,
                }
            })
            .boxed()
    }
}

/// Generate an envelope from parameters.
pub fn envelope_from_params(params: &EnvelopeParams) -> Envelope {
    Envelope::new(
        params.package,
        params.identifier.clone(),
        params.threshold,
        params.shares.clone(),
        params.ciphertext.clone(),
    )
    .expect("generated parameters are valid")
}
