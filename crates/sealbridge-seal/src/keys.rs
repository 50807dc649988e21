//! Key retrieval from the key-server committee.
//!
//! [`KeyClient::request_keys`] fans one signed request out to every
//! configured server at once and succeeds only when at least `threshold`
//! servers released a key for every requested identifier. Results below
//! threshold are discarded, never returned partially.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sealbridge_core::{Envelope, Identifier, KeyServerId, Threshold};

use crate::approval::ApprovalTransaction;
use crate::crypto::{DataKey, Ed25519Signature, EncryptionKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, SealError};
use crate::keyshare::{wrap_context, WrappedKey};
use crate::session::{Certificate, Clock, SessionKey};

/// A signed key request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchKeyRequest {
    /// CBOR-encoded [`ApprovalTransaction`].
    pub tx_bytes: Vec<u8>,
    /// Ephemeral key the response must be wrapped for.
    pub enc_key: X25519PublicKey,
    pub certificate: Certificate,
    /// Session-key signature over the transaction and `enc_key`.
    pub request_signature: Ed25519Signature,
}

/// One released identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeyResponse {
    pub identifier: Identifier,
    pub wrapped: WrappedKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchKeyResponse {
    pub keys: Vec<IdentityKeyResponse>,
}

/// Failures reported by a single key server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyServerError {
    #[error("key server unavailable: {0}")]
    Unavailable(String),

    #[error("session key expired")]
    ExpiredSession,

    #[error("no access: {0}")]
    NoAccess(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A member of the key-server committee.
#[async_trait]
pub trait KeyServer: Send + Sync {
    fn id(&self) -> KeyServerId;

    async fn fetch_keys(
        &self,
        request: &FetchKeyRequest,
    ) -> std::result::Result<FetchKeyResponse, KeyServerError>;
}

/// A per-identifier key released by one server.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityKey(pub(crate) [u8; 32]);

impl IdentityKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn open_share(&self, share: &[u8]) -> Result<DataKey> {
        let bytes = EncryptionKey::from_bytes(self.0).open(share)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            SealError::DecryptionError(format!("share holds {} bytes, expected 32", b.len()))
        })?;
        Ok(DataKey::from_bytes(arr))
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityKey(<redacted>)")
    }
}

/// Keys released by at least `threshold` servers.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    threshold: Threshold,
    keys: BTreeMap<Identifier, BTreeMap<KeyServerId, IdentityKey>>,
    servers: BTreeSet<KeyServerId>,
}

impl KeyMaterial {
    fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            keys: BTreeMap::new(),
            servers: BTreeSet::new(),
        }
    }

    fn insert(&mut self, server: KeyServerId, keys: Vec<(Identifier, IdentityKey)>) {
        self.servers.insert(server);
        for (identifier, key) in keys {
            self.keys.entry(identifier).or_default().insert(server, key);
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Servers that released keys for every requested identifier.
    pub fn servers(&self) -> impl Iterator<Item = &KeyServerId> {
        self.servers.iter()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Whether keys for `identifier` are held.
    pub fn covers(&self, identifier: &Identifier) -> bool {
        self.keys.contains_key(identifier)
    }

    /// Decrypt an envelope.
    ///
    /// At least the envelope's threshold of shares must open, and all opened
    /// shares must agree on the data key.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let required = envelope.threshold().as_usize();
        let Some(keys) = self.keys.get(envelope.identifier()) else {
            return Err(SealError::InsufficientShares {
                required,
                received: 0,
            });
        };

        let mut data_key: Option<DataKey> = None;
        let mut usable = 0;
        for (server, identity_key) in keys {
            let Some(share) = envelope.share_for(server) else {
                continue;
            };
            match identity_key.open_share(&share.share) {
                Ok(key) => {
                    if let Some(existing) = &data_key {
                        if existing != &key {
                            return Err(SealError::ProtocolViolation(
                                "key shares disagree on the data key".into(),
                            ));
                        }
                    } else {
                        data_key = Some(key);
                    }
                    usable += 1;
                }
                Err(e) => tracing::warn!(%server, error = %e, "share did not open"),
            }
        }

        match data_key {
            Some(key) if usable >= required => key.open(&envelope.ciphertext),
            _ => Err(SealError::InsufficientShares {
                required,
                received: usable,
            }),
        }
    }
}

/// Client for the key-server committee.
#[derive(Clone)]
pub struct KeyClient {
    servers: Vec<Arc<dyn KeyServer>>,
    clock: Arc<dyn Clock>,
}

impl KeyClient {
    pub fn new(servers: Vec<Arc<dyn KeyServer>>, clock: Arc<dyn Clock>) -> Self {
        Self { servers, clock }
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Request the keys for `ids`, proven by `tx` and signed by `session`.
    ///
    /// # Errors
    ///
    /// - `PolicyMismatch` if `tx` does not check every requested identifier,
    ///   checked before the session
    /// - `SessionExpired` if the session is not active, or a server says so
    /// - `ThresholdUnsatisfiable` if fewer servers are configured than needed
    /// - `AccessDenied` if a server's policy simulation denied the request
    /// - `InsufficientShares` if fewer than `threshold` servers answered fully
    pub async fn request_keys(
        &self,
        ids: &[Identifier],
        tx: &ApprovalTransaction,
        session: &SessionKey,
        threshold: Threshold,
    ) -> Result<KeyMaterial> {
        if ids.is_empty() {
            return Err(SealError::PolicyMismatch("no identifiers requested".into()));
        }
        if let Some(missing) = ids.iter().find(|id| !tx.covers(id)) {
            return Err(SealError::PolicyMismatch(format!(
                "identifier {missing} is not checked by {}",
                tx.target()
            )));
        }
        if &tx.package != session.package() {
            return Err(SealError::PolicyMismatch(format!(
                "session is scoped to {}, transaction targets {}",
                session.package(),
                tx.package
            )));
        }
        // Coverage is checked first: an uncovered id is a mismatch whatever
        // the session state.
        session.ensure_active(self.clock.as_ref())?;
        if threshold.as_usize() > self.servers.len() {
            return Err(SealError::ThresholdUnsatisfiable {
                threshold: threshold.get(),
                available: self.servers.len(),
            });
        }

        let tx_bytes = tx.to_bytes()?;
        let enc_secret = X25519StaticSecret::generate();
        let enc_key = enc_secret.public_key();
        let request = FetchKeyRequest {
            request_signature: session.sign_request(&tx_bytes, &enc_key),
            tx_bytes,
            enc_key,
            certificate: session.certificate().clone(),
        };

        let results = join_all(self.servers.iter().map(|server| {
            let request = &request;
            async move { (server.id(), server.fetch_keys(request).await) }
        }))
        .await;

        let mut material = KeyMaterial::new(threshold);
        let mut expired = false;
        let mut denied: Option<String> = None;

        for (server, result) in results {
            match result {
                Ok(response) => match unwrap_response(&server, &response, ids, &enc_secret) {
                    Ok(keys) => material.insert(server, keys),
                    Err(e) => tracing::warn!(%server, error = %e, "incomplete key response"),
                },
                Err(KeyServerError::ExpiredSession) => {
                    tracing::warn!(%server, "key server reports expired session");
                    expired = true;
                }
                Err(KeyServerError::NoAccess(reason)) => {
                    tracing::warn!(%server, %reason, "key server denied access");
                    denied.get_or_insert(reason);
                }
                Err(e) => tracing::warn!(%server, error = %e, "key server failed"),
            }
        }

        let received = material.server_count();
        if received >= threshold.as_usize() {
            tracing::debug!(received, %threshold, "key threshold reached");
            return Ok(material);
        }
        if expired {
            return Err(SealError::SessionExpired);
        }
        if let Some(reason) = denied {
            return Err(SealError::AccessDenied(reason));
        }
        Err(SealError::InsufficientShares {
            required: threshold.as_usize(),
            received,
        })
    }
}

/// Open the wrapped keys for every id, or fail if any is missing.
fn unwrap_response(
    server: &KeyServerId,
    response: &FetchKeyResponse,
    ids: &[Identifier],
    enc_secret: &X25519StaticSecret,
) -> Result<Vec<(Identifier, IdentityKey)>> {
    ids.iter()
        .map(|id| {
            let entry = response
                .keys
                .iter()
                .find(|k| &k.identifier == id)
                .ok_or_else(|| {
                    SealError::ProtocolViolation(format!("no key for identifier {id}"))
                })?;
            let key = entry.wrapped.open(enc_secret, &wrap_context(server, id))?;
            Ok((id.clone(), IdentityKey(key)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Ed25519Signer, ManualClock, PersonalSigner};
    use sealbridge_core::{Nonce, PackageId, PolicyRef};

    /// A server that always fails the same way.
    struct Failing {
        id: KeyServerId,
        error: KeyServerError,
    }

    #[async_trait]
    impl KeyServer for Failing {
        fn id(&self) -> KeyServerId {
            self.id
        }

        async fn fetch_keys(
            &self,
            _request: &FetchKeyRequest,
        ) -> std::result::Result<FetchKeyResponse, KeyServerError> {
            Err(self.error.clone())
        }
    }

    fn failing(byte: u8, error: KeyServerError) -> Arc<dyn KeyServer> {
        Arc::new(Failing {
            id: KeyServerId::from_bytes([byte; 32]),
            error,
        })
    }

    async fn request(servers: Vec<Arc<dyn KeyServer>>, threshold: u8) -> Result<KeyMaterial> {
        let clock = Arc::new(ManualClock::new(1_000));
        let signer = Ed25519Signer::from_seed(&[1; 32]);
        let session =
            SessionKey::mint(signer.address(), PackageId::ZERO, 10, &signer, clock.as_ref())?;
        let id = Identifier::for_policy(&PolicyRef::ZERO);
        let tx = ApprovalTransaction::build(PackageId::ZERO, id.clone(), PolicyRef::ZERO);
        KeyClient::new(servers, clock)
            .request_keys(&[id], &tx, &session, Threshold::new(threshold)?)
            .await
    }

    #[tokio::test]
    async fn test_expired_outranks_denied() {
        let err = request(
            vec![
                failing(1, KeyServerError::NoAccess("no".into())),
                failing(2, KeyServerError::ExpiredSession),
            ],
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SealError::SessionExpired));
    }

    #[tokio::test]
    async fn test_denied_outranks_unavailable() {
        let err = request(
            vec![
                failing(1, KeyServerError::Unavailable("down".into())),
                failing(2, KeyServerError::NoAccess("not listed".into())),
            ],
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SealError::AccessDenied(reason) if reason == "not listed"));
    }

    #[tokio::test]
    async fn test_all_unavailable_is_insufficient() {
        let err = request(
            vec![
                failing(1, KeyServerError::Unavailable("down".into())),
                failing(2, KeyServerError::InvalidRequest("bad".into())),
            ],
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SealError::InsufficientShares {
                required: 2,
                received: 0
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_threshold_above_server_count() {
        let err = request(
            vec![failing(1, KeyServerError::Unavailable("down".into()))],
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SealError::ThresholdUnsatisfiable { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_session_for_other_package_is_mismatch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let signer = Ed25519Signer::from_seed(&[1; 32]);
        let session = SessionKey::mint(
            signer.address(),
            PackageId::from_bytes([5; 32]),
            10,
            &signer,
            clock.as_ref(),
        )
        .unwrap();
        let id = Identifier::for_policy(&PolicyRef::ZERO);
        let tx = ApprovalTransaction::build(PackageId::ZERO, id.clone(), PolicyRef::ZERO);

        let err = KeyClient::new(vec![], clock)
            .request_keys(&[id], &tx, &session, Threshold::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::PolicyMismatch(_)));
    }

    #[tokio::test]
    async fn test_uncovered_id_with_expired_session_is_mismatch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let signer = Ed25519Signer::from_seed(&[1; 32]);
        let session =
            SessionKey::mint(signer.address(), PackageId::ZERO, 10, &signer, clock.as_ref())
                .unwrap();
        let checked =
            Identifier::for_policy_with_nonce(&PolicyRef::ZERO, &Nonce::from_bytes([6; 5]));
        let requested =
            Identifier::for_policy_with_nonce(&PolicyRef::ZERO, &Nonce::from_bytes([5; 5]));
        let tx = ApprovalTransaction::build(PackageId::ZERO, checked, PolicyRef::ZERO);
        clock.advance(std::time::Duration::from_secs(11 * 60));

        let servers = vec![
            failing(1, KeyServerError::ExpiredSession),
            failing(2, KeyServerError::ExpiredSession),
        ];
        let err = KeyClient::new(servers, clock)
            .request_keys(&[requested], &tx, &session, Threshold::new(2).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::PolicyMismatch(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_covered_id_with_expired_session_is_expired() {
        let clock = Arc::new(ManualClock::new(1_000));
        let signer = Ed25519Signer::from_seed(&[1; 32]);
        let session =
            SessionKey::mint(signer.address(), PackageId::ZERO, 10, &signer, clock.as_ref())
                .unwrap();
        let id = Identifier::for_policy(&PolicyRef::ZERO);
        let tx = ApprovalTransaction::build(PackageId::ZERO, id.clone(), PolicyRef::ZERO);
        clock.advance(std::time::Duration::from_secs(11 * 60));

        let err = KeyClient::new(vec![], clock)
            .request_keys(&[id], &tx, &session, Threshold::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::SessionExpired));
    }
}
