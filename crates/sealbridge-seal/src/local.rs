//! In-process reference committee.
//!
//! A stand-in for the key-management network with the same observable
//! protocol: encryption produces one share per key server, and each server
//! releases its identity key for an identifier only after verifying the
//! session certificate, the request signature and a passing policy
//! simulation.
//!
//! This is not threshold secret sharing. Every share wraps the same data key
//! under that server's identity key, so any single released key decrypts.
//! The client still insists on `threshold` distinct servers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sealbridge_core::{EncryptedShare, Envelope, Identifier, KeyServerId, PackageId};

use crate::approval::ApprovalTransaction;
use crate::crypto::{DataKey, EncryptionKey};
use crate::encrypt::{EncryptRequest, EncryptedObject, SealService};
use crate::error::{Result, SealError};
use crate::keys::{FetchKeyRequest, FetchKeyResponse, IdentityKeyResponse, KeyServer, KeyServerError};
use crate::keyshare::{wrap_context, WrappedKey};
use crate::policy::{PolicyLedger, Simulation};
use crate::session::Clock;

struct Member {
    id: KeyServerId,
    master: [u8; 32],
    reachable: AtomicBool,
}

impl Member {
    fn identity_key(&self, package: &PackageId, identifier: &Identifier) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("sealbridge identity key v1");
        hasher.update(&self.master);
        hasher.update(package.as_bytes());
        hasher.update(identifier.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

struct CommitteeInner {
    members: Vec<Member>,
    service_online: AtomicBool,
    encrypt_calls: AtomicUsize,
}

/// A deterministic committee of `n` key servers plus an encryption service.
#[derive(Clone)]
pub struct LocalCommittee {
    inner: Arc<CommitteeInner>,
}

impl LocalCommittee {
    /// Create `n` servers whose keys derive from `seed`.
    pub fn new(n: usize, seed: u64) -> Self {
        let members = (0..n)
            .map(|i| {
                let mut input = [0u8; 16];
                input[..8].copy_from_slice(&seed.to_le_bytes());
                input[8..].copy_from_slice(&(i as u64).to_le_bytes());
                let master = blake3::derive_key("sealbridge committee master v1", &input);
                let id = blake3::derive_key("sealbridge key server id v1", &master);
                Member {
                    id: KeyServerId::from_bytes(id),
                    master,
                    reachable: AtomicBool::new(true),
                }
            })
            .collect();

        Self {
            inner: Arc::new(CommitteeInner {
                members,
                service_online: AtomicBool::new(true),
                encrypt_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Key-server ids in committee order.
    pub fn ids(&self) -> Vec<KeyServerId> {
        self.inner.members.iter().map(|m| m.id).collect()
    }

    /// The encryption capability backed by this committee.
    pub fn service(&self) -> LocalSealService {
        LocalSealService {
            committee: self.clone(),
        }
    }

    /// One key server per member, checking policy against `ledger`.
    pub fn key_servers(
        &self,
        ledger: Arc<dyn PolicyLedger>,
        clock: Arc<dyn Clock>,
    ) -> Vec<Arc<dyn KeyServer>> {
        (0..self.inner.members.len())
            .map(|index| {
                Arc::new(LocalKeyServer {
                    committee: self.clone(),
                    index,
                    ledger: ledger.clone(),
                    clock: clock.clone(),
                }) as Arc<dyn KeyServer>
            })
            .collect()
    }

    /// Take server `index` offline or bring it back. Out-of-range is ignored.
    pub fn set_reachable(&self, index: usize, reachable: bool) {
        if let Some(member) = self.inner.members.get(index) {
            member.reachable.store(reachable, Ordering::SeqCst);
        }
    }

    /// Take the encryption service offline or bring it back.
    pub fn set_service_online(&self, online: bool) {
        self.inner.service_online.store(online, Ordering::SeqCst);
    }

    /// Number of encryption requests received.
    pub fn encrypt_calls(&self) -> usize {
        self.inner.encrypt_calls.load(Ordering::SeqCst)
    }

    fn member(&self, id: &KeyServerId) -> Option<&Member> {
        self.inner.members.iter().find(|m| &m.id == id)
    }
}

/// [`SealService`] implementation for a [`LocalCommittee`].
#[derive(Clone)]
pub struct LocalSealService {
    committee: LocalCommittee,
}

#[async_trait]
impl SealService for LocalSealService {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptedObject> {
        let inner = &self.committee.inner;
        inner.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if !inner.service_online.load(Ordering::SeqCst) {
            return Err(SealError::EncryptionServiceUnavailable(
                "local encryption service is offline".into(),
            ));
        }

        let members: Vec<&Member> = request
            .key_servers
            .iter()
            .filter_map(|id| self.committee.member(id))
            .filter(|m| m.reachable.load(Ordering::SeqCst))
            .collect();
        if members.len() < request.threshold.as_usize() {
            return Err(SealError::ThresholdUnsatisfiable {
                threshold: request.threshold.get(),
                available: members.len(),
            });
        }

        let data_key = DataKey::generate();
        let ciphertext = data_key.seal(&request.data)?;
        let shares = members
            .iter()
            .map(|member| {
                let identity_key = member.identity_key(&request.package, &request.identifier);
                Ok(EncryptedShare {
                    server: member.id,
                    share: EncryptionKey::from_bytes(identity_key).seal(data_key.as_bytes())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let envelope = Envelope::new(
            request.package,
            request.identifier,
            request.threshold,
            shares,
            ciphertext,
        )?;

        Ok(EncryptedObject {
            envelope_bytes: envelope.to_bytes(),
            backup_key: Some(data_key),
        })
    }
}

/// One member of a [`LocalCommittee`] acting as a key server.
pub struct LocalKeyServer {
    committee: LocalCommittee,
    index: usize,
    ledger: Arc<dyn PolicyLedger>,
    clock: Arc<dyn Clock>,
}

impl LocalKeyServer {
    fn member(&self) -> &Member {
        &self.committee.inner.members[self.index]
    }
}

#[async_trait]
impl KeyServer for LocalKeyServer {
    fn id(&self) -> KeyServerId {
        self.member().id
    }

    async fn fetch_keys(
        &self,
        request: &FetchKeyRequest,
    ) -> std::result::Result<FetchKeyResponse, KeyServerError> {
        let member = self.member();
        if !member.reachable.load(Ordering::SeqCst) {
            return Err(KeyServerError::Unavailable(format!(
                "key server {} is offline",
                member.id
            )));
        }

        let certificate = &request.certificate;
        certificate
            .verify()
            .map_err(|e| KeyServerError::InvalidRequest(format!("certificate: {e}")))?;
        certificate
            .verify_request(&request.tx_bytes, &request.enc_key, &request.request_signature)
            .map_err(|e| KeyServerError::InvalidRequest(format!("request signature: {e}")))?;
        if certificate.is_expired_at(self.clock.now_millis()) {
            return Err(KeyServerError::ExpiredSession);
        }

        let tx = ApprovalTransaction::from_bytes(&request.tx_bytes)
            .map_err(|e| KeyServerError::InvalidRequest(e.to_string()))?;
        if !tx.transaction_kind_only {
            return Err(KeyServerError::InvalidRequest(
                "approval transaction must be a transaction kind".into(),
            ));
        }
        if tx.package != certificate.package {
            return Err(KeyServerError::InvalidRequest(format!(
                "session is scoped to {}, transaction targets {}",
                certificate.package, tx.package
            )));
        }

        match self.ledger.simulate(&tx, &certificate.user).await {
            Ok(Simulation::Approved) => {}
            Ok(Simulation::Denied(reason)) => return Err(KeyServerError::NoAccess(reason)),
            Err(e) => return Err(KeyServerError::Unavailable(format!("simulation: {e}"))),
        }

        let mut keys = Vec::with_capacity(tx.calls.len());
        for identifier in tx.checked_identifiers() {
            if keys
                .iter()
                .any(|k: &IdentityKeyResponse| &k.identifier == identifier)
            {
                continue;
            }
            let identity_key = member.identity_key(&tx.package, identifier);
            let wrapped = WrappedKey::create(
                &identity_key,
                &request.enc_key,
                &wrap_context(&member.id, identifier),
            )
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;
            keys.push(IdentityKeyResponse {
                identifier: identifier.clone(),
                wrapped,
            });
        }

        Ok(FetchKeyResponse { keys })
    }
}
