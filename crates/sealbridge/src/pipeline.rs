//! The pipeline driver.
//!
//! Sequences the two workflows:
//!
//! - **encrypt-and-publish**: build identifier, encrypt, store
//! - **fetch-and-authorize**: read envelope, build approval transaction,
//!   request keys, decrypt
//!
//! The driver is the only place retries happen, and only for transient
//! failures. It holds no protocol state between runs; concurrent runs share
//! nothing but the injected components.

use std::sync::Arc;

use bytes::Bytes;

use sealbridge_core::{
    Envelope, EnvelopeHeader, Identifier, IdentifierBuilder, OsRandom, RandomSource,
};
use sealbridge_seal::{
    ApprovalTransaction, Clock, DataKey, Encrypted, EncryptionGateway, HttpKeyServer,
    HttpSealService, KeyClient, KeyMaterial, KeyServer, PersonalSigner, SealError, SealService,
    SessionKey, SystemClock,
};
use sealbridge_store::{BlobStore, ContentId, StoreError, WalrusCliStore, WalrusHttpStore};

use crate::config::{PipelineConfig, StorageConfig, ENV_SERVICE_URL};
use crate::enclave::EnclaveClient;
use crate::error::{ConfigError, Result};
use crate::job::JobRunner;

/// Outcome of a successful encrypt-and-publish run.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub identifier: Identifier,
    pub content_id: ContentId,
    pub header: EnvelopeHeader,
    /// The stored envelope bytes.
    pub envelope: Bytes,
    /// Disaster-recovery key, when the encryption service released one.
    pub backup_key: Option<DataKey>,
}

/// The external capabilities a pipeline drives.
pub struct Components {
    /// Encryption capability; encrypt-and-publish is unavailable without it.
    pub seal_service: Option<Arc<dyn SealService>>,
    /// Key servers reachable for key requests.
    pub key_servers: Vec<Arc<dyn KeyServer>>,
    pub store: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

/// The blob store `storage` describes: the native HTTP client when both
/// endpoints are set, the `walrus` binary otherwise.
pub fn connect_store(
    storage: &StorageConfig,
) -> std::result::Result<Arc<dyn BlobStore>, StoreError> {
    let store: Arc<dyn BlobStore> = match storage.http_endpoints() {
        Some((publisher, aggregator)) => Arc::new(WalrusHttpStore::new(
            publisher.clone(),
            aggregator.clone(),
            storage.options(),
        )?),
        None => Arc::new(WalrusCliStore::new(storage.options())),
    };
    Ok(store)
}

/// Drives encryption, storage and key retrieval for one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    identifiers: IdentifierBuilder,
    gateway: Option<EncryptionGateway>,
    store: Arc<dyn BlobStore>,
    keys: KeyClient,
    clock: Arc<dyn Clock>,
    jobs: JobRunner,
}

impl Pipeline {
    /// Build a pipeline from explicit components. The configuration is
    /// validated here, once.
    pub fn new(config: PipelineConfig, components: Components) -> Result<Self> {
        config.validate()?;

        let gateway = components
            .seal_service
            .map(|service| EncryptionGateway::new(service, config.key_server_ids()));
        let keys = KeyClient::new(components.key_servers, components.clock.clone());
        let jobs = JobRunner::new(
            components.store.clone(),
            EnclaveClient::new(&config.enclave_url)?,
            config.retry,
        );

        Ok(Self {
            identifiers: IdentifierBuilder::new(components.random),
            gateway,
            store: components.store,
            keys,
            clock: components.clock,
            jobs,
            config,
        })
    }

    /// Build a pipeline talking to the remote services named in `config`.
    ///
    /// Key servers without a URL can still be encrypted to but are not
    /// asked for keys.
    pub fn connect(config: PipelineConfig) -> Result<Self> {
        let seal_service = config
            .seal_service_url
            .as_ref()
            .map(|url| HttpSealService::new(url.clone()))
            .transpose()?
            .map(|service| Arc::new(service) as Arc<dyn SealService>);

        let key_servers = config
            .key_servers
            .iter()
            .filter_map(|entry| entry.url.clone().map(|url| (entry.id, url)))
            .map(|(id, url)| {
                HttpKeyServer::new(id, url).map(|server| Arc::new(server) as Arc<dyn KeyServer>)
            })
            .collect::<std::result::Result<Vec<_>, SealError>>()?;

        let store = connect_store(&config.storage)?;

        Self::new(
            config,
            Components {
                seal_service,
                key_servers,
                store,
                clock: Arc::new(SystemClock),
                random: Arc::new(OsRandom),
            },
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encrypt and publish
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a fresh identifier for the configured policy object.
    pub fn new_identifier(&self, include_nonce: bool) -> Identifier {
        self.identifiers
            .build_for(&self.config.policy_object, include_nonce)
    }

    /// Encrypt `plaintext` under a fresh identifier, retrying transient
    /// service failures.
    pub async fn encrypt(&self, plaintext: Bytes, include_nonce: bool) -> Result<Encrypted> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(ConfigError::Missing(ENV_SERVICE_URL))?;
        let identifier = self.new_identifier(include_nonce);
        let namespace = self.config.namespace;
        let threshold = self.config.threshold;

        let encrypted = self
            .config
            .retry
            .run("encrypt", move || {
                let identifier = identifier.clone();
                let plaintext = plaintext.clone();
                async move {
                    Ok(gateway
                        .encrypt(namespace, identifier, threshold, plaintext)
                        .await?)
                }
            })
            .await?;

        tracing::info!(
            identifier = %encrypted.envelope.identifier(),
            %threshold,
            size = encrypted.envelope_bytes.len(),
            "encrypted"
        );
        Ok(encrypted)
    }

    /// Store envelope bytes, retrying transient store failures.
    pub async fn publish(&self, envelope: Bytes) -> Result<ContentId> {
        let size = envelope.len();
        let content_id = self
            .config
            .retry
            .run("store", move || {
                let envelope = envelope.clone();
                async move { Ok(self.store.store(envelope).await?) }
            })
            .await?;

        tracing::info!(content_id = %content_id, size, "stored envelope");
        Ok(content_id)
    }

    /// Encrypt and store `plaintext`. Nothing is stored if encryption fails.
    pub async fn encrypt_and_publish(&self, plaintext: Bytes) -> Result<PublishReceipt> {
        let encrypted = self.encrypt(plaintext, self.config.include_nonce).await?;
        let content_id = self.publish(encrypted.envelope_bytes.clone()).await?;

        Ok(PublishReceipt {
            identifier: encrypted.envelope.identifier().clone(),
            content_id,
            header: encrypted.envelope.header,
            envelope: encrypted.envelope_bytes,
            backup_key: encrypted.backup_key,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch and authorize
    // ─────────────────────────────────────────────────────────────────────────

    /// Read raw blob bytes.
    pub async fn read_blob(&self, content_id: &ContentId) -> Result<Bytes> {
        let bytes = self
            .config
            .retry
            .run("read", move || async move { Ok(self.store.read(content_id).await?) })
            .await?;
        tracing::info!(content_id = %content_id, size = bytes.len(), "read blob");
        Ok(bytes)
    }

    /// Read and parse an envelope.
    pub async fn fetch_envelope(&self, content_id: &ContentId) -> Result<Envelope> {
        let bytes = self.read_blob(content_id).await?;
        Ok(Envelope::parse(&bytes)?)
    }

    /// Mint a session for `signer` scoped to the configured namespace.
    pub fn mint_session(&self, signer: &dyn PersonalSigner) -> Result<SessionKey> {
        let session = SessionKey::mint(
            signer.address(),
            self.config.namespace,
            self.config.ttl_minutes,
            signer,
            self.clock.as_ref(),
        )?;
        tracing::info!(
            address = %session.address(),
            expires_at_ms = session.expires_at_ms(),
            "minted session"
        );
        Ok(session)
    }

    /// Build the approval transaction for `envelope` from its own identifier.
    pub fn approval_for(&self, envelope: &Envelope) -> Result<ApprovalTransaction> {
        if envelope.package() != &self.config.namespace {
            return Err(SealError::PolicyMismatch(format!(
                "envelope namespace {} differs from configured {}",
                envelope.package(),
                self.config.namespace
            ))
            .into());
        }
        let identifier = envelope.identifier();
        let policy = identifier.policy_prefix().ok_or_else(|| {
            SealError::PolicyMismatch(format!(
                "identifier {identifier} is not bound to a policy object"
            ))
        })?;

        Ok(
            ApprovalTransaction::build(self.config.namespace, identifier.clone(), policy)
                .with_entry_point(
                    &self.config.policy_module,
                    &self.config.approval_entry_point,
                ),
        )
    }

    /// Fetch the envelope for `content_id` and the keys that open it.
    pub async fn fetch_keys(
        &self,
        content_id: &ContentId,
        session: &SessionKey,
    ) -> Result<(Envelope, KeyMaterial)> {
        let envelope = self.fetch_envelope(content_id).await?;
        let ids = [envelope.identifier().clone()];
        let target = &envelope;
        let ids = &ids;

        // The approval transaction is rebuilt for every attempt.
        let material = self
            .config
            .retry
            .run("fetch_keys", move || async move {
                let tx = self.approval_for(target)?;
                Ok(self
                    .keys
                    .request_keys(ids, &tx, session, target.threshold())
                    .await?)
            })
            .await?;

        tracing::info!(
            content_id = %content_id,
            identifier = %envelope.identifier(),
            servers = material.server_count(),
            "keys released"
        );
        Ok((envelope, material))
    }

    /// Fetch, authorize and decrypt the blob at `content_id`.
    pub async fn fetch_and_decrypt(
        &self,
        content_id: &ContentId,
        session: &SessionKey,
    ) -> Result<Vec<u8>> {
        let (envelope, material) = self.fetch_keys(content_id, session).await?;
        let plaintext = material.decrypt(&envelope)?;
        tracing::info!(content_id = %content_id, size = plaintext.len(), "decrypted");
        Ok(plaintext)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Confidential compute
    // ─────────────────────────────────────────────────────────────────────────

    /// Forward the stored ciphertext at `content_id` to the configured
    /// enclave. See [`JobRunner::start`].
    pub async fn start_job(&self, content_id: &ContentId) -> Result<serde_json::Value> {
        self.jobs.start(content_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyServerEntry;
    use crate::error::PipelineError;
    use crate::retry::RetryPolicy;
    use sealbridge_core::{PackageId, SeededRandom, Threshold};
    use sealbridge_seal::{Ed25519Signer, LocalCommittee, ManualClock, MemoryLedger};
    use sealbridge_store::MemoryBlobStore;
    use std::time::Duration;

    struct Setup {
        pipeline: Pipeline,
        committee: LocalCommittee,
        store: Arc<MemoryBlobStore>,
        user: Ed25519Signer,
    }

    fn setup(servers: usize, threshold: u8) -> Setup {
        let package = PackageId::from_bytes([7; 32]);
        let user = Ed25519Signer::from_seed(&[1; 32]);
        let ledger = Arc::new(MemoryLedger::new());
        ledger.deploy(package);
        let policy = ledger
            .create_allowlist(package, vec![user.address()])
            .unwrap();

        let committee = LocalCommittee::new(servers, 9);
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryBlobStore::new());

        let entries = committee
            .ids()
            .into_iter()
            .map(|id| KeyServerEntry { id, url: None })
            .collect();
        let mut config =
            PipelineConfig::new(package, policy, entries, Threshold::new(threshold).unwrap());
        config.retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };

        let pipeline = Pipeline::new(
            config,
            Components {
                seal_service: Some(Arc::new(committee.service())),
                key_servers: committee.key_servers(ledger, clock.clone()),
                store: store.clone(),
                clock,
                random: Arc::new(SeededRandom::new(3)),
            },
        )
        .unwrap();

        Setup {
            pipeline,
            committee,
            store,
            user,
        }
    }

    #[tokio::test]
    async fn test_publish_then_decrypt() {
        let s = setup(3, 2);
        let receipt = s
            .pipeline
            .encrypt_and_publish(Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(receipt.header.threshold.get(), 2);
        assert_eq!(receipt.identifier.len(), 37);
        assert!(receipt.backup_key.is_some());

        let session = s.pipeline.mint_session(&s.user).unwrap();
        let plaintext = s
            .pipeline
            .fetch_and_decrypt(&receipt.content_id, &session)
            .await
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[tokio::test]
    async fn test_encryption_failure_stores_nothing() {
        let s = setup(2, 2);
        s.committee.set_service_online(false);

        let err = s
            .pipeline
            .encrypt_and_publish(Bytes::from_static(b"payload"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(s.committee.encrypt_calls(), 2);
        assert_eq!(s.store.store_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_is_reported() {
        let s = setup(2, 1);
        s.store.set_available(false);

        let err = s
            .pipeline
            .encrypt_and_publish(Bytes::from_static(b"payload"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Unavailable(_))));
        assert_eq!(s.store.store_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_service_is_config_error() {
        let s = setup(1, 1);
        let pipeline = Pipeline {
            gateway: None,
            ..s.pipeline
        };
        let err = pipeline
            .encrypt(Bytes::from_static(b"x"), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::Missing(ENV_SERVICE_URL))
        ));
    }

    #[tokio::test]
    async fn test_foreign_namespace_is_policy_mismatch() {
        let s = setup(2, 1);
        let receipt = s
            .pipeline
            .encrypt_and_publish(Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let mut envelope = Envelope::parse(&receipt.envelope).unwrap();
        envelope.header.package = PackageId::from_bytes([8; 32]);
        let err = s.pipeline.approval_for(&envelope).unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_approval_uses_envelope_identifier() {
        let s = setup(2, 1);
        let receipt = s
            .pipeline
            .encrypt_and_publish(Bytes::from_static(b"payload"))
            .await
            .unwrap();
        let envelope = s.pipeline.fetch_envelope(&receipt.content_id).await.unwrap();
        let tx = s.pipeline.approval_for(&envelope).unwrap();

        assert!(tx.covers(&receipt.identifier));
        assert_eq!(tx.calls[0].policy_object, s.pipeline.config().policy_object);
    }

    #[tokio::test]
    async fn test_unknown_blob_is_not_retried() {
        let s = setup(1, 1);
        let id = ContentId::new("missing").unwrap();
        let err = s.pipeline.fetch_envelope(&id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_malformed() {
        let s = setup(1, 1);
        let id = s
            .pipeline
            .publish(Bytes::from_static(b"not an envelope"))
            .await
            .unwrap();
        let err = s.pipeline.fetch_envelope(&id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Core(_)));
    }
}
