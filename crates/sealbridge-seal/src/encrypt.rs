//! Encryption gateway.
//!
//! Wraps the external threshold-encryption capability. The gateway never
//! retries; it checks the threshold up front and refuses to hand back an
//! envelope whose header disagrees with what was asked for.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use sealbridge_core::{Envelope, Identifier, KeyServerId, PackageId, Threshold};

use crate::crypto::DataKey;
use crate::error::{Result, SealError};

/// Input to the encryption capability.
#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub threshold: Threshold,
    pub package: PackageId,
    pub identifier: Identifier,
    pub key_servers: Vec<KeyServerId>,
    pub data: Bytes,
}

/// Output of the encryption capability.
#[derive(Debug, Clone)]
pub struct EncryptedObject {
    pub envelope_bytes: Bytes,
    /// Key that decrypts the payload without any key server, if released.
    pub backup_key: Option<DataKey>,
}

/// The threshold-encryption capability.
///
/// # Errors
///
/// - `EncryptionServiceUnavailable` on transport failure
/// - `ThresholdUnsatisfiable` when too few key servers are usable
#[async_trait]
pub trait SealService: Send + Sync {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptedObject>;
}

/// A validated encryption result.
#[derive(Debug, Clone)]
pub struct Encrypted {
    pub envelope: Envelope,
    pub envelope_bytes: Bytes,
    pub backup_key: Option<DataKey>,
}

/// Front door to a [`SealService`] for a fixed key-server set.
#[derive(Clone)]
pub struct EncryptionGateway {
    service: Arc<dyn SealService>,
    key_servers: Vec<KeyServerId>,
}

impl EncryptionGateway {
    pub fn new(service: Arc<dyn SealService>, key_servers: Vec<KeyServerId>) -> Self {
        Self {
            service,
            key_servers,
        }
    }

    pub fn key_servers(&self) -> &[KeyServerId] {
        &self.key_servers
    }

    /// Encrypt `plaintext` under `identifier` within `package`.
    pub async fn encrypt(
        &self,
        package: PackageId,
        identifier: Identifier,
        threshold: Threshold,
        plaintext: Bytes,
    ) -> Result<Encrypted> {
        if threshold.as_usize() > self.key_servers.len() {
            return Err(SealError::ThresholdUnsatisfiable {
                threshold: threshold.get(),
                available: self.key_servers.len(),
            });
        }

        tracing::debug!(
            identifier = %identifier,
            %threshold,
            servers = self.key_servers.len(),
            size = plaintext.len(),
            "encrypting"
        );

        let object = self
            .service
            .encrypt(EncryptRequest {
                threshold,
                package,
                identifier: identifier.clone(),
                key_servers: self.key_servers.clone(),
                data: plaintext,
            })
            .await?;

        let envelope = Envelope::parse(&object.envelope_bytes).map_err(|e| {
            SealError::ProtocolViolation(format!("service returned an unparseable envelope: {e}"))
        })?;
        self.check_header(&envelope, &package, &identifier, threshold)?;

        Ok(Encrypted {
            envelope,
            envelope_bytes: object.envelope_bytes,
            backup_key: object.backup_key,
        })
    }

    fn check_header(
        &self,
        envelope: &Envelope,
        package: &PackageId,
        identifier: &Identifier,
        threshold: Threshold,
    ) -> Result<()> {
        if envelope.package() != package {
            return Err(SealError::ProtocolViolation(format!(
                "envelope namespace {} differs from requested {package}",
                envelope.package()
            )));
        }
        if envelope.identifier() != identifier {
            return Err(SealError::ProtocolViolation(format!(
                "envelope identifier {} differs from requested {identifier}",
                envelope.identifier()
            )));
        }
        if envelope.threshold() != threshold {
            return Err(SealError::ProtocolViolation(format!(
                "envelope threshold {} differs from requested {threshold}",
                envelope.threshold()
            )));
        }
        if let Some(share) = envelope
            .shares
            .iter()
            .find(|s| !self.key_servers.contains(&s.server))
        {
            return Err(SealError::ProtocolViolation(format!(
                "envelope carries a share for unconfigured key server {}",
                share.server
            )));
        }
        Ok(())
    }
}
