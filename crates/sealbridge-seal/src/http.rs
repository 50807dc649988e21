//! HTTP adapters for remote key servers and encryption services.
//!
//! Binary fields travel as base64, identifiers and object ids as hex.
//! Errors come back as `{"error": "<code>", "message": "..."}`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use sealbridge_core::{Identifier, KeyServerId, PackageId, Threshold};

use crate::crypto::{DataKey, Ed25519Signature, X25519PublicKey};
use crate::encrypt::{EncryptRequest, EncryptedObject, SealService};
use crate::error::{Result, SealError};
use crate::keys::{FetchKeyRequest, FetchKeyResponse, IdentityKeyResponse, KeyServer, KeyServerError};
use crate::keyshare::WrappedKey;
use crate::session::Certificate;

/// Path of the key-release endpoint, relative to a key server's base URL.
pub const FETCH_KEY_PATH: &str = "v1/fetch_key";

/// Path of the encryption endpoint, relative to the service's base URL.
pub const ENCRYPT_PATH: &str = "v1/encrypt";

fn endpoint(base: &Url, path: &str) -> std::result::Result<Url, url::ParseError> {
    Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), path))
}

fn decode_b64(field: &str, value: &str) -> std::result::Result<Vec<u8>, String> {
    BASE64
        .decode(value)
        .map_err(|e| format!("{field}: invalid base64: {e}"))
}

/// Error body shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: Some(message.into()),
        }
    }

    fn detail(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {message}", self.error),
            None => self.error.clone(),
        }
    }
}

/// Wire form of [`FetchKeyRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchKeyBody {
    /// Base64 CBOR approval transaction.
    pub ptb: String,
    /// Base64 X25519 public key.
    pub enc_key: String,
    pub certificate: Certificate,
    pub request_signature: Ed25519Signature,
}

impl FetchKeyBody {
    pub fn from_request(request: &FetchKeyRequest) -> Self {
        Self {
            ptb: BASE64.encode(&request.tx_bytes),
            enc_key: BASE64.encode(request.enc_key.as_bytes()),
            certificate: request.certificate.clone(),
            request_signature: request.request_signature,
        }
    }

    pub fn into_request(self) -> std::result::Result<FetchKeyRequest, String> {
        let enc_key: [u8; 32] = decode_b64("enc_key", &self.enc_key)?
            .try_into()
            .map_err(|_| "enc_key: expected 32 bytes".to_string())?;
        Ok(FetchKeyRequest {
            tx_bytes: decode_b64("ptb", &self.ptb)?,
            enc_key: X25519PublicKey::from_bytes(enc_key),
            certificate: self.certificate,
            request_signature: self.request_signature,
        })
    }
}

/// One entry of a fetch-key reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Hex identifier.
    pub id: String,
    /// Base64 CBOR [`WrappedKey`].
    pub key: String,
}

/// Wire form of [`FetchKeyResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchKeyReply {
    pub keys: Vec<KeyEntry>,
}

impl FetchKeyReply {
    pub fn from_response(response: &FetchKeyResponse) -> Result<Self> {
        let keys = response
            .keys
            .iter()
            .map(|k| {
                Ok(KeyEntry {
                    id: k.identifier.to_hex(),
                    key: BASE64.encode(k.wrapped.to_bytes()?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn into_response(self) -> std::result::Result<FetchKeyResponse, String> {
        let keys = self
            .keys
            .into_iter()
            .map(|entry| {
                let identifier = Identifier::from_hex(&entry.id).map_err(|e| e.to_string())?;
                let wrapped = WrappedKey::from_bytes(&decode_b64("key", &entry.key)?)
                    .map_err(|e| e.to_string())?;
                Ok(IdentityKeyResponse {
                    identifier,
                    wrapped,
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;
        Ok(FetchKeyResponse { keys })
    }
}

/// Map a key server's error code onto [`KeyServerError`].
pub fn key_server_error(status: StatusCode, body: &str) -> KeyServerError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let detail = parsed
        .as_ref()
        .map(ErrorBody::detail)
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    match parsed.as_ref().map(|b| b.error.as_str()) {
        Some("ExpiredSessionKey") => KeyServerError::ExpiredSession,
        Some("NoAccess") => KeyServerError::NoAccess(detail),
        Some("InvalidPTB") | Some("InvalidCertificate") | Some("InvalidSignature") => {
            KeyServerError::InvalidRequest(detail)
        }
        _ if status.is_server_error() => KeyServerError::Unavailable(detail),
        _ => KeyServerError::InvalidRequest(detail),
    }
}

/// A key server reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpKeyServer {
    id: KeyServerId,
    url: Url,
    client: Client,
}

impl HttpKeyServer {
    pub fn new(id: KeyServerId, url: Url) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SealError::ProtocolViolation(format!("http client: {e}")))?;
        Ok(Self { id, url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KeyServer for HttpKeyServer {
    fn id(&self) -> KeyServerId {
        self.id
    }

    async fn fetch_keys(
        &self,
        request: &FetchKeyRequest,
    ) -> std::result::Result<FetchKeyResponse, KeyServerError> {
        let url = endpoint(&self.url, FETCH_KEY_PATH)
            .map_err(|e| KeyServerError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&FetchKeyBody::from_request(request))
            .send()
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(key_server_error(status, &body));
        }

        let reply: FetchKeyReply = response
            .json()
            .await
            .map_err(|e| KeyServerError::Unavailable(format!("unreadable reply: {e}")))?;
        reply.into_response().map_err(KeyServerError::Unavailable)
    }
}

/// Wire form of [`EncryptRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptBody {
    pub threshold: u8,
    /// Hex package id.
    pub package_id: String,
    /// Hex identifier.
    pub id: String,
    /// Hex key-server object ids.
    pub key_servers: Vec<String>,
    /// Base64 plaintext.
    pub data: String,
}

impl EncryptBody {
    pub fn from_request(request: &EncryptRequest) -> Self {
        Self {
            threshold: request.threshold.get(),
            package_id: request.package.to_string(),
            id: request.identifier.to_hex(),
            key_servers: request.key_servers.iter().map(|s| s.to_string()).collect(),
            data: BASE64.encode(&request.data),
        }
    }

    pub fn into_request(self) -> std::result::Result<EncryptRequest, String> {
        let key_servers = self
            .key_servers
            .iter()
            .map(|s| KeyServerId::from_hex(s).map_err(|e| e.to_string()))
            .collect::<std::result::Result<Vec<_>, String>>()?;
        Ok(EncryptRequest {
            threshold: Threshold::new(self.threshold).map_err(|e| e.to_string())?,
            package: PackageId::from_hex(&self.package_id).map_err(|e| e.to_string())?,
            identifier: Identifier::from_hex(&self.id).map_err(|e| e.to_string())?,
            key_servers,
            data: Bytes::from(decode_b64("data", &self.data)?),
        })
    }
}

/// Reply to an encryption request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptReply {
    /// Base64 envelope.
    pub encrypted_object: String,
    /// Hex backup key, if the service releases it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_key: Option<String>,
}

/// An encryption service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSealService {
    url: Url,
    client: Client,
}

impl HttpSealService {
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SealError::EncryptionServiceUnavailable(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl SealService for HttpSealService {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptedObject> {
        let url = endpoint(&self.url, ENCRYPT_PATH)
            .map_err(|e| SealError::EncryptionServiceUnavailable(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&EncryptBody::from_request(&request))
            .send()
            .await
            .map_err(|e| SealError::EncryptionServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
            if parsed.as_ref().is_some_and(|b| b.error == "ThresholdUnsatisfiable") {
                return Err(SealError::ThresholdUnsatisfiable {
                    threshold: request.threshold.get(),
                    available: request.key_servers.len(),
                });
            }
            let detail = format!("HTTP {status}: {body}");
            return Err(if status.is_server_error() {
                SealError::EncryptionServiceUnavailable(detail)
            } else {
                SealError::ProtocolViolation(detail)
            });
        }

        let reply: EncryptReply = response
            .json()
            .await
            .map_err(|e| SealError::ProtocolViolation(format!("unreadable reply: {e}")))?;
        let envelope_bytes = BASE64
            .decode(&reply.encrypted_object)
            .map_err(|e| SealError::ProtocolViolation(format!("encrypted_object: {e}")))?;
        let backup_key = reply
            .backup_key
            .as_deref()
            .map(DataKey::from_hex)
            .transpose()?;

        Ok(EncryptedObject {
            envelope_bytes: Bytes::from(envelope_bytes),
            backup_key,
        })
    }
}
