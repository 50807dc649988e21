//! Native Walrus client over the publisher and aggregator HTTP APIs.
//!
//! - `PUT {publisher}/v1/blobs?epochs=N` with the raw blob as body
//! - `GET {aggregator}/v1/blobs/{blob_id}`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{Result, StoreError};
use crate::traits::{BlobStore, ContentId, StoreOptions};

/// Publisher response to a store request.
///
/// Exactly one of the two fields is present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

impl PublishResponse {
    fn into_blob_id(self) -> Result<ContentId> {
        let id = match (self.newly_created, self.already_certified) {
            (Some(created), None) => created.blob_object.blob_id,
            (None, Some(certified)) => certified.blob_id,
            (None, None) => {
                return Err(StoreError::InvalidResponse(
                    "publisher response has neither newlyCreated nor alreadyCertified".into(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidResponse(
                    "publisher response has both newlyCreated and alreadyCertified".into(),
                ))
            }
        };
        ContentId::new(id).map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

/// Blob store backed by a Walrus publisher (writes) and aggregator (reads).
#[derive(Debug, Clone)]
pub struct WalrusHttpStore {
    client: Client,
    publisher: Url,
    aggregator: Url,
    options: StoreOptions,
}

impl WalrusHttpStore {
    pub fn new(publisher: Url, aggregator: Url, options: StoreOptions) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            publisher,
            aggregator,
            options,
        })
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| StoreError::Unavailable(format!("{joined}: {e}")))
    }
}

#[async_trait]
impl BlobStore for WalrusHttpStore {
    async fn store(&self, data: Bytes) -> Result<ContentId> {
        let url = Self::endpoint(&self.publisher, "v1/blobs")?;
        tracing::debug!(%url, size = data.len(), epochs = self.options.epochs, "publishing blob");

        let response = self
            .client
            .put(url)
            .query(&[("epochs", self.options.epochs)])
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "publisher returned HTTP {status}: {body}"
            )));
        }

        let text = response.text().await?;
        let parsed: PublishResponse = serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidResponse(format!("{e}: {text}")))?;
        parsed.into_blob_id()
    }

    async fn read(&self, id: &ContentId) -> Result<Bytes> {
        let url = Self::endpoint(&self.aggregator, &format!("v1/blobs/{id}"))?;
        tracing::debug!(%url, "reading blob");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "aggregator returned HTTP {status}: {body}"
            )));
        }

        Ok(response.bytes().await?)
    }
}
