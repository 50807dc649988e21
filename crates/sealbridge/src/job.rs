//! Confidential-compute jobs: read a stored blob and hand it to the enclave.
//!
//! Needs only storage and an enclave endpoint, so it runs without any
//! encryption or key-server configuration.

use std::sync::Arc;

use sealbridge_store::{BlobStore, ContentId};

use crate::enclave::EnclaveClient;
use crate::error::Result;
use crate::retry::RetryPolicy;

/// Forwards stored ciphertext to an enclave.
///
/// Store reads are retried under the policy; enclave answers are not, since
/// the enclave may already have acted on the first request.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn BlobStore>,
    enclave: EnclaveClient,
    retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(store: Arc<dyn BlobStore>, enclave: EnclaveClient, retry: RetryPolicy) -> Self {
        Self {
            store,
            enclave,
            retry,
        }
    }

    pub fn enclave(&self) -> &EnclaveClient {
        &self.enclave
    }

    /// Read the blob at `content_id` and post it to the enclave.
    pub async fn start(&self, content_id: &ContentId) -> Result<serde_json::Value> {
        let store = self.store.as_ref();
        let encrypted = self
            .retry
            .run("read", move || async move { Ok(store.read(content_id).await?) })
            .await?;
        tracing::info!(content_id = %content_id, size = encrypted.len(), "read ciphertext");

        let result = self
            .enclave
            .process(&encrypted, content_id.as_str())
            .await?;
        tracing::info!(content_id = %content_id, enclave = %self.enclave.remote, "job started");
        Ok(result)
    }
}
