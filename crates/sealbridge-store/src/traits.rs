//! BlobStore trait: the abstract interface for envelope persistence.
//!
//! The pipeline only ever stores and reads whole envelopes by content id.
//! Backends decide how the id is derived.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Opaque handle returned by a blob store for a stored blob.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(pub(crate) String);

impl ContentId {
    /// Create a content id; surrounding whitespace is dropped, empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidContentId(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

/// Storage parameters shared by the Walrus backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Storage duration in epochs; always > 0.
    pub epochs: u32,
    /// Named client context (CLI only).
    pub context: Option<String>,
    /// RPC endpoint override (CLI only).
    pub rpc_url: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            epochs: 2,
            context: None,
            rpc_url: None,
        }
    }
}

/// The BlobStore trait: async interface for content-addressed blob storage.
///
/// # Errors
///
/// - `Unavailable` for transport failures; safe to retry.
/// - `NotFound` when `read` is given an id the backend does not know.
/// - `InvalidResponse` when the backend answered with something unparseable.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `data` and return its content id.
    async fn store(&self, data: Bytes) -> Result<ContentId>;

    /// Fetch the bytes stored under `id`.
    async fn read(&self, id: &ContentId) -> Result<Bytes>;
}
