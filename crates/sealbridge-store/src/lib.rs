//! # Seal Bridge Store
//!
//! Blob storage bridge for Seal Bridge. Envelopes are persisted behind the
//! [`BlobStore`] trait and addressed by an opaque [`ContentId`].
//!
//! ## Overview
//!
//! The pipeline never depends on a concrete backend. Three are provided:
//!
//! - [`MemoryBlobStore`] - In-memory, BLAKE3-addressed storage for tests
//! - [`WalrusHttpStore`] - Native client for the Walrus publisher/aggregator
//! - [`WalrusCliStore`] - Fallback that drives the `walrus` binary and scrapes
//!   its output
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use sealbridge_store::{BlobStore, MemoryBlobStore};
//!
//! async fn example() {
//!     let store = MemoryBlobStore::new();
//!     let id = store.store(Bytes::from_static(b"envelope")).await.unwrap();
//!     let bytes = store.read(&id).await.unwrap();
//!     assert_eq!(&bytes[..], b"envelope");
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Transport vs. content errors**: only `Unavailable` is retryable
//! - **No guessing**: ambiguous CLI output is an error, not a best-effort id

pub mod error;
pub mod memory;
pub mod traits;
pub mod walrus_cli;
pub mod walrus_http;

pub use error::{Result, StoreError};
pub use memory::MemoryBlobStore;
pub use traits::{BlobStore, ContentId, StoreOptions};
pub use walrus_cli::{scrape_blob_id, WalrusCliStore};
pub use walrus_http::WalrusHttpStore;
