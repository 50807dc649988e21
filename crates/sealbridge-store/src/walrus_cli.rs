//! Fallback backend that drives the `walrus` command-line client.
//!
//! The CLI prints human-oriented text, so blob ids are scraped from its
//! output. `Blob ID: <id>` lines win if they all name the same id; otherwise the output must contain
//! exactly one distinct `0x`-prefixed hex token of at least 64 digits.
//! Anything else is rejected rather than guessed.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Output;
use std::sync::OnceLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tokio::process::Command;

use crate::error::{Result, StoreError};
use crate::traits::{BlobStore, ContentId, StoreOptions};

fn labelled_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)Blob ID:\s*(\S+)").expect("literal pattern"))
}

fn hex_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]{64,}").expect("literal pattern"))
}

/// Extract the blob id from `walrus store` output.
pub fn scrape_blob_id(output: &str) -> Result<ContentId> {
    let labelled: BTreeSet<&str> = labelled_id()
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();
    match labelled.len() {
        0 => {}
        1 => return ContentId::new(labelled.into_iter().next().unwrap_or_default()),
        n => {
            return Err(StoreError::InvalidResponse(format!(
                "ambiguous walrus output: {n} distinct labelled blob ids"
            )))
        }
    }

    let candidates: BTreeSet<&str> = hex_token()
        .find_iter(output)
        .map(|m| m.as_str())
        .collect();

    match candidates.len() {
        1 => ContentId::new(candidates.into_iter().next().unwrap_or_default()),
        0 => Err(StoreError::InvalidResponse(
            "no blob id found in walrus output".into(),
        )),
        n => Err(StoreError::InvalidResponse(format!(
            "ambiguous walrus output: {n} distinct blob id candidates"
        ))),
    }
}

/// Blob store that shells out to the `walrus` binary.
#[derive(Debug, Clone)]
pub struct WalrusCliStore {
    binary: PathBuf,
    options: StoreOptions,
}

impl WalrusCliStore {
    /// Use `walrus` from `PATH`.
    pub fn new(options: StoreOptions) -> Self {
        Self::with_binary("walrus", options)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            binary: binary.into(),
            options,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.kill_on_drop(true);
        cmd
    }

    fn push_connection_args(&self, cmd: &mut Command) {
        if let Some(context) = &self.options.context {
            cmd.arg("--context").arg(context);
        }
        if let Some(rpc_url) = &self.options.rpc_url {
            cmd.arg("--rpc-url").arg(rpc_url);
        }
    }

    async fn run(&self, mut cmd: Command) -> Result<(Output, String)> {
        let output = cmd.output().await.map_err(|e| {
            StoreError::Unavailable(format!("failed to run {}: {e}", self.binary.display()))
        })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push('\n');
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((output, combined))
    }
}

fn mentions_missing(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("not found") || lower.contains("does not exist")
}

#[async_trait]
impl BlobStore for WalrusCliStore {
    async fn store(&self, data: Bytes) -> Result<ContentId> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("blob.bin");
        tokio::fs::write(&path, &data).await?;

        let mut cmd = self.command();
        cmd.arg("store")
            .arg(&path)
            .arg("--epochs")
            .arg(self.options.epochs.to_string());
        self.push_connection_args(&mut cmd);

        tracing::debug!(size = data.len(), epochs = self.options.epochs, "walrus store");
        let (output, combined) = self.run(cmd).await?;
        if !output.status.success() {
            return Err(StoreError::Unavailable(format!(
                "walrus store exited with {}: {}",
                output.status,
                combined.trim()
            )));
        }

        scrape_blob_id(&combined)
    }

    async fn read(&self, id: &ContentId) -> Result<Bytes> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("blob.bin");

        let mut cmd = self.command();
        cmd.arg("read").arg(id.as_str()).arg("--out").arg(&out);
        self.push_connection_args(&mut cmd);

        tracing::debug!(blob_id = %id, "walrus read");
        let (output, combined) = self.run(cmd).await?;
        if !output.status.success() {
            if mentions_missing(&combined) {
                return Err(StoreError::NotFound(id.to_string()));
            }
            return Err(StoreError::Unavailable(format!(
                "walrus read exited with {}: {}",
                output.status,
                combined.trim()
            )));
        }

        let bytes = tokio::fs::read(&out).await?;
        Ok(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const ID_B: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    #[test]
    fn test_labelled_line_wins() {
        let output = format!("Success\nBlob ID: Q2hhbmdlZA\nSui object ID: {ID_A}\n");
        assert_eq!(scrape_blob_id(&output).unwrap().as_str(), "Q2hhbmdlZA");
    }

    #[test]
    fn test_conflicting_labelled_ids_are_ambiguous() {
        let output = "Blob ID: Q2hhbmdlZA\nretrying\nBlob ID: T3RoZXI\n";
        let err = scrape_blob_id(output).unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
        assert!(err.to_string().contains("2 distinct"));
    }

    #[test]
    fn test_repeated_labelled_id_is_accepted() {
        let output = "Blob ID: Q2hhbmdlZA\nsummary\nBlob ID: Q2hhbmdlZA\n";
        assert_eq!(scrape_blob_id(output).unwrap().as_str(), "Q2hhbmdlZA");
    }

    #[test]
    fn test_single_hex_token() {
        let output = format!("stored blob {ID_A} for 2 epochs\n");
        assert_eq!(scrape_blob_id(&output).unwrap().as_str(), ID_A);
    }

    #[test]
    fn test_repeated_token_is_not_ambiguous() {
        let output = format!("{ID_A}\nconfirmed {ID_A}\n");
        assert_eq!(scrape_blob_id(&output).unwrap().as_str(), ID_A);
    }

    #[test]
    fn test_two_tokens_are_ambiguous() {
        let output = format!("blob {ID_A}\nobject {ID_B}\n");
        let err = scrape_blob_id(&output).unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
        assert!(err.to_string().contains("2 distinct"));
    }

    #[test]
    fn test_no_token() {
        assert!(matches!(
            scrape_blob_id("nothing useful here"),
            Err(StoreError::InvalidResponse(_))
        ));
        // 63 digits is too short
        let short = format!("0x{}", "a".repeat(63));
        assert!(scrape_blob_id(&short).is_err());
    }

    #[test]
    fn test_missing_detection() {
        assert!(mentions_missing("Error: blob Not Found on any node"));
        assert!(mentions_missing("the blob does not exist"));
        assert!(!mentions_missing("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let store = WalrusCliStore::with_binary(
            "/nonexistent/walrus-binary-for-tests",
            StoreOptions::default(),
        );
        let err = store.store(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is_transient());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn labelled_id_is_found_in_noise(
            before in "[a-z .:]{0,40}",
            after in "[a-z .:]{0,40}",
            id in "[A-Za-z0-9_-]{8,44}",
        ) {
            let output = format!("{before}\nBlob ID: {id}\n{after}");
            let scraped = scrape_blob_id(&output).unwrap();
            prop_assert_eq!(scraped.as_str(), id.as_str());
        }

        #[test]
        fn two_unlabelled_ids_are_ambiguous(a in "0x[0-9a-f]{64}", b in "0x[0-9a-f]{64}") {
            prop_assume!(a != b);
            let output = format!("created {a}\nregistered {b}\n");
            prop_assert!(scrape_blob_id(&output).is_err());
        }
    }
}
