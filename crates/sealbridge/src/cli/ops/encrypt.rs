use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::Args;

use sealbridge::{Pipeline, PipelineError};

#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// File to encrypt
    #[arg(long = "in", value_name = "FILE")]
    pub input: PathBuf,

    /// Where to write the envelope
    #[arg(long, value_name = "FILE", default_value = "./encrypted.bin")]
    pub out: PathBuf,

    /// Use the policy object alone as the identifier
    #[arg(long)]
    pub no_nonce: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<sealbridge::ConfigError> for EncryptError {
    fn from(err: sealbridge::ConfigError) -> Self {
        EncryptError::Pipeline(err.into())
    }
}

/// `<out>.backupKey.hex`, next to the envelope.
pub fn backup_key_path(out: &Path) -> PathBuf {
    let mut name = out
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("encrypted.bin"));
    name.push(".backupKey.hex");
    out.with_file_name(name)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Encrypt {
    type Error = EncryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.config()?;
        let include_nonce = config.include_nonce && !self.no_nonce;
        let pipeline = Pipeline::connect(config)?;

        let data = tokio::fs::read(&self.input)
            .await
            .map_err(|source| EncryptError::Read {
                path: self.input.clone(),
                source,
            })?;

        let encrypted = pipeline.encrypt(Bytes::from(data), include_nonce).await?;
        write(&self.out, &encrypted.envelope_bytes).await?;
        tracing::info!(
            path = %self.out.display(),
            package = %encrypted.envelope.package(),
            identifier = %encrypted.envelope.identifier(),
            threshold = %encrypted.envelope.threshold(),
            "wrote envelope"
        );

        let key_hex = match &encrypted.backup_key {
            Some(key) => {
                let key_path = backup_key_path(&self.out);
                let hex = key.to_hex();
                write(&key_path, hex.as_bytes()).await?;
                tracing::info!(path = %key_path.display(), "saved backup key");
                Some(hex)
            }
            None => {
                tracing::warn!("encryption service released no backup key");
                None
            }
        };

        let blob_id = pipeline.publish(encrypted.envelope_bytes).await?;

        Ok(serde_json::json!({
            "blobId": blob_id.as_str(),
            "outPath": self.out.display().to_string(),
            "keyHex": key_hex,
        })
        .to_string())
    }
}

async fn write(path: &Path, contents: &[u8]) -> Result<(), EncryptError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| EncryptError::Write {
            path: path.to_path_buf(),
            source,
        })
}
