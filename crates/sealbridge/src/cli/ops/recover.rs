use std::path::PathBuf;

use clap::Args;

use sealbridge::core::{CoreError, Envelope};
use sealbridge::seal::{decrypt_with_backup_key, DataKey, SealError};

#[derive(Args, Debug, Clone)]
pub struct Recover {
    /// Envelope file
    #[arg(long = "in", value_name = "FILE")]
    pub input: PathBuf,

    /// Backup key as hex, or a path to a `.backupKey.hex` file
    #[arg(long)]
    pub key: String,

    /// Where to write the plaintext
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum RecoverError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Envelope(#[from] CoreError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

impl Recover {
    async fn backup_key(&self) -> Result<DataKey, RecoverError> {
        let path = PathBuf::from(&self.key);
        let hex = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| RecoverError::Io { path, source })?
        } else {
            self.key.clone()
        };
        Ok(DataKey::from_hex(&hex)?)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Recover {
    type Error = RecoverError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = self.backup_key().await?;
        let bytes = tokio::fs::read(&self.input)
            .await
            .map_err(|source| RecoverError::Io {
                path: self.input.clone(),
                source,
            })?;
        let envelope = Envelope::parse(&bytes)?;
        let plaintext = decrypt_with_backup_key(&envelope, &key)?;

        tokio::fs::write(&self.out, &plaintext)
            .await
            .map_err(|source| RecoverError::Io {
                path: self.out.clone(),
                source,
            })?;
        tracing::info!(identifier = %envelope.identifier(), "recovered with backup key");

        Ok(format!(
            "Recovered {} bytes -> {}",
            plaintext.len(),
            self.out.display()
        ))
    }
}
