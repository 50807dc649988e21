use std::path::PathBuf;

use clap::Args;

use sealbridge::config::ENV_KEY_SERVERS;
use sealbridge::seal::{Ed25519Signer, SealError};
use sealbridge::{ConfigError, ContentId, Pipeline, PipelineConfig, PipelineError};

/// Hex seed of the user's Ed25519 key.
pub const ENV_PRIVATE_KEY: &str = "SUI_PRIVATE_KEY";

#[derive(Args, Debug, Clone)]
pub struct Decrypt {
    /// Blob id returned by `encrypt`
    #[arg(long)]
    pub blob: ContentId,

    /// Where to write the plaintext
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<ConfigError> for DecryptError {
    fn from(err: ConfigError) -> Self {
        DecryptError::Pipeline(err.into())
    }
}

impl From<SealError> for DecryptError {
    fn from(err: SealError) -> Self {
        DecryptError::Pipeline(err.into())
    }
}

/// Key requests go only to servers with a URL; there must be enough of them.
fn check_reachable(config: &PipelineConfig) -> Result<(), ConfigError> {
    let with_url = config.key_servers.iter().filter(|s| s.url.is_some()).count();
    if with_url < config.threshold.as_usize() {
        return Err(ConfigError::invalid(
            ENV_KEY_SERVERS,
            format!(
                "decryption needs at least {} entries of the form id=url, found {with_url}",
                config.threshold
            ),
        ));
    }
    Ok(())
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Decrypt {
    type Error = DecryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let seed = ctx
            .var(ENV_PRIVATE_KEY)
            .ok_or(ConfigError::Missing(ENV_PRIVATE_KEY))?;
        let signer = Ed25519Signer::from_hex(&seed)
            .map_err(|e| ConfigError::invalid(ENV_PRIVATE_KEY, e.to_string()))?;

        let config = ctx.config()?;
        check_reachable(&config)?;
        let pipeline = Pipeline::connect(config)?;

        let session = pipeline.mint_session(&signer)?;
        let plaintext = pipeline.fetch_and_decrypt(&self.blob, &session).await?;

        tokio::fs::write(&self.out, &plaintext)
            .await
            .map_err(|source| DecryptError::Write {
                path: self.out.clone(),
                source,
            })?;

        Ok(format!(
            "Decrypted {} bytes -> {}",
            plaintext.len(),
            self.out.display()
        ))
    }
}
