use clap::Args;
use url::Url;

use sealbridge::{
    connect_store, ConfigError, ContentId, EnclaveClient, JobRunner, PipelineError, RetryPolicy,
};

#[derive(Args, Debug, Clone)]
pub struct StartJob {
    /// Blob id of the encrypted input
    #[arg(long)]
    pub blob: ContentId,

    /// Enclave endpoint (defaults to ENCLAVE_URL, then http://localhost:3000)
    #[arg(long)]
    pub enclave: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartJobError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] PipelineError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for StartJob {
    type Error = StartJobError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let enclave_url = match &self.enclave {
            Some(url) => url.clone(),
            None => ctx.enclave_url()?,
        };
        let store = connect_store(&ctx.storage()?).map_err(PipelineError::from)?;
        let enclave = EnclaveClient::new(&enclave_url).map_err(PipelineError::from)?;

        let response = JobRunner::new(store, enclave, RetryPolicy::default())
            .start(&self.blob)
            .await?;

        let pretty = serde_json::to_string_pretty(&response)
            .unwrap_or_else(|_| response.to_string());
        Ok(format!("Enclave response:\n{pretty}"))
    }
}
