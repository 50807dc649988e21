use std::error::Error;
use std::sync::Arc;

use sealbridge::{ConfigError, PipelineConfig, StorageConfig};

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where commands read their settings from.
#[derive(Clone)]
pub struct OpContext {
    lookup: Lookup,
}

impl OpContext {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Read settings from `lookup` instead of the environment.
    #[cfg(test)]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// A single non-blank variable.
    pub fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn config(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::from_lookup(|key| (self.lookup)(key))
    }

    pub fn storage(&self) -> Result<StorageConfig, ConfigError> {
        StorageConfig::from_lookup(|key| (self.lookup)(key))
    }

    pub fn enclave_url(&self) -> Result<url::Url, ConfigError> {
        sealbridge::config::enclave_url(|key| (self.lookup)(key))
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
