//! Pipeline configuration.
//!
//! All settings live in one [`PipelineConfig`], loaded from the environment
//! (or any key/value lookup) and validated once when a pipeline is built.

use std::collections::HashSet;

use url::Url;

use sealbridge_core::{KeyServerId, PackageId, PolicyRef, Threshold};
use sealbridge_seal::{DEFAULT_APPROVAL_FUNCTION, DEFAULT_POLICY_MODULE};
use sealbridge_store::StoreOptions;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const ENV_PACKAGE_ID: &str = "SEAL_PACKAGE_ID";
pub const ENV_ALLOWLIST_ID: &str = "SEAL_ALLOWLIST_ID";
pub const ENV_POLICY_ID: &str = "SEAL_POLICY_ID";
pub const ENV_TTL_MIN: &str = "SEAL_TTL_MIN";
pub const ENV_KEY_SERVERS: &str = "SEAL_KEY_SERVERS";
pub const ENV_THRESHOLD: &str = "SEAL_THRESHOLD";
pub const ENV_SERVICE_URL: &str = "SEAL_SERVICE_URL";
pub const ENV_POLICY_MODULE: &str = "SEAL_POLICY_MODULE";
pub const ENV_APPROVAL_FN: &str = "SEAL_APPROVAL_FN";
pub const ENV_ID_NONCE: &str = "SEAL_ID_NONCE";
pub const ENV_WALRUS_EPOCHS: &str = "WALRUS_EPOCHS";
pub const ENV_WALRUS_CONTEXT: &str = "WALRUS_CONTEXT";
pub const ENV_WALRUS_RPC_URL: &str = "WALRUS_RPC_URL";
pub const ENV_WALRUS_PUBLISHER_URL: &str = "WALRUS_PUBLISHER_URL";
pub const ENV_WALRUS_AGGREGATOR_URL: &str = "WALRUS_AGGREGATOR_URL";
pub const ENV_ENCLAVE_URL: &str = "ENCLAVE_URL";
pub const ENV_MAX_ATTEMPTS: &str = "SEALBRIDGE_MAX_ATTEMPTS";

pub const DEFAULT_TTL_MINUTES: u32 = 10;
pub const DEFAULT_EPOCHS: u32 = 2;
pub const DEFAULT_ENCLAVE_URL: &str = "http://localhost:3000";

/// A configured key server, optionally with the URL it is served at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyServerEntry {
    pub id: KeyServerId,
    pub url: Option<Url>,
}

impl KeyServerEntry {
    /// Parse `id` or `id=url`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (id, url) = match s.split_once('=') {
            Some((id, url)) => (id.trim(), Some(url.trim())),
            None => (s.trim(), None),
        };
        let id = KeyServerId::from_hex(id)
            .map_err(|e| ConfigError::invalid(ENV_KEY_SERVERS, e.to_string()))?;
        let url = url
            .map(|u| {
                Url::parse(u)
                    .map_err(|e| ConfigError::invalid(ENV_KEY_SERVERS, format!("{u}: {e}")))
            })
            .transpose()?;
        Ok(Self { id, url })
    }
}

/// Where and how long envelopes are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub epochs: u32,
    pub context: Option<String>,
    pub rpc_url: Option<String>,
    /// Native publisher endpoint; without it the CLI fallback is used.
    pub publisher_url: Option<Url>,
    pub aggregator_url: Option<Url>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            context: None,
            rpc_url: None,
            publisher_url: None,
            aggregator_url: None,
        }
    }
}

impl StorageConfig {
    /// Load the storage settings alone.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);
        let mut storage = Self::default();
        if let Some(v) = get(ENV_WALRUS_EPOCHS) {
            storage.epochs = parse_number(ENV_WALRUS_EPOCHS, &v)?;
        }
        storage.context = get(ENV_WALRUS_CONTEXT);
        storage.rpc_url = get(ENV_WALRUS_RPC_URL);
        storage.publisher_url = get(ENV_WALRUS_PUBLISHER_URL)
            .map(|v| parse_url(ENV_WALRUS_PUBLISHER_URL, &v))
            .transpose()?;
        storage.aggregator_url = get(ENV_WALRUS_AGGREGATOR_URL)
            .map(|v| parse_url(ENV_WALRUS_AGGREGATOR_URL, &v))
            .transpose()?;
        storage.validate()?;
        Ok(storage)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::invalid(ENV_WALRUS_EPOCHS, "must be greater than zero"));
        }
        if self.publisher_url.is_some() != self.aggregator_url.is_some() {
            let var = if self.publisher_url.is_some() {
                ENV_WALRUS_AGGREGATOR_URL
            } else {
                ENV_WALRUS_PUBLISHER_URL
            };
            return Err(ConfigError::invalid(
                var,
                "publisher and aggregator URLs must be set together",
            ));
        }
        Ok(())
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            epochs: self.epochs,
            context: self.context.clone(),
            rpc_url: self.rpc_url.clone(),
        }
    }

    /// Both native endpoints, when configured.
    pub fn http_endpoints(&self) -> Option<(&Url, &Url)> {
        self.publisher_url.as_ref().zip(self.aggregator_url.as_ref())
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Package whose policy module gates decryption.
    pub namespace: PackageId,
    /// Policy object identifiers are bound to.
    pub policy_object: PolicyRef,
    pub ttl_minutes: u32,
    pub key_servers: Vec<KeyServerEntry>,
    pub threshold: Threshold,
    pub seal_service_url: Option<Url>,
    pub storage: StorageConfig,
    pub enclave_url: Url,
    pub policy_module: String,
    pub approval_entry_point: String,
    /// Append a fresh nonce to each identifier.
    pub include_nonce: bool,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// A configuration with defaults for everything but the essentials.
    pub fn new(
        namespace: PackageId,
        policy_object: PolicyRef,
        key_servers: Vec<KeyServerEntry>,
        threshold: Threshold,
    ) -> Self {
        Self {
            namespace,
            policy_object,
            ttl_minutes: DEFAULT_TTL_MINUTES,
            key_servers,
            threshold,
            seal_service_url: None,
            storage: StorageConfig::default(),
            enclave_url: default_enclave_url(),
            policy_module: DEFAULT_POLICY_MODULE.to_string(),
            approval_entry_point: DEFAULT_APPROVAL_FUNCTION.to_string(),
            include_nonce: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);

        let namespace = get(ENV_PACKAGE_ID).ok_or(ConfigError::Missing(ENV_PACKAGE_ID))?;
        let namespace = PackageId::from_hex(&namespace)
            .map_err(|e| ConfigError::invalid(ENV_PACKAGE_ID, e.to_string()))?;

        let (policy_var, policy) = match get(ENV_ALLOWLIST_ID) {
            Some(v) => (ENV_ALLOWLIST_ID, v),
            None => (
                ENV_POLICY_ID,
                get(ENV_POLICY_ID).ok_or(ConfigError::Missing(ENV_ALLOWLIST_ID))?,
            ),
        };
        let policy_object = PolicyRef::from_hex(&policy)
            .map_err(|e| ConfigError::invalid(policy_var, e.to_string()))?;

        let key_servers = get(ENV_KEY_SERVERS)
            .ok_or(ConfigError::Missing(ENV_KEY_SERVERS))?
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(KeyServerEntry::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let threshold = match get(ENV_THRESHOLD) {
            Some(v) => parse_number::<u8>(ENV_THRESHOLD, &v)?,
            None => key_servers.len().clamp(1, 2) as u8,
        };
        let threshold = Threshold::new(threshold)
            .map_err(|e| ConfigError::invalid(ENV_THRESHOLD, e.to_string()))?;

        let mut config = Self::new(namespace, policy_object, key_servers, threshold);

        if let Some(v) = get(ENV_TTL_MIN) {
            config.ttl_minutes = parse_number(ENV_TTL_MIN, &v)?;
        }
        config.seal_service_url = get(ENV_SERVICE_URL)
            .map(|v| parse_url(ENV_SERVICE_URL, &v))
            .transpose()?;
        if let Some(v) = get(ENV_POLICY_MODULE) {
            config.policy_module = v;
        }
        if let Some(v) = get(ENV_APPROVAL_FN) {
            config.approval_entry_point = v;
        }
        if let Some(v) = get(ENV_ID_NONCE) {
            config.include_nonce = parse_bool(ENV_ID_NONCE, &v)?;
        }
        config.enclave_url = enclave_url(&lookup)?;
        if let Some(v) = get(ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &v)?;
        }

        config.storage = StorageConfig::from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_minutes == 0 {
            return Err(ConfigError::invalid(ENV_TTL_MIN, "must be greater than zero"));
        }
        if self.key_servers.is_empty() {
            return Err(ConfigError::invalid(
                ENV_KEY_SERVERS,
                "at least one key server is required",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.key_servers.iter().find(|s| !seen.insert(s.id)) {
            return Err(ConfigError::invalid(
                ENV_KEY_SERVERS,
                format!("{} is listed twice", dup.id),
            ));
        }
        if self.threshold.as_usize() > self.key_servers.len() {
            return Err(ConfigError::invalid(
                ENV_THRESHOLD,
                format!(
                    "{} exceeds the {} configured key servers",
                    self.threshold,
                    self.key_servers.len()
                ),
            ));
        }
        self.storage.validate()?;
        if !is_move_identifier(&self.policy_module) {
            return Err(ConfigError::invalid(
                ENV_POLICY_MODULE,
                format!("{:?} is not a valid module name", self.policy_module),
            ));
        }
        if !is_move_identifier(&self.approval_entry_point) {
            return Err(ConfigError::invalid(
                ENV_APPROVAL_FN,
                format!("{:?} is not a valid function name", self.approval_entry_point),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(ENV_MAX_ATTEMPTS, "must be at least 1"));
        }
        Ok(())
    }

    pub fn key_server_ids(&self) -> Vec<KeyServerId> {
        self.key_servers.iter().map(|s| s.id).collect()
    }
}

/// The enclave endpoint from `ENCLAVE_URL`, or the local default.
pub fn enclave_url<F>(lookup: F) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_blank(&lookup, ENV_ENCLAVE_URL) {
        Some(v) => parse_url(ENV_ENCLAVE_URL, &v),
        None => Ok(default_enclave_url()),
    }
}

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_enclave_url() -> Url {
    // Constant input; parsing cannot fail.
    Url::parse(DEFAULT_ENCLAVE_URL).unwrap_or_else(|_| unreachable!())
}

fn is_move_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, format!("{value:?}: {e}")))
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::invalid(var, format!("{value}: {e}")))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, format!("{value:?} is not a boolean"))),
    }
}
