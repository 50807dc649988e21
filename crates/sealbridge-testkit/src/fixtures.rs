//! Test fixtures and helpers.
//!
//! A [`Deployment`] wires a complete in-process system: a local key-server
//! committee, an allowlist ledger, a memory blob store, a manual clock and a
//! [`Pipeline`] driving them.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use sealbridge::{
    Components, KeyServerEntry, Pipeline, PipelineConfig, RetryPolicy, SessionKey,
};
use sealbridge_core::{FixedRandom, PackageId, PolicyRef, RandomSource, SeededRandom, Threshold};
use sealbridge_seal::{Ed25519Signer, LocalCommittee, ManualClock, MemoryLedger, PersonalSigner};
use sealbridge_store::MemoryBlobStore;

/// Wall-clock start of every fixture, in milliseconds.
pub const START_MILLIS: u64 = 1_736_870_400_000;

/// Configures a [`Deployment`].
#[derive(Clone)]
pub struct DeploymentBuilder {
    servers: usize,
    threshold: u8,
    seed: u64,
    include_nonce: bool,
    max_attempts: u32,
    random: Option<Arc<dyn RandomSource>>,
    enclave_url: Option<Url>,
}

impl DeploymentBuilder {
    pub fn servers(mut self, servers: usize) -> Self {
        self.servers = servers;
        self
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Seed for committee keys and identifier nonces.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn include_nonce(mut self, include_nonce: bool) -> Self {
        self.include_nonce = include_nonce;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Draw identifier nonces from `random` instead of the seeded source.
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Nonces repeat `nonce`, for golden scenarios.
    pub fn fixed_nonce(self, nonce: [u8; 5]) -> Self {
        self.random(Arc::new(FixedRandom::new(nonce.to_vec())))
    }

    pub fn enclave_url(mut self, url: Url) -> Self {
        self.enclave_url = Some(url);
        self
    }

    /// Build the deployment. Panics on an invalid combination.
    pub fn build(self) -> Deployment {
        let package = PackageId::from_bytes([0x5e; 32]);
        let user = Ed25519Signer::from_seed(&[0x42; 32]);

        let ledger = Arc::new(MemoryLedger::new());
        ledger.deploy(package);
        let policy = ledger
            .create_allowlist(package, vec![user.address()])
            .expect("package is deployed");

        let committee = LocalCommittee::new(self.servers, self.seed);
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let store = Arc::new(MemoryBlobStore::new());

        let entries = committee
            .ids()
            .into_iter()
            .map(|id| KeyServerEntry { id, url: None })
            .collect();
        let threshold = Threshold::new(self.threshold).expect("threshold must be >= 1");
        let mut config = PipelineConfig::new(package, policy, entries, threshold);
        config.include_nonce = self.include_nonce;
        config.retry = RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        };
        if let Some(url) = self.enclave_url {
            config.enclave_url = url;
        }

        let seed = self.seed;
        let random: Arc<dyn RandomSource> = match self.random {
            Some(random) => random,
            None => Arc::new(SeededRandom::new(seed)),
        };

        let pipeline = Pipeline::new(
            config,
            Components {
                seal_service: Some(Arc::new(committee.service())),
                key_servers: committee.key_servers(ledger.clone(), clock.clone()),
                store: store.clone(),
                clock: clock.clone(),
                random,
            },
        )
        .expect("fixture configuration is valid");

        Deployment {
            package,
            policy,
            user,
            ledger,
            committee,
            store,
            clock,
            pipeline,
        }
    }
}

/// A fully wired in-process deployment.
pub struct Deployment {
    pub package: PackageId,
    /// The allowlist every identifier is bound to.
    pub policy: PolicyRef,
    /// An allowlisted user.
    pub user: Ed25519Signer,
    pub ledger: Arc<MemoryLedger>,
    pub committee: LocalCommittee,
    pub store: Arc<MemoryBlobStore>,
    pub clock: Arc<ManualClock>,
    pub pipeline: Pipeline,
}

impl Deployment {
    /// Three servers, threshold two.
    pub fn builder() -> DeploymentBuilder {
        DeploymentBuilder {
            servers: 3,
            threshold: 2,
            seed: 7,
            include_nonce: true,
            max_attempts: 3,
            random: None,
            enclave_url: None,
        }
    }

    pub fn new(servers: usize, threshold: u8) -> Self {
        Self::builder()
            .servers(servers)
            .threshold(threshold)
            .build()
    }

    /// A session for the allowlisted user.
    pub fn session(&self) -> SessionKey {
        self.pipeline
            .mint_session(&self.user)
            .expect("user session mints")
    }

    /// A signer that is not on the allowlist.
    pub fn stranger(&self) -> Ed25519Signer {
        Ed25519Signer::from_seed(&[0x99; 32])
    }

    /// Take the user off the allowlist.
    pub fn revoke_user(&self) {
        self.ledger
            .remove_member(&self.policy, &self.user.address())
            .expect("policy exists");
    }

    /// Move every clock in the deployment forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
