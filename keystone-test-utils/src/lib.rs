//! Keystone Test Utilities
//!
//! Shared test infrastructure for the Keystone workspace:
//! - `Fixture`: every component wired over one in-memory store and a manual clock
//! - `TestSigner`: deterministic secp256k1 agents that sign binding messages
//! - Proptest generators for identities, tiers and configuration
//! - Assertions for Keystone error variants

use k256::ecdsa::SigningKey;
use std::sync::Arc;

// Re-export the component crates so tests need a single import.
pub use keystone_access::{AgreementLedger, TieredAccessRegistry};
pub use keystone_agents::{identity_from_verifying_key, sign_binding, AgentBindingRegistry};
pub use keystone_authority::{Environment, MasterAuthority};
pub use keystone_core::{
    AccessEvent, AccessTier, AccessTierEntry, AgentBinding, Agreement, AgreementError,
    AgreementId, AgreementStatus, AuthorityError, AuthorizationMode, BindingError, Clock,
    ConfigError, EventKind, Identity, KeystoneConfig, KeystoneError, KeystoneResult, ManualClock,
    StorageError, TierError, Timestamp,
};
pub use keystone_events::InMemoryEventLog;
pub use keystone_storage::{AuthorityStore, InMemoryStore};

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug output for Keystone crates.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,keystone=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TEST SIGNERS
// ============================================================================

/// A deterministic agent key.
#[derive(Debug, Clone)]
pub struct TestSigner {
    key: SigningKey,
    identity: Identity,
}

impl TestSigner {
    /// Signer whose secret scalar is `seed` (big endian). `seed` must be
    /// non-zero.
    pub fn from_seed(seed: u64) -> Self {
        let mut secret = [0u8; 32];
        secret[24..].copy_from_slice(&seed.max(1).to_be_bytes());
        let key = SigningKey::from_slice(&secret).expect("small non-zero scalar is a valid key");
        let identity = identity_from_verifying_key(key.verifying_key());
        Self { key, identity }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Consent to be bound to `principal`, with `v` in `{27, 28}`.
    pub fn sign_binding(&self, principal: Identity) -> Vec<u8> {
        sign_binding(&self.key, principal).expect("signing a 32-byte digest cannot fail")
    }

    /// Same as [`TestSigner::sign_binding`] with a raw `{0, 1}` recovery id.
    pub fn sign_binding_raw(&self, principal: Identity) -> Vec<u8> {
        let mut signature = self.sign_binding(principal);
        signature[64] -= 27;
        signature
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Keystone types.

    use super::*;
    use proptest::prelude::*;

    /// Any non-null identity.
    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        any::<[u8; 20]>()
            .prop_filter("null identity", |bytes| bytes.iter().any(|b| *b != 0))
            .prop_map(Identity::from_bytes)
    }

    /// Identity from a small pool, so generated operations collide often.
    pub fn arb_pooled_identity(pool: u64) -> impl Strategy<Value = Identity> {
        (1..=pool.max(1)).prop_map(Identity::from_u64)
    }

    pub fn arb_tier() -> impl Strategy<Value = AccessTier> {
        proptest::sample::select(AccessTier::ALL.to_vec())
    }

    /// Raw tier level including out-of-range values.
    pub fn arb_tier_level() -> impl Strategy<Value = u8> {
        prop_oneof![
            3 => AccessTier::MIN_LEVEL..=AccessTier::MAX_LEVEL,
            1 => any::<u8>(),
        ]
    }

    /// Duration between one second and thirty days.
    pub fn arb_duration_secs() -> impl Strategy<Value = u64> {
        1u64..=30 * 86_400
    }

    pub fn arb_signer() -> impl Strategy<Value = TestSigner> {
        (1u64..1_000_000).prop_map(TestSigner::from_seed)
    }

    /// Generate a KeystoneConfig that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = KeystoneConfig> {
        (1u64..=10 * 365 * 86_400, any::<bool>(), 1usize..100_000).prop_map(
            |(max_grant_duration_secs, accept_raw_recovery_ids, event_log_capacity)| {
                KeystoneConfig {
                    max_grant_duration_secs,
                    accept_raw_recovery_ids,
                    event_log_capacity,
                }
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-wired deployments for common testing scenarios.

    use super::*;

    pub const MASTER_ID: Identity = Identity::from_bytes([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x00,
    ]);
    pub const DEPLOYER_ID: Identity = Identity::from_bytes([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x01,
    ]);
    pub const REGISTRY_ID: Identity = Identity::from_bytes([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x02,
    ]);

    /// Configuration with a one-year duration cap.
    pub fn test_config() -> KeystoneConfig {
        KeystoneConfig {
            max_grant_duration_secs: 365 * 86_400,
            accept_raw_recovery_ids: true,
            event_log_capacity: 1_000,
        }
    }

    /// A bootstrapped master, tier registry and binding registry over one
    /// in-memory store, an event log and a manual clock.
    pub struct Fixture {
        pub clock: Arc<ManualClock>,
        pub store: Arc<InMemoryStore>,
        pub events: Arc<InMemoryEventLog>,
        pub env: Environment,
        pub master: Arc<MasterAuthority>,
        pub registry: TieredAccessRegistry,
        pub bindings: AgentBindingRegistry,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: KeystoneConfig) -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let store = Arc::new(InMemoryStore::new());
            let events = Arc::new(InMemoryEventLog::from_config(&config));
            let env = Environment::new(store.clone(), events.clone(), clock.clone(), config)
                .expect("fixture config is valid");
            let master = Arc::new(
                MasterAuthority::bootstrap(MASTER_ID, DEPLOYER_ID, env.clone())
                    .expect("fixture master bootstraps"),
            );
            let registry = TieredAccessRegistry::deploy(REGISTRY_ID, DEPLOYER_ID, master.clone())
                .expect("fixture registry deploys");
            let bindings = AgentBindingRegistry::new(master.clone());
            Self {
                clock,
                store,
                events,
                env,
                master,
                registry,
                bindings,
            }
        }

        pub fn ledger(&self) -> &AgreementLedger {
            self.registry.agreements()
        }

        /// Give `caller` authority over the registry itself.
        pub fn authorize_on_registry(&self, caller: Identity) {
            self.master
                .grant_access(DEPLOYER_ID, REGISTRY_ID, caller)
                .expect("deployer manages the registry");
        }
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Keystone error variants.

    use super::*;

    #[track_caller]
    pub fn assert_unauthorized<T: std::fmt::Debug>(result: &KeystoneResult<T>) {
        match result {
            Err(KeystoneError::Authority(AuthorityError::Unauthorized { .. })) => {}
            other => panic!("Expected Unauthorized, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_identity<T: std::fmt::Debug>(result: &KeystoneResult<T>) {
        match result {
            Err(KeystoneError::Authority(AuthorityError::InvalidIdentity { .. })) => {}
            other => panic!("Expected InvalidIdentity, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_already_deployed<T: std::fmt::Debug>(result: &KeystoneResult<T>) {
        match result {
            Err(KeystoneError::Authority(AuthorityError::AlreadyDeployed { .. })) => {}
            other => panic!("Expected AlreadyDeployed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_tier<T: std::fmt::Debug>(result: &KeystoneResult<T>, value: u8) {
        match result {
            Err(KeystoneError::Tier(TierError::InvalidTier { value: got })) => {
                assert_eq!(*got, value, "Wrong tier value in InvalidTier error");
            }
            other => panic!("Expected InvalidTier({}), got: {:?}", value, other),
        }
    }

    #[track_caller]
    pub fn assert_agreement_exists<T: std::fmt::Debug>(result: &KeystoneResult<T>) {
        match result {
            Err(KeystoneError::Agreement(AgreementError::AgreementExists { .. })) => {}
            other => panic!("Expected AgreementExists, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_active<T: std::fmt::Debug>(
        result: &KeystoneResult<T>,
        status: AgreementStatus,
    ) {
        match result {
            Err(KeystoneError::Agreement(AgreementError::NotActive { status: got, .. })) => {
                assert_eq!(*got, status, "Wrong status in NotActive error");
            }
            other => panic!("Expected NotActive({}), got: {:?}", status, other),
        }
    }

    /// Assert that a result failed with exactly `expected`.
    #[track_caller]
    pub fn assert_binding_error<T: std::fmt::Debug>(
        result: &KeystoneResult<T>,
        expected: BindingError,
    ) {
        match result {
            Err(KeystoneError::Binding(got)) => assert_eq!(*got, expected),
            other => panic!("Expected {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert the forward and reverse binding lookups agree for `principal`.
    #[track_caller]
    pub fn assert_bijection(bindings: &AgentBindingRegistry, principal: Identity) {
        let agent = bindings.get_agent(principal);
        if agent.is_zero() {
            assert!(!bindings.has_agent(principal));
        } else {
            assert_eq!(
                bindings.get_principal(agent),
                principal,
                "reverse mapping for {} does not point back to {}",
                agent,
                principal
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
