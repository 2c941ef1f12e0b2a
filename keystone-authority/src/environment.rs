//! Shared execution environment injected into every component.

use keystone_core::{
    AccessEvent, Clock, KeystoneConfig, KeystoneError, KeystoneResult, StorageError,
    SystemClock, Timestamp,
};
use keystone_events::{EventSink, TracingEventSink};
use keystone_storage::{AuthorityStore, InMemoryStore};
use std::sync::{Arc, Mutex, MutexGuard};

/// Store, event sink, clock and configuration shared by the components of one
/// deployment.
///
/// Components built over the same environment also share its operation
/// guard: a mutating operation holds the guard from its first precondition
/// check to its last write, so no two operations interleave.
#[derive(Clone)]
pub struct Environment {
    store: Arc<dyn AuthorityStore>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: KeystoneConfig,
    serial: Arc<Mutex<()>>,
}

impl Environment {
    pub fn new(
        store: Arc<dyn AuthorityStore>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: KeystoneConfig,
    ) -> KeystoneResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            events,
            clock,
            config,
            serial: Arc::new(Mutex::new(())),
        })
    }

    /// In-memory store, wall clock, and events logged through `tracing`.
    pub fn in_memory(config: KeystoneConfig) -> KeystoneResult<Self> {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TracingEventSink),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn store(&self) -> &dyn AuthorityStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Deliver an event stamped with the current time.
    pub fn emit(&self, event: AccessEvent) {
        self.events.emit(&event, self.clock.now());
    }

    /// Acquire the operation guard.
    pub fn serialize(&self) -> KeystoneResult<MutexGuard<'_, ()>> {
        self.serial
            .lock()
            .map_err(|_| KeystoneError::Storage(StorageError::LockPoisoned))
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::ConfigError;

    #[test]
    fn test_new_validates_config() {
        let config = KeystoneConfig {
            max_grant_duration_secs: 0,
            ..KeystoneConfig::default()
        };
        assert!(matches!(
            Environment::in_memory(config),
            Err(KeystoneError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_clones_share_guard() {
        let env = Environment::in_memory(KeystoneConfig::default()).unwrap();
        let other = env.clone();
        let _guard = env.serialize().unwrap();
        assert!(other.serial.try_lock().is_err());
    }
}
