//! Keystone Storage - Authority Store Trait and In-Memory Implementation
//!
//! Defines the key-value abstraction every Keystone component is injected
//! with. Keys are explicit tuples per entity:
//!
//! | entity | key |
//! |---|---|
//! | authority record | `(resource, caller)` |
//! | tier entry | `(resource, identity)` |
//! | agreement | `agreement_id`, indexed by `(resource, identity)` |
//! | agent binding | `principal`, reverse-indexed by `agent` |
//!
//! Component operations check every precondition before their first write,
//! and writes that must land together (binding replacement) are single calls.

use keystone_core::{
    AccessTierEntry, AgentBinding, Agreement, AgreementId, AgreementUpdate, EntityType,
    Identity, KeystoneError, KeystoneResult, StorageError,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Storage trait for Keystone entities.
/// Implementations persist authority records, tier entries, agreements and
/// agent bindings.
pub trait AuthorityStore: Send + Sync {
    // === Authority Records ===

    /// Whether `caller` holds authority over `resource`.
    fn authority_get(&self, resource: Identity, caller: Identity) -> KeystoneResult<bool>;

    /// Record authority. Re-inserting an existing record is a no-op.
    fn authority_put(&self, resource: Identity, caller: Identity) -> KeystoneResult<()>;

    /// Remove authority, returning whether a record existed.
    fn authority_remove(&self, resource: Identity, caller: Identity) -> KeystoneResult<bool>;

    /// All callers holding authority over `resource`, in identity order.
    fn authority_list_callers(&self, resource: Identity) -> KeystoneResult<Vec<Identity>>;

    // === Tier Entries ===

    fn tier_get(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<AccessTierEntry>>;

    /// Store an entry, replacing any entry for the same pair.
    fn tier_put(&self, entry: &AccessTierEntry) -> KeystoneResult<()>;

    /// Remove and return the entry for a pair.
    fn tier_remove(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<AccessTierEntry>>;

    /// All stored entries for a resource, including lapsed ones.
    fn tier_list_by_resource(&self, resource: Identity) -> KeystoneResult<Vec<AccessTierEntry>>;

    // === Agreements ===

    /// Insert a new agreement. Fails if the id is already taken.
    fn agreement_insert(&self, agreement: &Agreement) -> KeystoneResult<()>;

    fn agreement_get(&self, id: AgreementId) -> KeystoneResult<Option<Agreement>>;

    /// Apply an update. Fails if the agreement does not exist.
    fn agreement_update(&self, id: AgreementId, update: AgreementUpdate) -> KeystoneResult<()>;

    /// Agreements for a pair, oldest first.
    fn agreement_list_by_pair(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Vec<Agreement>>;

    // === Agent Bindings ===

    fn binding_get_by_principal(&self, principal: Identity) -> KeystoneResult<Option<AgentBinding>>;

    fn binding_get_by_agent(&self, agent: Identity) -> KeystoneResult<Option<AgentBinding>>;

    /// Install forward and reverse mappings. Fails if either side is taken.
    fn binding_insert(&self, binding: &AgentBinding) -> KeystoneResult<()>;

    /// Replace the principal's binding: drop the old reverse mapping and
    /// install the new forward and reverse mappings in one step. Returns the
    /// binding that was replaced.
    fn binding_replace(&self, binding: &AgentBinding) -> KeystoneResult<AgentBinding>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct AgreementTable {
    records: HashMap<AgreementId, Agreement>,
    by_pair: HashMap<(Identity, Identity), Vec<AgreementId>>,
}

#[derive(Debug, Default)]
struct BindingTable {
    forward: HashMap<Identity, AgentBinding>,
    reverse: HashMap<Identity, Identity>,
}

/// In-memory store used by tests and single-process deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    authorities: Arc<RwLock<HashMap<Identity, BTreeSet<Identity>>>>,
    tiers: Arc<RwLock<HashMap<(Identity, Identity), AccessTierEntry>>>,
    agreements: Arc<RwLock<AgreementTable>>,
    bindings: Arc<RwLock<BindingTable>>,
}

fn read<T>(lock: &RwLock<T>) -> KeystoneResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| KeystoneError::Storage(StorageError::LockPoisoned))
}

fn write<T>(lock: &RwLock<T>) -> KeystoneResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| KeystoneError::Storage(StorageError::LockPoisoned))
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored authority records.
    pub fn authority_count(&self) -> usize {
        self.authorities
            .read()
            .map(|a| a.values().map(BTreeSet::len).sum())
            .unwrap_or(0)
    }

    /// Get count of stored tier entries (lapsed entries included).
    pub fn tier_count(&self) -> usize {
        self.tiers.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Get count of stored agreements.
    pub fn agreement_count(&self) -> usize {
        self.agreements.read().map(|a| a.records.len()).unwrap_or(0)
    }

    /// Get count of stored bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.read().map(|b| b.forward.len()).unwrap_or(0)
    }
}

impl AuthorityStore for InMemoryStore {
    // === Authority Records ===

    fn authority_get(&self, resource: Identity, caller: Identity) -> KeystoneResult<bool> {
        let authorities = read(&self.authorities)?;
        Ok(authorities
            .get(&resource)
            .is_some_and(|callers| callers.contains(&caller)))
    }

    fn authority_put(&self, resource: Identity, caller: Identity) -> KeystoneResult<()> {
        let mut authorities = write(&self.authorities)?;
        authorities.entry(resource).or_default().insert(caller);
        Ok(())
    }

    fn authority_remove(&self, resource: Identity, caller: Identity) -> KeystoneResult<bool> {
        let mut authorities = write(&self.authorities)?;
        let Some(callers) = authorities.get_mut(&resource) else {
            return Ok(false);
        };
        let existed = callers.remove(&caller);
        if callers.is_empty() {
            authorities.remove(&resource);
        }
        Ok(existed)
    }

    fn authority_list_callers(&self, resource: Identity) -> KeystoneResult<Vec<Identity>> {
        let authorities = read(&self.authorities)?;
        Ok(authorities
            .get(&resource)
            .map(|callers| callers.iter().copied().collect())
            .unwrap_or_default())
    }

    // === Tier Entries ===

    fn tier_get(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<AccessTierEntry>> {
        let tiers = read(&self.tiers)?;
        Ok(tiers.get(&(resource, identity)).cloned())
    }

    fn tier_put(&self, entry: &AccessTierEntry) -> KeystoneResult<()> {
        let mut tiers = write(&self.tiers)?;
        tiers.insert((entry.resource, entry.identity), entry.clone());
        Ok(())
    }

    fn tier_remove(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<AccessTierEntry>> {
        let mut tiers = write(&self.tiers)?;
        Ok(tiers.remove(&(resource, identity)))
    }

    fn tier_list_by_resource(&self, resource: Identity) -> KeystoneResult<Vec<AccessTierEntry>> {
        let tiers = read(&self.tiers)?;
        let mut entries: Vec<AccessTierEntry> = tiers
            .values()
            .filter(|e| e.resource == resource)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.identity);
        Ok(entries)
    }

    // === Agreements ===

    fn agreement_insert(&self, agreement: &Agreement) -> KeystoneResult<()> {
        let mut table = write(&self.agreements)?;
        if table.records.contains_key(&agreement.agreement_id) {
            return Err(KeystoneError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Agreement,
                reason: "already exists".to_string(),
            }));
        }
        table
            .by_pair
            .entry((agreement.resource, agreement.identity))
            .or_default()
            .push(agreement.agreement_id);
        table
            .records
            .insert(agreement.agreement_id, agreement.clone());
        Ok(())
    }

    fn agreement_get(&self, id: AgreementId) -> KeystoneResult<Option<Agreement>> {
        let table = read(&self.agreements)?;
        Ok(table.records.get(&id).cloned())
    }

    fn agreement_update(&self, id: AgreementId, update: AgreementUpdate) -> KeystoneResult<()> {
        let mut table = write(&self.agreements)?;
        let agreement = table.records.get_mut(&id).ok_or_else(|| {
            KeystoneError::Storage(StorageError::NotFound {
                entity_type: EntityType::Agreement,
                key: id.to_string(),
            })
        })?;

        if let Some(status) = update.status {
            if status != agreement.status && !agreement.status.can_transition_to(status) {
                return Err(KeystoneError::Storage(StorageError::UpdateFailed {
                    entity_type: EntityType::Agreement,
                    key: id.to_string(),
                    reason: format!("illegal transition {} -> {}", agreement.status, status),
                }));
            }
            agreement.status = status;
        }
        if let Some(expires_at) = update.expires_at {
            agreement.expires_at = expires_at;
        }
        if let Some(renewed_at) = update.renewed_at {
            agreement.renewed_at = Some(renewed_at);
        }
        if let Some(revoked_at) = update.revoked_at {
            agreement.revoked_at = Some(revoked_at);
        }

        Ok(())
    }

    fn agreement_list_by_pair(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Vec<Agreement>> {
        let table = read(&self.agreements)?;
        Ok(table
            .by_pair
            .get(&(resource, identity))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| table.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    // === Agent Bindings ===

    fn binding_get_by_principal(
        &self,
        principal: Identity,
    ) -> KeystoneResult<Option<AgentBinding>> {
        let table = read(&self.bindings)?;
        Ok(table.forward.get(&principal).cloned())
    }

    fn binding_get_by_agent(&self, agent: Identity) -> KeystoneResult<Option<AgentBinding>> {
        let table = read(&self.bindings)?;
        Ok(table
            .reverse
            .get(&agent)
            .and_then(|principal| table.forward.get(principal))
            .cloned())
    }

    fn binding_insert(&self, binding: &AgentBinding) -> KeystoneResult<()> {
        let mut table = write(&self.bindings)?;
        if table.forward.contains_key(&binding.principal) {
            return Err(KeystoneError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::AgentBinding,
                reason: format!("principal {} already bound", binding.principal),
            }));
        }
        if table.reverse.contains_key(&binding.agent) {
            return Err(KeystoneError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::AgentBinding,
                reason: format!("agent {} already assigned", binding.agent),
            }));
        }
        table.reverse.insert(binding.agent, binding.principal);
        table.forward.insert(binding.principal, binding.clone());
        Ok(())
    }

    fn binding_replace(&self, binding: &AgentBinding) -> KeystoneResult<AgentBinding> {
        let mut table = write(&self.bindings)?;
        let previous = table.forward.get(&binding.principal).cloned().ok_or_else(|| {
            KeystoneError::Storage(StorageError::NotFound {
                entity_type: EntityType::AgentBinding,
                key: binding.principal.to_string(),
            })
        })?;
        if let Some(owner) = table.reverse.get(&binding.agent) {
            if *owner != binding.principal {
                return Err(KeystoneError::Storage(StorageError::UpdateFailed {
                    entity_type: EntityType::AgentBinding,
                    key: binding.principal.to_string(),
                    reason: format!("agent {} already assigned to {}", binding.agent, owner),
                }));
            }
        }
        table.reverse.remove(&previous.agent);
        table.reverse.insert(binding.agent, binding.principal);
        table.forward.insert(binding.principal, binding.clone());
        Ok(previous)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use keystone_core::{AccessTier, AgreementStatus};
    use uuid::Uuid;

    fn id(n: u64) -> Identity {
        Identity::from_u64(n)
    }

    fn make_agreement(resource: Identity, identity: Identity) -> Agreement {
        let now = Utc::now();
        Agreement {
            agreement_id: Uuid::now_v7(),
            resource,
            identity,
            tier: AccessTier::Use,
            started_at: now,
            expires_at: now + Duration::hours(1),
            status: AgreementStatus::Active,
            renewed_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_authority_put_get_remove() {
        let store = InMemoryStore::new();
        assert!(!store.authority_get(id(1), id(2)).unwrap());

        store.authority_put(id(1), id(2)).unwrap();
        store.authority_put(id(1), id(2)).unwrap();
        assert!(store.authority_get(id(1), id(2)).unwrap());
        assert_eq!(store.authority_count(), 1);

        assert!(store.authority_remove(id(1), id(2)).unwrap());
        assert!(!store.authority_remove(id(1), id(2)).unwrap());
        assert!(!store.authority_get(id(1), id(2)).unwrap());
    }

    #[test]
    fn test_authority_is_directional() {
        let store = InMemoryStore::new();
        store.authority_put(id(1), id(2)).unwrap();
        assert!(!store.authority_get(id(2), id(1)).unwrap());
    }

    #[test]
    fn test_authority_list_callers_sorted() {
        let store = InMemoryStore::new();
        store.authority_put(id(1), id(9)).unwrap();
        store.authority_put(id(1), id(3)).unwrap();
        store.authority_put(id(2), id(5)).unwrap();
        assert_eq!(store.authority_list_callers(id(1)).unwrap(), vec![id(3), id(9)]);
    }

    #[test]
    fn test_tier_put_overwrites() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut entry = AccessTierEntry {
            resource: id(1),
            identity: id(2),
            tier: AccessTier::View,
            granted_at: now,
            expires_at: None,
            agreement_id: None,
        };
        store.tier_put(&entry).unwrap();
        entry.tier = AccessTier::FullControl;
        store.tier_put(&entry).unwrap();

        assert_eq!(store.tier_count(), 1);
        let stored = store.tier_get(id(1), id(2)).unwrap().unwrap();
        assert_eq!(stored.tier, AccessTier::FullControl);
        assert_eq!(store.tier_list_by_resource(id(1)).unwrap().len(), 1);
        assert!(store.tier_remove(id(1), id(2)).unwrap().is_some());
        assert!(store.tier_remove(id(1), id(2)).unwrap().is_none());
    }

    #[test]
    fn test_agreement_insert_duplicate() {
        let store = InMemoryStore::new();
        let agreement = make_agreement(id(1), id(2));
        store.agreement_insert(&agreement).unwrap();
        assert!(store.agreement_insert(&agreement).is_err());
    }

    #[test]
    fn test_agreement_list_by_pair_in_insert_order() {
        let store = InMemoryStore::new();
        let first = make_agreement(id(1), id(2));
        let second = make_agreement(id(1), id(2));
        let other = make_agreement(id(1), id(3));
        store.agreement_insert(&first).unwrap();
        store.agreement_insert(&other).unwrap();
        store.agreement_insert(&second).unwrap();

        let listed: Vec<AgreementId> = store
            .agreement_list_by_pair(id(1), id(2))
            .unwrap()
            .into_iter()
            .map(|a| a.agreement_id)
            .collect();
        assert_eq!(listed, vec![first.agreement_id, second.agreement_id]);
    }

    #[test]
    fn test_agreement_update_rejects_reverse_transition() {
        let store = InMemoryStore::new();
        let agreement = make_agreement(id(1), id(2));
        store.agreement_insert(&agreement).unwrap();
        store
            .agreement_update(
                agreement.agreement_id,
                AgreementUpdate {
                    status: Some(AgreementStatus::Revoked),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = store.agreement_update(
            agreement.agreement_id,
            AgreementUpdate {
                status: Some(AgreementStatus::Active),
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(KeystoneError::Storage(StorageError::UpdateFailed { .. }))
        ));
    }

    #[test]
    fn test_agreement_update_not_found() {
        let store = InMemoryStore::new();
        let result = store.agreement_update(Uuid::now_v7(), AgreementUpdate::default());
        assert!(matches!(
            result,
            Err(KeystoneError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_binding_insert_enforces_both_directions() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .binding_insert(&AgentBinding::new(id(1), id(100), now))
            .unwrap();

        assert!(store
            .binding_insert(&AgentBinding::new(id(1), id(101), now))
            .is_err());
        assert!(store
            .binding_insert(&AgentBinding::new(id(2), id(100), now))
            .is_err());
        assert_eq!(store.binding_count(), 1);
    }

    #[test]
    fn test_binding_replace_frees_old_agent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let original = AgentBinding::new(id(1), id(100), now);
        store.binding_insert(&original).unwrap();

        let replaced = store
            .binding_replace(&original.replaced_with(id(200), now))
            .unwrap();
        assert_eq!(replaced.agent, id(100));
        assert!(store.binding_get_by_agent(id(100)).unwrap().is_none());
        assert_eq!(
            store.binding_get_by_agent(id(200)).unwrap().unwrap().principal,
            id(1)
        );
        assert_eq!(
            store.binding_get_by_principal(id(1)).unwrap().unwrap().agent,
            id(200)
        );
    }

    #[test]
    fn test_binding_replace_rejects_taken_agent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .binding_insert(&AgentBinding::new(id(1), id(100), now))
            .unwrap();
        store
            .binding_insert(&AgentBinding::new(id(2), id(200), now))
            .unwrap();

        let result = store.binding_replace(&AgentBinding::new(id(1), id(200), now));
        assert!(result.is_err());
        // nothing moved
        assert_eq!(
            store.binding_get_by_agent(id(100)).unwrap().unwrap().principal,
            id(1)
        );
        assert_eq!(
            store.binding_get_by_agent(id(200)).unwrap().unwrap().principal,
            id(2)
        );
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Authority records behave as a set keyed by (resource, caller).
        #[test]
        fn prop_authority_matches_set_model(
            ops in prop::collection::vec((any::<bool>(), 1u64..5, 1u64..5), 0..40)
        ) {
            let store = InMemoryStore::new();
            let mut model = std::collections::HashSet::new();

            for (grant, resource, caller) in ops {
                let key = (Identity::from_u64(resource), Identity::from_u64(caller));
                if grant {
                    store.authority_put(key.0, key.1).unwrap();
                    model.insert(key);
                } else {
                    let existed = store.authority_remove(key.0, key.1).unwrap();
                    prop_assert_eq!(existed, model.remove(&key));
                }
            }

            for resource in 1u64..5 {
                for caller in 1u64..5 {
                    let key = (Identity::from_u64(resource), Identity::from_u64(caller));
                    prop_assert_eq!(store.authority_get(key.0, key.1).unwrap(), model.contains(&key));
                }
            }
            prop_assert_eq!(store.authority_count(), model.len());
        }
    }
}
