//! Tiered access registry.

use crate::AgreementLedger;
use keystone_authority::{Environment, MasterAuthority};
use keystone_core::{AccessEvent, AccessTier, AccessTierEntry, Identity, KeystoneResult};
use std::sync::Arc;

/// Per-resource, per-identity access tiers with optional expiry.
///
/// A caller may manage tiers for a resource when it holds authority over the
/// resource or over the registry's own identity. Tier grants with a duration
/// open a linked agreement in the registry's [`AgreementLedger`].
#[derive(Debug)]
pub struct TieredAccessRegistry {
    id: Identity,
    env: Environment,
    master: Arc<MasterAuthority>,
    agreements: AgreementLedger,
}

impl TieredAccessRegistry {
    /// Deploy the registry under `id`, making `deployer` its manager. Fails
    /// when `id` already has managers; use [`TieredAccessRegistry::attach`]
    /// to reopen it.
    pub fn deploy(
        id: Identity,
        deployer: Identity,
        master: Arc<MasterAuthority>,
    ) -> KeystoneResult<Self> {
        id.require_non_zero("registry")?;
        master.deploy_service(id, deployer)?;
        Self::attach(id, master)
    }

    /// Open a registry already deployed under `id`. Nothing is written.
    pub fn attach(id: Identity, master: Arc<MasterAuthority>) -> KeystoneResult<Self> {
        id.require_non_zero("registry")?;
        let agreements = AgreementLedger::new(id, master.clone())?;
        Ok(Self {
            id,
            env: master.environment().clone(),
            master,
            agreements,
        })
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    /// Ledger holding the agreements opened by timed tier grants.
    pub fn agreements(&self) -> &AgreementLedger {
        &self.agreements
    }

    // === Mutations ===

    /// Assign `tier` to `identity` over `resource`, replacing any existing
    /// entry. With `duration_secs` the entry expires and a linked agreement is
    /// opened; an effectively active agreement for the pair blocks the grant.
    pub fn grant_tier(
        &self,
        invoker: Identity,
        resource: Identity,
        identity: Identity,
        tier: u8,
        duration_secs: Option<u64>,
    ) -> KeystoneResult<AccessTierEntry> {
        resource.require_non_zero("resource")?;
        identity.require_non_zero("identity")?;

        let _guard = self.env.serialize()?;
        self.master.authorize_for(self.id, invoker, resource)?;
        let tier = AccessTier::from_level(tier)?;
        let now = self.env.now();

        let (expires_at, agreement_id) = match duration_secs {
            None => (None, None),
            Some(secs) => {
                let expires_at = self.agreements.expiry_after(now, secs)?;
                let lapsed = self.agreements.ensure_no_active(resource, identity, now)?;
                let agreement =
                    self.agreements
                        .open(resource, identity, tier, now, expires_at, &lapsed)?;
                (Some(expires_at), Some(agreement.agreement_id))
            }
        };

        let entry = AccessTierEntry {
            resource,
            identity,
            tier,
            granted_at: now,
            expires_at,
            agreement_id,
        };
        self.env.store().tier_put(&entry)?;

        tracing::debug!(%resource, %identity, %tier, %invoker, ?expires_at, "tier granted");
        self.env.emit(AccessEvent::TierGranted {
            resource,
            identity,
            tier,
            invoker,
            expires_at,
            agreement_id,
        });
        Ok(entry)
    }

    /// Remove the tier entry for a pair. Removing an absent entry succeeds.
    /// Agreements opened by the grant are left to their own lifecycle.
    pub fn revoke_tier(
        &self,
        invoker: Identity,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<()> {
        resource.require_non_zero("resource")?;
        identity.require_non_zero("identity")?;

        let _guard = self.env.serialize()?;
        self.master.authorize_for(self.id, invoker, resource)?;
        let existed = self.env.store().tier_remove(resource, identity)?.is_some();

        tracing::debug!(%resource, %identity, %invoker, existed, "tier revoked");
        self.env.emit(AccessEvent::TierRevoked {
            resource,
            identity,
            invoker,
            existed,
        });
        Ok(())
    }

    // === Reads ===

    /// The effective tier, or `None` when absent or expired.
    pub fn get_tier(&self, resource: Identity, identity: Identity) -> Option<AccessTier> {
        match self.env.store().tier_get(resource, identity) {
            Ok(entry) => entry.and_then(|e| e.effective_tier(self.env.now())),
            Err(e) => {
                tracing::error!(%resource, %identity, error = %e, "tier lookup failed");
                None
            }
        }
    }

    pub fn has_minimum_tier(
        &self,
        resource: Identity,
        identity: Identity,
        required: AccessTier,
    ) -> bool {
        self.get_tier(resource, identity)
            .is_some_and(|tier| tier.satisfies(required))
    }

    /// The stored entry, expired or not.
    pub fn get_entry(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<AccessTierEntry>> {
        self.env.store().tier_get(resource, identity)
    }

    /// Entries for `resource` that are currently in effect.
    pub fn list_tiers(&self, resource: Identity) -> KeystoneResult<Vec<AccessTierEntry>> {
        let now = self.env.now();
        let mut entries: Vec<_> = self
            .env
            .store()
            .tier_list_by_resource(resource)?
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .collect();
        entries.sort_by_key(|e| e.identity);
        Ok(entries)
    }
}

// ============================================================================
// TESTS
// ============================================================================
