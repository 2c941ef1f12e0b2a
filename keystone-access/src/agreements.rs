//! Agreement ledger: time-bounded service agreements over a resource.
//!
//! At most one agreement per `(resource, identity)` pair is active at a time.
//! Expiry is lazy: `is_agreement_active` compares timestamps and never writes.
//! The stored status moves to `Expired` only through `settle_agreement`, or
//! when a new agreement for the same pair supersedes a lapsed one.

use keystone_authority::{Environment, MasterAuthority};
use keystone_core::{
    new_agreement_id, seconds, AccessEvent, AccessTier, AccessTierEntry, Agreement,
    AgreementError, AgreementId, AgreementStatus, AgreementUpdate, Identity, KeystoneError,
    KeystoneResult, Timestamp,
};
use std::sync::Arc;

/// Ledger of service agreements.
#[derive(Debug)]
pub struct AgreementLedger {
    id: Identity,
    env: Environment,
    master: Arc<MasterAuthority>,
}

impl AgreementLedger {
    /// Open a ledger acting under service identity `id` without writing
    /// anything. Managers of `id` may administer agreements over any resource.
    pub fn new(id: Identity, master: Arc<MasterAuthority>) -> KeystoneResult<Self> {
        id.require_non_zero("service")?;
        Ok(Self {
            id,
            env: master.environment().clone(),
            master,
        })
    }

    /// Deploy a standalone ledger and make `deployer` its manager. Fails
    /// when `id` already has managers.
    pub fn deploy(
        id: Identity,
        deployer: Identity,
        master: Arc<MasterAuthority>,
    ) -> KeystoneResult<Self> {
        id.require_non_zero("service")?;
        master.deploy_service(id, deployer)?;
        Self::new(id, master)
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    // === Mutations ===

    /// Open an agreement for `identity` over `resource` lasting
    /// `duration_secs` from now.
    pub fn create_agreement(
        &self,
        invoker: Identity,
        resource: Identity,
        identity: Identity,
        tier: u8,
        duration_secs: u64,
    ) -> KeystoneResult<Agreement> {
        resource.require_non_zero("resource")?;
        identity.require_non_zero("identity")?;

        let _guard = self.env.serialize()?;
        self.master.authorize_for(self.id, invoker, resource)?;
        let tier = AccessTier::from_level(tier)?;
        let now = self.env.now();
        let expires_at = self.expiry_after(now, duration_secs)?;

        let lapsed = self.ensure_no_active(resource, identity, now)?;
        self.open(resource, identity, tier, now, expires_at, &lapsed)
    }

    /// Revoke an effectively active agreement. The record is kept. A lapsed
    /// agreement is reported as `Expired` and left as stored.
    pub fn revoke_agreement(
        &self,
        invoker: Identity,
        agreement_id: AgreementId,
    ) -> KeystoneResult<()> {
        let _guard = self.env.serialize()?;
        let agreement = self.require_agreement(agreement_id)?;
        self.master
            .authorize_for(self.id, invoker, agreement.resource)?;

        let now = self.env.now();
        let status = agreement.effective_status(now);
        if status != AgreementStatus::Active {
            return Err(not_active(agreement_id, status));
        }

        self.env.store().agreement_update(
            agreement_id,
            AgreementUpdate {
                status: Some(AgreementStatus::Revoked),
                revoked_at: Some(now),
                ..Default::default()
            },
        )?;

        tracing::debug!(
            %agreement_id,
            %invoker,
            resource = %agreement.resource,
            "agreement revoked"
        );
        self.env.emit(AccessEvent::AgreementRevoked {
            agreement_id,
            invoker,
        });
        Ok(())
    }

    /// Extend an effectively active agreement by `additional_secs`. A tier
    /// entry linked to the agreement is extended with it. Returns the new
    /// expiry, which may lie at most `max_grant_duration_secs` past now.
    pub fn renew_agreement(
        &self,
        invoker: Identity,
        agreement_id: AgreementId,
        additional_secs: u64,
    ) -> KeystoneResult<Timestamp> {
        let _guard = self.env.serialize()?;
        let agreement = self.require_agreement(agreement_id)?;
        self.master
            .authorize_for(self.id, invoker, agreement.resource)?;

        let now = self.env.now();
        if !agreement.is_effectively_active(now) {
            return Err(not_active(agreement_id, agreement.effective_status(now)));
        }
        let expires_at = self.expiry_after(agreement.expires_at, additional_secs)?;
        let max_seconds = self.env.config().max_grant_duration_secs;
        let remaining = (expires_at - now).num_seconds();
        if remaining > max_seconds as i64 {
            return Err(KeystoneError::Agreement(AgreementError::InvalidDuration {
                seconds: remaining.unsigned_abs(),
                max_seconds,
            }));
        }

        let linked = self
            .env
            .store()
            .tier_get(agreement.resource, agreement.identity)?
            .filter(|entry| entry.agreement_id == Some(agreement_id));

        self.env.store().agreement_update(
            agreement_id,
            AgreementUpdate {
                expires_at: Some(expires_at),
                renewed_at: Some(now),
                ..Default::default()
            },
        )?;
        if let Some(entry) = linked {
            self.env.store().tier_put(&AccessTierEntry {
                expires_at: Some(expires_at),
                ..entry
            })?;
        }

        tracing::debug!(%agreement_id, %invoker, %expires_at, "agreement renewed");
        self.env.emit(AccessEvent::AgreementRenewed {
            agreement_id,
            invoker,
            expires_at,
        });
        Ok(expires_at)
    }

    /// Record `Expired` for an agreement whose expiry has passed. Anyone may
    /// call this; it only reconciles stored status with the clock. Returns the
    /// stored status after the call.
    pub fn settle_agreement(&self, agreement_id: AgreementId) -> KeystoneResult<AgreementStatus> {
        let _guard = self.env.serialize()?;
        let agreement = self.require_agreement(agreement_id)?;
        if agreement.has_lapsed(self.env.now()) {
            self.mark_expired(agreement_id)?;
            return Ok(AgreementStatus::Expired);
        }
        Ok(agreement.status)
    }

    // === Reads ===

    /// Active in storage and not past its expiry. Never writes.
    pub fn is_agreement_active(&self, agreement_id: AgreementId) -> bool {
        match self.env.store().agreement_get(agreement_id) {
            Ok(Some(agreement)) => agreement.is_effectively_active(self.env.now()),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(%agreement_id, error = %e, "agreement lookup failed");
                false
            }
        }
    }

    pub fn get_agreement(&self, agreement_id: AgreementId) -> KeystoneResult<Option<Agreement>> {
        self.env.store().agreement_get(agreement_id)
    }

    /// The effectively active agreement for a pair, if any.
    pub fn active_agreement_for(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Option<Agreement>> {
        let now = self.env.now();
        Ok(self
            .env
            .store()
            .agreement_list_by_pair(resource, identity)?
            .into_iter()
            .find(|a| a.is_effectively_active(now)))
    }

    /// Every agreement ever recorded for a pair, oldest first.
    pub fn agreements_for(
        &self,
        resource: Identity,
        identity: Identity,
    ) -> KeystoneResult<Vec<Agreement>> {
        self.env.store().agreement_list_by_pair(resource, identity)
    }

    // === Helpers shared with the tier registry (caller holds the guard) ===

    /// `start` plus `duration_secs`, rejecting zero, over-limit and
    /// unrepresentable durations.
    pub(crate) fn expiry_after(
        &self,
        start: Timestamp,
        duration_secs: u64,
    ) -> KeystoneResult<Timestamp> {
        let max_seconds = self.env.config().max_grant_duration_secs;
        let invalid = || {
            KeystoneError::Agreement(AgreementError::InvalidDuration {
                seconds: duration_secs,
                max_seconds,
            })
        };
        if duration_secs == 0 || duration_secs > max_seconds {
            return Err(invalid());
        }
        start
            .checked_add_signed(seconds(duration_secs))
            .ok_or_else(invalid)
    }

    /// Fail if an effectively active agreement exists for the pair. Returns
    /// stored-active agreements that have lapsed, to be settled on write.
    pub(crate) fn ensure_no_active(
        &self,
        resource: Identity,
        identity: Identity,
        now: Timestamp,
    ) -> KeystoneResult<Vec<AgreementId>> {
        let mut lapsed = Vec::new();
        for agreement in self.env.store().agreement_list_by_pair(resource, identity)? {
            if agreement.is_effectively_active(now) {
                return Err(KeystoneError::Agreement(AgreementError::AgreementExists {
                    resource,
                    identity,
                    existing: agreement.agreement_id,
                }));
            }
            if agreement.has_lapsed(now) {
                lapsed.push(agreement.agreement_id);
            }
        }
        Ok(lapsed)
    }

    /// Settle `lapsed` and insert a new active agreement. All checks must
    /// already have passed.
    pub(crate) fn open(
        &self,
        resource: Identity,
        identity: Identity,
        tier: AccessTier,
        started_at: Timestamp,
        expires_at: Timestamp,
        lapsed: &[AgreementId],
    ) -> KeystoneResult<Agreement> {
        for agreement_id in lapsed {
            self.mark_expired(*agreement_id)?;
        }

        let agreement = Agreement {
            agreement_id: new_agreement_id(),
            resource,
            identity,
            tier,
            started_at,
            expires_at,
            status: AgreementStatus::Active,
            renewed_at: None,
            revoked_at: None,
        };
        self.env.store().agreement_insert(&agreement)?;

        tracing::debug!(
            agreement_id = %agreement.agreement_id,
            %resource,
            %identity,
            %tier,
            %expires_at,
            "agreement created"
        );
        self.env.emit(AccessEvent::AgreementCreated {
            agreement_id: agreement.agreement_id,
            resource,
            identity,
            tier,
            expires_at,
        });
        Ok(agreement)
    }

    fn mark_expired(&self, agreement_id: AgreementId) -> KeystoneResult<()> {
        self.env.store().agreement_update(
            agreement_id,
            AgreementUpdate {
                status: Some(AgreementStatus::Expired),
                ..Default::default()
            },
        )?;
        tracing::debug!(%agreement_id, "agreement settled as expired");
        self.env.emit(AccessEvent::AgreementSettled {
            agreement_id,
            status: AgreementStatus::Expired,
        });
        Ok(())
    }

    fn require_agreement(&self, agreement_id: AgreementId) -> KeystoneResult<Agreement> {
        self.env
            .store()
            .agreement_get(agreement_id)?
            .ok_or(KeystoneError::Agreement(AgreementError::AgreementNotFound {
                agreement_id,
            }))
    }
}

fn not_active(agreement_id: AgreementId, status: AgreementStatus) -> KeystoneError {
    KeystoneError::Agreement(AgreementError::NotActive {
        agreement_id,
        status,
    })
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use keystone_core::{Clock, KeystoneConfig, ManualClock};
    use keystone_events::InMemoryEventLog;
    use keystone_storage::InMemoryStore;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Activity follows the clock: active through expires_at, inactive after.
        #[test]
        fn prop_activity_follows_clock(duration in 1u64..10_000, elapsed in 0i64..20_000) {
            let clock = Arc::new(ManualClock::starting_now());
            let env = Environment::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryEventLog::new()),
                clock.clone(),
                KeystoneConfig::default(),
            ).unwrap();
            let deployer = Identity::from_u64(2);
            let master = Arc::new(MasterAuthority::bootstrap(Identity::from_u64(1), deployer, env).unwrap());
            let ledger = AgreementLedger::deploy(Identity::from_u64(3), deployer, master).unwrap();

            let agreement = ledger
                .create_agreement(deployer, Identity::from_u64(10), Identity::from_u64(11), 1, duration)
                .unwrap();
            clock.advance_secs(elapsed);

            prop_assert_eq!(
                ledger.is_agreement_active(agreement.agreement_id),
                (elapsed as u64) <= duration
            );
        }

        /// No sequence of renewals leaves more than the configured maximum
        /// between now and expiry.
        #[test]
        fn prop_renewals_bounded_by_max_window(
            max in 10u64..1_000,
            renewals in prop::collection::vec((1u64..1_000, 0i64..50), 1..10),
        ) {
            let clock = Arc::new(ManualClock::starting_now());
            let env = Environment::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryEventLog::new()),
                clock.clone(),
                KeystoneConfig { max_grant_duration_secs: max, ..KeystoneConfig::default() },
            ).unwrap();
            let deployer = Identity::from_u64(2);
            let master = Arc::new(MasterAuthority::bootstrap(Identity::from_u64(1), deployer, env).unwrap());
            let ledger = AgreementLedger::deploy(Identity::from_u64(3), deployer, master).unwrap();

            let agreement = ledger
                .create_agreement(deployer, Identity::from_u64(10), Identity::from_u64(11), 1, max)
                .unwrap();
            for (additional, elapsed) in renewals {
                clock.advance_secs(elapsed);
                if let Err(e) = ledger.renew_agreement(deployer, agreement.agreement_id, additional) {
                    prop_assert!(matches!(e, KeystoneError::Agreement(_)));
                }
                let stored = ledger.get_agreement(agreement.agreement_id).unwrap().unwrap();
                prop_assert!((stored.expires_at - clock.now()).num_seconds() <= max as i64);
            }
        }
    }
}
