//! Master authority: the root of trust for "who may mutate resource X".
//!
//! Two authorization modes exist:
//!
//! - [`AuthorizationMode::Administered`]: `grant_access`/`revoke_access`
//!   require the invoker to already hold authority over the resource, or to
//!   hold authority over the master itself (root).
//! - [`AuthorizationMode::SelfSovereign`]: `grant_self_access`/
//!   `revoke_self_access` always operate on the invoker's own identity and are
//!   never gated. Any identity may add or remove any other identity's
//!   authority over itself.

use crate::Environment;
use keystone_core::{
    AccessEvent, AuthorityError, AuthorizationMode, Identity, KeystoneError, KeystoneResult,
};

/// Root authorization service.
#[derive(Debug)]
pub struct MasterAuthority {
    id: Identity,
    env: Environment,
}

impl MasterAuthority {
    /// Deploy the master under identity `id`, making `deployer` root.
    ///
    /// Fails with [`AuthorityError::AlreadyDeployed`] when `id` already has
    /// authority holders in the store; use [`MasterAuthority::attach`] to
    /// open an existing master.
    pub fn bootstrap(id: Identity, deployer: Identity, env: Environment) -> KeystoneResult<Self> {
        id.require_non_zero("master")?;
        deployer.require_non_zero("deployer")?;

        let master = Self { id, env };
        master.claim(id, deployer)?;
        tracing::debug!(master = %id, deployer = %deployer, "master authority bootstrapped");
        master.env.emit(AccessEvent::AccessGranted {
            resource: id,
            caller: deployer,
            invoker: deployer,
            mode: AuthorizationMode::SelfSovereign,
        });
        Ok(master)
    }

    /// Open a master already deployed under `id`. Nothing is written.
    pub fn attach(id: Identity, env: Environment) -> KeystoneResult<Self> {
        id.require_non_zero("master")?;
        Ok(Self { id, env })
    }

    /// First-time deployment of a service under `service`: `deployer`
    /// becomes its initial manager. Fails with
    /// [`AuthorityError::AlreadyDeployed`] when the service already has
    /// managers, leaving them untouched.
    pub fn deploy_service(&self, service: Identity, deployer: Identity) -> KeystoneResult<()> {
        service.require_non_zero("resource")?;
        deployer.require_non_zero("caller")?;

        self.claim(service, deployer)?;
        tracing::debug!(%service, %deployer, "service deployed");
        self.env.emit(AccessEvent::AccessGranted {
            resource: service,
            caller: deployer,
            invoker: service,
            mode: AuthorizationMode::SelfSovereign,
        });
        Ok(())
    }

    /// The master's own identity. Authority over it is root authority.
    pub fn id(&self) -> Identity {
        self.id
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    // === Administered grants ===

    /// Grant `caller` authority over `resource`. Idempotent.
    pub fn grant_access(
        &self,
        invoker: Identity,
        resource: Identity,
        caller: Identity,
    ) -> KeystoneResult<()> {
        resource.require_non_zero("resource")?;
        caller.require_non_zero("caller")?;

        {
            let _guard = self.env.serialize()?;
            self.require_administrator(invoker, resource)?;
            self.env.store().authority_put(resource, caller)?;
        }

        tracing::debug!(%resource, %caller, %invoker, "access granted");
        self.env.emit(AccessEvent::AccessGranted {
            resource,
            caller,
            invoker,
            mode: AuthorizationMode::Administered,
        });
        Ok(())
    }

    /// Revoke `caller`'s authority over `resource`. Revoking an absent grant
    /// succeeds.
    pub fn revoke_access(
        &self,
        invoker: Identity,
        resource: Identity,
        caller: Identity,
    ) -> KeystoneResult<()> {
        resource.require_non_zero("resource")?;
        caller.require_non_zero("caller")?;

        let existed = {
            let _guard = self.env.serialize()?;
            self.require_administrator(invoker, resource)?;
            self.env.store().authority_remove(resource, caller)?
        };

        tracing::debug!(%resource, %caller, %invoker, existed, "access revoked");
        self.env.emit(AccessEvent::AccessRevoked {
            resource,
            caller,
            invoker,
            mode: AuthorizationMode::Administered,
            existed,
        });
        Ok(())
    }

    // === Self-sovereign grants ===

    /// Grant `identity` authority over the invoker itself.
    pub fn grant_self_access(&self, invoker: Identity, identity: Identity) -> KeystoneResult<()> {
        invoker.require_non_zero("resource")?;
        identity.require_non_zero("caller")?;

        {
            let _guard = self.env.serialize()?;
            self.env.store().authority_put(invoker, identity)?;
        }

        tracing::debug!(resource = %invoker, caller = %identity, "self access granted");
        self.env.emit(AccessEvent::AccessGranted {
            resource: invoker,
            caller: identity,
            invoker,
            mode: AuthorizationMode::SelfSovereign,
        });
        Ok(())
    }

    /// Remove `identity`'s authority over the invoker itself.
    pub fn revoke_self_access(&self, invoker: Identity, identity: Identity) -> KeystoneResult<()> {
        invoker.require_non_zero("resource")?;
        identity.require_non_zero("caller")?;

        let existed = {
            let _guard = self.env.serialize()?;
            self.env.store().authority_remove(invoker, identity)?
        };

        tracing::debug!(resource = %invoker, caller = %identity, existed, "self access revoked");
        self.env.emit(AccessEvent::AccessRevoked {
            resource: invoker,
            caller: identity,
            invoker,
            mode: AuthorizationMode::SelfSovereign,
            existed,
        });
        Ok(())
    }

    // === Checks ===

    /// Whether `caller` holds authority over `resource`. Never fails: a store
    /// failure reads as no access.
    pub fn has_access(&self, resource: Identity, caller: Identity) -> bool {
        match self.env.store().authority_get(resource, caller) {
            Ok(granted) => granted,
            Err(e) => {
                tracing::error!(%resource, %caller, error = %e, "authority lookup failed");
                false
            }
        }
    }

    /// Check invoked by a resource about access to itself.
    pub fn self_check_access(&self, invoking_resource: Identity, caller: Identity) -> bool {
        self.has_access(invoking_resource, caller)
    }

    /// Whether `caller` is root (holds authority over the master).
    pub fn is_root(&self, caller: Identity) -> bool {
        self.has_access(self.id, caller)
    }

    /// Callers holding authority over `resource`.
    pub fn callers_of(&self, resource: Identity) -> KeystoneResult<Vec<Identity>> {
        self.env.store().authority_list_callers(resource)
    }

    /// Authorization used by services built on the master: `invoker` may act
    /// on `resource` through `service` when it holds authority over the
    /// resource directly or over the service itself.
    pub fn authorize_for(
        &self,
        service: Identity,
        invoker: Identity,
        resource: Identity,
    ) -> KeystoneResult<AuthorizationMode> {
        if self.has_access(resource, invoker) || self.self_check_access(service, invoker) {
            return Ok(AuthorizationMode::Administered);
        }
        tracing::warn!(%service, %invoker, %resource, "unauthorized service call");
        Err(unauthorized(invoker, resource))
    }

    /// Authorization for acting on behalf of a principal: the principal
    /// itself is always allowed, anyone else needs authority over it.
    pub fn authorize_principal(
        &self,
        invoker: Identity,
        principal: Identity,
    ) -> KeystoneResult<AuthorizationMode> {
        if invoker == principal {
            return Ok(AuthorizationMode::SelfSovereign);
        }
        if self.has_access(principal, invoker) {
            return Ok(AuthorizationMode::Administered);
        }
        tracing::warn!(%invoker, %principal, "unauthorized call on behalf of principal");
        Err(unauthorized(invoker, principal))
    }

    fn claim(&self, resource: Identity, holder: Identity) -> KeystoneResult<()> {
        let _guard = self.env.serialize()?;
        if !self.env.store().authority_list_callers(resource)?.is_empty() {
            tracing::warn!(%resource, %holder, "refusing to redeploy resource with holders");
            return Err(KeystoneError::Authority(AuthorityError::AlreadyDeployed { resource }));
        }
        self.env.store().authority_put(resource, holder)
    }

    fn require_administrator(&self, invoker: Identity, resource: Identity) -> KeystoneResult<()> {
        if self.has_access(resource, invoker) || self.is_root(invoker) {
            return Ok(());
        }
        tracing::warn!(%invoker, %resource, "unauthorized access administration");
        Err(unauthorized(invoker, resource))
    }
}

fn unauthorized(invoker: Identity, resource: Identity) -> KeystoneError {
    KeystoneError::Authority(AuthorityError::Unauthorized { invoker, resource })
}

// ============================================================================
// TESTS
// ============================================================================
