//! Agent binding registry.

use crate::signature::verify_binding;
use keystone_authority::{Environment, MasterAuthority};
use keystone_core::{
    AccessEvent, AgentBinding, AuthorizationMode, BindingError, Identity, KeystoneError,
    KeystoneResult,
};
use std::sync::Arc;

/// One-to-one bindings between principals and the agents acting for them.
///
/// Every binding is backed by the agent's signature over the canonical
/// binding message. A principal may bind or rebind itself; a relayer may do
/// so on a principal's behalf when it holds authority over the principal.
#[derive(Debug)]
pub struct AgentBindingRegistry {
    env: Environment,
    master: Arc<MasterAuthority>,
}

impl AgentBindingRegistry {
    pub fn new(master: Arc<MasterAuthority>) -> Self {
        Self {
            env: master.environment().clone(),
            master,
        }
    }

    // === Mutations ===

    /// Bind `agent` to the invoking principal.
    pub fn register(
        &self,
        principal: Identity,
        signature: &[u8],
        agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        self.bind(principal, principal, signature, agent)
    }

    /// Bind `agent` to `principal` on the principal's behalf.
    pub fn register_for(
        &self,
        relayer: Identity,
        principal: Identity,
        signature: &[u8],
        agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        self.bind(relayer, principal, signature, agent)
    }

    /// Replace the invoking principal's agent with `new_agent`.
    pub fn update(
        &self,
        principal: Identity,
        signature: &[u8],
        new_agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        self.rebind(principal, principal, signature, new_agent)
    }

    pub fn update_for(
        &self,
        relayer: Identity,
        principal: Identity,
        signature: &[u8],
        new_agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        self.rebind(relayer, principal, signature, new_agent)
    }

    fn bind(
        &self,
        invoker: Identity,
        principal: Identity,
        signature: &[u8],
        agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        principal.require_non_zero("principal")?;
        agent.require_non_zero("agent")?;

        let _guard = self.env.serialize()?;
        let mode = self.master.authorize_principal(invoker, principal)?;
        self.verify(principal, agent, signature)?;
        self.ensure_agent_free(principal, agent)?;
        if let Some(existing) = self.env.store().binding_get_by_principal(principal)? {
            return Err(KeystoneError::Binding(BindingError::UserAlreadyBound {
                principal,
                agent: existing.agent,
            }));
        }

        let binding = AgentBinding::new(principal, agent, self.env.now());
        self.env.store().binding_insert(&binding)?;

        tracing::debug!(%principal, %agent, %invoker, %mode, "agent registered");
        self.env.emit(AccessEvent::AgentRegistered {
            principal,
            agent,
            invoker,
            mode,
        });
        Ok(binding)
    }

    fn rebind(
        &self,
        invoker: Identity,
        principal: Identity,
        signature: &[u8],
        new_agent: Identity,
    ) -> KeystoneResult<AgentBinding> {
        principal.require_non_zero("principal")?;
        new_agent.require_non_zero("agent")?;

        let _guard = self.env.serialize()?;
        let mode = self.master.authorize_principal(invoker, principal)?;
        let current = self
            .env
            .store()
            .binding_get_by_principal(principal)?
            .ok_or(KeystoneError::Binding(BindingError::NoExistingBinding {
                principal,
            }))?;
        self.verify(principal, new_agent, signature)?;
        self.ensure_agent_free(principal, new_agent)?;

        let binding = current.replaced_with(new_agent, self.env.now());
        let previous = self.env.store().binding_replace(&binding)?;

        tracing::debug!(
            %principal,
            old_agent = %previous.agent,
            %new_agent,
            %invoker,
            %mode,
            "agent updated"
        );
        self.env.emit(AccessEvent::AgentUpdated {
            principal,
            old_agent: previous.agent,
            new_agent,
            invoker,
            mode,
        });
        Ok(binding)
    }

    fn verify(&self, principal: Identity, agent: Identity, signature: &[u8]) -> KeystoneResult<()> {
        verify_binding(
            principal,
            agent,
            signature,
            self.env.config().accept_raw_recovery_ids,
        )
        .map_err(|e| {
            tracing::warn!(%principal, %agent, error = %e, "binding signature rejected");
            KeystoneError::from(e)
        })
    }

    /// Fail if `agent` already belongs to a principal other than `principal`.
    fn ensure_agent_free(&self, principal: Identity, agent: Identity) -> KeystoneResult<()> {
        match self.env.store().binding_get_by_agent(agent)? {
            Some(owner) if owner.principal != principal => {
                Err(KeystoneError::Binding(BindingError::AgentAlreadyAssigned {
                    agent,
                    principal: owner.principal,
                }))
            }
            _ => Ok(()),
        }
    }

    // === Lookups ===

    /// The principal's agent, or [`Identity::ZERO`].
    pub fn get_agent(&self, principal: Identity) -> Identity {
        match self.env.store().binding_get_by_principal(principal) {
            Ok(binding) => binding.map_or(Identity::ZERO, |b| b.agent),
            Err(e) => {
                tracing::error!(%principal, error = %e, "binding lookup failed");
                Identity::ZERO
            }
        }
    }

    /// The agent's principal, or [`Identity::ZERO`].
    pub fn get_principal(&self, agent: Identity) -> Identity {
        match self.env.store().binding_get_by_agent(agent) {
            Ok(binding) => binding.map_or(Identity::ZERO, |b| b.principal),
            Err(e) => {
                tracing::error!(%agent, error = %e, "binding lookup failed");
                Identity::ZERO
            }
        }
    }

    pub fn has_agent(&self, principal: Identity) -> bool {
        !self.get_agent(principal).is_zero()
    }

    pub fn is_agent_assigned(&self, agent: Identity) -> bool {
        !self.get_principal(agent).is_zero()
    }

    /// Full binding record for a principal.
    pub fn binding(&self, principal: Identity) -> KeystoneResult<Option<AgentBinding>> {
        self.env.store().binding_get_by_principal(principal)
    }
}

// ============================================================================
// TESTS
// ============================================================================
