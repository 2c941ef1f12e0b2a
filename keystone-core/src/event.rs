//! Structured events emitted by every successful mutation.
//!
//! Events are consumed by off-chain indexers and UIs. Each variant records the
//! operation kind, the identities involved, and the outcome data of the call.

use crate::{AccessTier, AgreementId, AgreementStatus, Identity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an operation was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AuthorizationMode {
    /// The invoker held a prior grant over the resource
    Administered,
    /// The invoker acted on its own identity; always permitted
    SelfSovereign,
}

impl AuthorizationMode {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AuthorizationMode::Administered => "Administered",
            AuthorizationMode::SelfSovereign => "SelfSovereign",
        }
    }
}

impl fmt::Display for AuthorizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Event kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AccessGranted,
    AccessRevoked,
    TierGranted,
    TierRevoked,
    AgreementCreated,
    AgreementRenewed,
    AgreementRevoked,
    AgreementSettled,
    AgentRegistered,
    AgentUpdated,
}

/// A state change recorded by the access-control core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessEvent {
    AccessGranted {
        resource: Identity,
        caller: Identity,
        invoker: Identity,
        mode: AuthorizationMode,
    },
    AccessRevoked {
        resource: Identity,
        caller: Identity,
        invoker: Identity,
        mode: AuthorizationMode,
        /// Whether a grant was actually present
        existed: bool,
    },
    TierGranted {
        resource: Identity,
        identity: Identity,
        tier: AccessTier,
        invoker: Identity,
        expires_at: Option<Timestamp>,
        agreement_id: Option<AgreementId>,
    },
    TierRevoked {
        resource: Identity,
        identity: Identity,
        invoker: Identity,
        existed: bool,
    },
    AgreementCreated {
        agreement_id: AgreementId,
        resource: Identity,
        identity: Identity,
        tier: AccessTier,
        expires_at: Timestamp,
    },
    AgreementRenewed {
        agreement_id: AgreementId,
        invoker: Identity,
        expires_at: Timestamp,
    },
    AgreementRevoked {
        agreement_id: AgreementId,
        invoker: Identity,
    },
    AgreementSettled {
        agreement_id: AgreementId,
        status: AgreementStatus,
    },
    AgentRegistered {
        principal: Identity,
        agent: Identity,
        invoker: Identity,
        mode: AuthorizationMode,
    },
    AgentUpdated {
        principal: Identity,
        old_agent: Identity,
        new_agent: Identity,
        invoker: Identity,
        mode: AuthorizationMode,
    },
}

impl AccessEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AccessEvent::AccessGranted { .. } => EventKind::AccessGranted,
            AccessEvent::AccessRevoked { .. } => EventKind::AccessRevoked,
            AccessEvent::TierGranted { .. } => EventKind::TierGranted,
            AccessEvent::TierRevoked { .. } => EventKind::TierRevoked,
            AccessEvent::AgreementCreated { .. } => EventKind::AgreementCreated,
            AccessEvent::AgreementRenewed { .. } => EventKind::AgreementRenewed,
            AccessEvent::AgreementRevoked { .. } => EventKind::AgreementRevoked,
            AccessEvent::AgreementSettled { .. } => EventKind::AgreementSettled,
            AccessEvent::AgentRegistered { .. } => EventKind::AgentRegistered,
            AccessEvent::AgentUpdated { .. } => EventKind::AgentUpdated,
        }
    }

    /// Serialize for export to an indexer.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
