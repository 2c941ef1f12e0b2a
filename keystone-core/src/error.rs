//! Error types for Keystone operations

use crate::{AgreementId, AgreementStatus, EntityType, Identity};
use thiserror::Error;

/// Authorization errors raised by the master authority.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Unauthorized: {invoker} holds no authority over {resource}")]
    Unauthorized { invoker: Identity, resource: Identity },

    #[error("Invalid identity: {field} must not be the null identity")]
    InvalidIdentity { field: String },

    #[error("Already deployed: {resource} already has authority holders")]
    AlreadyDeployed { resource: Identity },
}

/// Access tier validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("Invalid tier {value}: tiers range from 1 to 7")]
    InvalidTier { value: u8 },
}

/// Agreement lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgreementError {
    #[error("Agreement {existing} is already active for {identity} on {resource}")]
    AgreementExists {
        resource: Identity,
        identity: Identity,
        existing: AgreementId,
    },

    #[error("Agreement {agreement_id} is not active (status: {status})")]
    NotActive {
        agreement_id: AgreementId,
        status: AgreementStatus,
    },

    #[error("Agreement not found: {agreement_id}")]
    AgreementNotFound { agreement_id: AgreementId },

    #[error("Invalid duration of {seconds}s: must be between 1 and {max_seconds}s")]
    InvalidDuration { seconds: u64, max_seconds: u64 },
}

/// Agent binding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("Invalid signature: signer does not match agent {agent}")]
    InvalidSignature { agent: Identity },

    #[error("Invalid signature length: expected 65 bytes, got {len}")]
    InvalidSignatureLength { len: usize },

    #[error("Agent {agent} is already assigned to {principal}")]
    AgentAlreadyAssigned { agent: Identity, principal: Identity },

    #[error("Principal {principal} is already bound to agent {agent}")]
    UserAlreadyBound { principal: Identity, agent: Identity },

    #[error("Principal {principal} has no existing agent binding")]
    NoExistingBinding { principal: Identity },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with key {key}")]
    NotFound { entity_type: EntityType, key: String },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with key {key}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        key: String,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Keystone errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeystoneError {
    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),

    #[error("Tier error: {0}")]
    Tier(#[from] TierError),

    #[error("Agreement error: {0}")]
    Agreement(#[from] AgreementError),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Keystone operations.
pub type KeystoneResult<T> = Result<T, KeystoneError>;

// =============================================================================
// TESTS
// =============================================================================
