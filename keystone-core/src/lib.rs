//! Keystone Core - Entity Types
//!
//! Pure data structures shared by every Keystone crate: identities, tiers,
//! agreement and binding records, events, errors and configuration.
//! Behavior that touches storage lives in the component crates.

mod agreement;
mod binding;
mod clock;
mod config;
mod error;
mod event;
mod identity;
mod tier;

pub use agreement::{Agreement, AgreementStatus, AgreementStatusParseError, AgreementUpdate};
pub use binding::AgentBinding;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::KeystoneConfig;
pub use error::{
    AgreementError, AuthorityError, BindingError, ConfigError, KeystoneError, KeystoneResult,
    StorageError, TierError,
};
pub use event::{AccessEvent, AuthorizationMode, EventKind};
pub use identity::{
    new_agreement_id, AgreementId, Identity, IdentityParseError, Timestamp, IDENTITY_LEN,
};
pub use tier::{AccessTier, AccessTierEntry, AccessTierParseError};

use serde::{Deserialize, Serialize};

/// Entity type discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    AuthorityRecord,
    AccessTier,
    Agreement,
    AgentBinding,
}

/// Convert a duration in seconds to a chrono duration.
///
/// Callers validate the bound first; out-of-range values saturate.
pub fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX)
}
