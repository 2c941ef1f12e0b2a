//! Agreement records and status lifecycle.
//!
//! # State Transition Diagram
//!
//! ```text
//! create() → Active ──┬── revoke() ──→ Revoked (terminal)
//!                     └── settle() ──→ Expired (terminal, only once expires_at has passed)
//! ```
//!
//! Passive expiry never rewrites the stored status. `is_effectively_active`
//! answers from timestamps alone; only `settle` records `Expired`.

use crate::{AccessTier, AgreementId, Identity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AGREEMENT STATUS ENUM
// ============================================================================

/// Stored status of an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AgreementStatus {
    /// Agreement is in force (subject to its expiry timestamp)
    Active,
    /// Agreement lapsed and was settled
    Expired,
    /// Agreement was revoked by an authorized caller
    Revoked,
}

impl AgreementStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgreementStatus::Active => "Active",
            AgreementStatus::Expired => "Expired",
            AgreementStatus::Revoked => "Revoked",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgreementStatusParseError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AgreementStatus::Active),
            "expired" => Ok(AgreementStatus::Expired),
            "revoked" => Ok(AgreementStatus::Revoked),
            _ => Err(AgreementStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgreementStatus::Expired | AgreementStatus::Revoked)
    }

    /// Whether moving from `self` to `next` is permitted.
    pub fn can_transition_to(&self, next: AgreementStatus) -> bool {
        matches!(
            (self, next),
            (AgreementStatus::Active, AgreementStatus::Expired)
                | (AgreementStatus::Active, AgreementStatus::Revoked)
        )
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgreementStatus {
    type Err = AgreementStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agreement status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementStatusParseError(pub String);

impl fmt::Display for AgreementStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agreement status: {}", self.0)
    }
}

impl std::error::Error for AgreementStatusParseError {}

// ============================================================================
// AGREEMENT RECORD
// ============================================================================

/// A time-bounded service agreement over a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Agreement {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agreement_id: AgreementId,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub resource: Identity,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub identity: Identity,
    pub tier: AccessTier,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub started_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: Timestamp,
    pub status: AgreementStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub renewed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub revoked_at: Option<Timestamp>,
}

impl Agreement {
    /// Active in storage and not yet past `expires_at`.
    pub fn is_effectively_active(&self, now: Timestamp) -> bool {
        self.status == AgreementStatus::Active && now <= self.expires_at
    }

    /// Recorded as active but already past `expires_at`.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        self.status == AgreementStatus::Active && now > self.expires_at
    }

    /// Status a reader should observe at `now`.
    pub fn effective_status(&self, now: Timestamp) -> AgreementStatus {
        if self.has_lapsed(now) {
            AgreementStatus::Expired
        } else {
            self.status
        }
    }
}

/// Update payload for agreements.
#[derive(Debug, Clone, Default)]
pub struct AgreementUpdate {
    /// New status
    pub status: Option<AgreementStatus>,
    /// New expiry
    pub expires_at: Option<Timestamp>,
    /// Renewal timestamp
    pub renewed_at: Option<Timestamp>,
    /// Revocation timestamp
    pub revoked_at: Option<Timestamp>,
}
