//! Access tiers and per-identity tier entries.
//!
//! Tiers are ordinal privilege levels from 1 (view only) to 7 (full control).
//! A higher tier satisfies every requirement at or below its own level.
//!
//! Entries carry an optional expiry that is evaluated lazily: an entry whose
//! `expires_at` has been reached is treated as absent by every read, while the
//! stored record stays untouched until it is overwritten or revoked.

use crate::{AgreementId, Identity, TierError, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ACCESS TIER ENUM
// ============================================================================

/// Ordered access tier, 1 (lowest) to 7 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum AccessTier {
    /// Read-only access
    View = 1,
    /// May use the resource
    Use = 2,
    /// May resell access to the resource
    Resell = 3,
    /// May create replicas of the resource
    Replicate = 4,
    /// May edit the resource's data
    EditData = 5,
    /// May edit the resource itself
    EditModel = 6,
    /// Full control over the resource
    FullControl = 7,
}

impl AccessTier {
    pub const MIN_LEVEL: u8 = 1;
    pub const MAX_LEVEL: u8 = 7;

    /// All tiers in ascending order.
    pub const ALL: [AccessTier; 7] = [
        AccessTier::View,
        AccessTier::Use,
        AccessTier::Resell,
        AccessTier::Replicate,
        AccessTier::EditData,
        AccessTier::EditModel,
        AccessTier::FullControl,
    ];

    /// Parse a raw tier level.
    pub fn from_level(level: u8) -> Result<Self, TierError> {
        match level {
            1 => Ok(AccessTier::View),
            2 => Ok(AccessTier::Use),
            3 => Ok(AccessTier::Resell),
            4 => Ok(AccessTier::Replicate),
            5 => Ok(AccessTier::EditData),
            6 => Ok(AccessTier::EditModel),
            7 => Ok(AccessTier::FullControl),
            value => Err(TierError::InvalidTier { value }),
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Whether this tier meets `required`.
    pub fn satisfies(self, required: AccessTier) -> bool {
        self >= required
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AccessTier::View => "View",
            AccessTier::Use => "Use",
            AccessTier::Resell => "Resell",
            AccessTier::Replicate => "Replicate",
            AccessTier::EditData => "EditData",
            AccessTier::EditModel => "EditModel",
            AccessTier::FullControl => "FullControl",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AccessTierParseError> {
        match s.to_lowercase().as_str() {
            "view" => Ok(AccessTier::View),
            "use" => Ok(AccessTier::Use),
            "resell" => Ok(AccessTier::Resell),
            "replicate" => Ok(AccessTier::Replicate),
            "editdata" | "edit_data" => Ok(AccessTier::EditData),
            "editmodel" | "edit_model" => Ok(AccessTier::EditModel),
            "fullcontrol" | "full_control" => Ok(AccessTier::FullControl),
            _ => Err(AccessTierParseError(s.to_string())),
        }
    }
}

impl TryFrom<u8> for AccessTier {
    type Error = TierError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level)
    }
}

impl From<AccessTier> for u8 {
    fn from(tier: AccessTier) -> u8 {
        tier.level()
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AccessTier {
    type Err = AccessTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid tier name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTierParseError(pub String);

impl fmt::Display for AccessTierParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid access tier: {}", self.0)
    }
}

impl std::error::Error for AccessTierParseError {}

// ============================================================================
// TIER ENTRY
// ============================================================================

/// A tier assignment for one identity over one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AccessTierEntry {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub resource: Identity,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub identity: Identity,
    pub tier: AccessTier,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub granted_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub expires_at: Option<Timestamp>,
    /// Agreement created alongside a timed grant
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub agreement_id: Option<AgreementId>,
}

impl AccessTierEntry {
    /// Whether the entry has lapsed at `now`. Entries without expiry never lapse.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// The tier in force at `now`, if any.
    pub fn effective_tier(&self, now: Timestamp) -> Option<AccessTier> {
        if self.is_expired(now) {
            None
        } else {
            Some(self.tier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_entry(expires_in: Option<Duration>) -> (AccessTierEntry, Timestamp) {
        let now = Utc::now();
        let entry = AccessTierEntry {
            resource: Identity::from_u64(1),
            identity: Identity::from_u64(2),
            tier: AccessTier::EditData,
            granted_at: now,
            expires_at: expires_in.map(|d| now + d),
            agreement_id: None,
        };
        (entry, now)
    }

    #[test]
    fn test_level_roundtrip() {
        for tier in AccessTier::ALL {
            assert_eq!(AccessTier::from_level(tier.level()).unwrap(), tier);
        }
    }

    #[test]
    fn test_out_of_range_levels_rejected() {
        assert_eq!(
            AccessTier::from_level(0),
            Err(TierError::InvalidTier { value: 0 })
        );
        assert_eq!(
            AccessTier::from_level(8),
            Err(TierError::InvalidTier { value: 8 })
        );
    }

    #[test]
    fn test_full_control_satisfies_everything() {
        for required in AccessTier::ALL {
            assert!(AccessTier::FullControl.satisfies(required));
        }
        assert!(!AccessTier::View.satisfies(AccessTier::Use));
    }

    #[test]
    fn test_db_str_roundtrip() {
        for tier in AccessTier::ALL {
            assert_eq!(AccessTier::from_db_str(tier.as_db_str()).unwrap(), tier);
        }
        assert!(AccessTier::from_db_str("owner").is_err());
    }

    #[test]
    fn test_serde_as_level() {
        assert_eq!(serde_json::to_string(&AccessTier::Resell).unwrap(), "3");
        assert!(serde_json::from_str::<AccessTier>("0").is_err());
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let (entry, now) = make_entry(Some(Duration::seconds(10)));
        assert_eq!(entry.effective_tier(now), Some(AccessTier::EditData));
        assert_eq!(
            entry.effective_tier(now + Duration::seconds(9)),
            Some(AccessTier::EditData)
        );
        assert_eq!(entry.effective_tier(now + Duration::seconds(10)), None);
    }

    #[test]
    fn test_entry_without_expiry_never_lapses() {
        let (entry, now) = make_entry(None);
        assert!(!entry.is_expired(now + Duration::days(36500)));
    }
}
