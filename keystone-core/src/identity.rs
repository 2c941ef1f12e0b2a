//! Identity types for Keystone principals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::AuthorityError;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Agreement identifier using UUIDv7 for timestamp-sortable IDs.
pub type AgreementId = Uuid;

/// Generate a new UUIDv7 AgreementId (timestamp-sortable).
pub fn new_agreement_id() -> AgreementId {
    Uuid::now_v7()
}

/// Length of an identity in bytes.
pub const IDENTITY_LEN: usize = 20;

/// Address-like principal identifier.
///
/// Resources, callers, principals and agents are all identities. The all-zero
/// identity is the null identity and is never a valid actor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    /// The null identity.
    pub const ZERO: Identity = Identity([0u8; IDENTITY_LEN]);

    pub const fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Identity(bytes)
    }

    /// Build an identity whose trailing eight bytes hold `value` (big endian).
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes[IDENTITY_LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Identity(bytes)
    }

    /// Take the trailing 20 bytes of a 32-byte digest (address derivation).
    pub fn from_digest_tail(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes.copy_from_slice(&digest[32 - IDENTITY_LEN..]);
        Identity(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; IDENTITY_LEN]
    }

    /// Reject the null identity, naming the offending field.
    pub fn require_non_zero(self, field: &str) -> Result<Self, AuthorityError> {
        if self.is_zero() {
            Err(AuthorityError::InvalidIdentity {
                field: field.to_string(),
            })
        } else {
            Ok(self)
        }
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

/// Error when parsing an invalid identity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityParseError(pub String);

impl fmt::Display for IdentityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid identity: {}", self.0)
    }
}

impl std::error::Error for IdentityParseError {}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let decoded = hex::decode(trimmed).map_err(|_| IdentityParseError(s.to_string()))?;
        let bytes: [u8; IDENTITY_LEN] = decoded
            .try_into()
            .map_err(|_| IdentityParseError(s.to_string()))?;
        Ok(Identity(bytes))
    }
}

impl From<[u8; IDENTITY_LEN]> for Identity {
    fn from(bytes: [u8; IDENTITY_LEN]) -> Self {
        Identity(bytes)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
