//! Keystone Access - Tiered Access and Service Agreements
//!
//! [`TieredAccessRegistry`] assigns one of seven ordered access tiers to an
//! identity for a resource, optionally with an expiry. Timed grants open an
//! agreement in the registry's [`AgreementLedger`], which tracks bounded
//! service agreements independently of administrative revocation.
//!
//! Expiry is computed on read. Nothing here runs in the background.

mod agreements;
mod registry;

pub use agreements::AgreementLedger;
pub use registry::TieredAccessRegistry;

// Re-export core types for convenience
pub use keystone_core::{
    AccessTier, AccessTierEntry, Agreement, AgreementError, AgreementId, AgreementStatus,
    TierError,
};
