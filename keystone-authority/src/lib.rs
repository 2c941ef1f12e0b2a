//! Keystone Authority - Root Authorization Service
//!
//! `MasterAuthority` records which callers may mutate which resources and is
//! the only place permission checks are answered. The tier registry, the
//! agreement ledger and the agent binding registry all ask it before writing.
//!
//! `Environment` bundles the store, event sink, clock and configuration that
//! components of one deployment share.

mod environment;
mod master;

pub use environment::Environment;
pub use master::MasterAuthority;

// Re-export core types for convenience
pub use keystone_core::{AuthorityError, AuthorizationMode, Identity};
