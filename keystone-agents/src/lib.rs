//! Keystone Agents - Principal/Agent Bindings
//!
//! [`AgentBindingRegistry`] keeps a bijection between principals and the
//! agent identities acting for them. An agent consents to a binding by
//! signing the canonical binding message; see [`signature`] for the message,
//! digest and recovery rules.

mod registry;
pub mod signature;

pub use registry::AgentBindingRegistry;
pub use signature::{
    binding_digest, binding_message, identity_from_verifying_key, recover_signer,
    sign_binding, verify_binding, SIGNATURE_LEN,
};

// Re-export core types for convenience
pub use keystone_core::{AgentBinding, BindingError};
