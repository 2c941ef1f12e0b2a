//! Fuzz target for binding signature verification
//!
//! Feeds arbitrary bytes as a signature over an arbitrary principal/agent
//! pair. Verification must never panic and must classify the input as a
//! length error, a signature error, or (practically never) a match.
//!
//! Run with: cargo +nightly fuzz run signature_fuzz -- -max_total_time=60

#![no_main]

use keystone_agents::{recover_signer, verify_binding, BindingError, SIGNATURE_LEN};
use keystone_core::Identity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 41 {
        return;
    }
    let raw = data[0] & 1 == 1;
    let mut principal = [0u8; 20];
    principal.copy_from_slice(&data[1..21]);
    let mut agent = [0u8; 20];
    agent.copy_from_slice(&data[21..41]);
    let (principal, agent) = (Identity::from_bytes(principal), Identity::from_bytes(agent));
    let signature = &data[41..];

    match verify_binding(principal, agent, signature, raw) {
        Ok(()) => assert_eq!(signature.len(), SIGNATURE_LEN),
        Err(BindingError::InvalidSignatureLength { len }) => {
            assert_ne!(len, SIGNATURE_LEN);
            assert_eq!(len, signature.len());
        }
        Err(BindingError::InvalidSignature { agent: reported }) => {
            assert_eq!(reported, agent);
            assert_eq!(signature.len(), SIGNATURE_LEN);
        }
        Err(other) => panic!("unexpected verification error: {:?}", other),
    }

    // recovery over an arbitrary digest is total as well
    let mut digest = [0u8; 32];
    digest[..20].copy_from_slice(principal.as_bytes());
    let _ = recover_signer(&digest, signature, raw);
});
