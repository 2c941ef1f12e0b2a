//! Binding proofs: the canonical message, its digest, and signer recovery.
//!
//! An agent proves consent to a binding by signing
//! `"I authorize {principal} as the owner of agent wallet {agent}"` as a
//! personal message: Keccak-256 over the `"\x19Ethereum Signed Message:\n"`
//! prefix, the decimal message length and the message. The signature is
//! `r || s || v` with `v` in `{27, 28}` (or `{0, 1}` when raw recovery ids
//! are accepted). An identity is the last 20 bytes of the Keccak-256 hash of
//! the uncompressed public key without its `0x04` tag.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use keystone_core::{BindingError, Identity};
use sha3::{Digest, Keccak256};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

pub fn binding_message(principal: Identity, agent: Identity) -> String {
    format!("I authorize {principal} as the owner of agent wallet {agent}")
}

/// Personal-message digest of `message`.
pub fn binding_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

pub fn identity_from_verifying_key(key: &VerifyingKey) -> Identity {
    let encoded = key.to_encoded_point(false);
    let digest: [u8; 32] = Keccak256::digest(&encoded.as_bytes()[1..]).into();
    Identity::from_digest_tail(&digest)
}

/// Recover the signer of `digest`. `None` when the signature is malformed or
/// does not recover to a key.
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &[u8],
    accept_raw_recovery_ids: bool,
) -> Option<Identity> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let recovery_byte = match signature[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) if accept_raw_recovery_ids => v,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)?;
    let signature = Signature::from_slice(&signature[..64]).ok()?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id).ok()?;
    Some(identity_from_verifying_key(&key))
}

/// Check that `signature` is `agent`'s consent to be bound to `principal`.
pub fn verify_binding(
    principal: Identity,
    agent: Identity,
    signature: &[u8],
    accept_raw_recovery_ids: bool,
) -> Result<(), BindingError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(BindingError::InvalidSignatureLength {
            len: signature.len(),
        });
    }
    let digest = binding_digest(&binding_message(principal, agent));
    match recover_signer(&digest, signature, accept_raw_recovery_ids) {
        Some(signer) if signer == agent => Ok(()),
        _ => Err(BindingError::InvalidSignature { agent }),
    }
}

/// Produce `key`'s binding signature for `principal`, with `v` in `{27, 28}`.
pub fn sign_binding(key: &SigningKey, principal: Identity) -> Result<Vec<u8>, BindingError> {
    let agent = identity_from_verifying_key(key.verifying_key());
    let digest = binding_digest(&binding_message(principal, agent));
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| BindingError::InvalidSignature { agent })?;

    let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
    bytes.extend_from_slice(&signature.to_bytes());
    bytes.push(27 + recovery_id.to_byte());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_message_format() {
        let message = binding_message(Identity::from_u64(1), Identity::from_u64(0xab));
        assert_eq!(
            message,
            "I authorize 0x0000000000000000000000000000000000000001 as the owner of agent \
             wallet 0x00000000000000000000000000000000000000ab"
        );
    }

    #[test]
    fn test_digest_matches_known_vector() {
        // personal_sign digest of "hello"
        assert_eq!(
            hex::encode(binding_digest("hello")),
            "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }

    #[test]
    fn test_known_key_address() {
        // private key 0x...01 maps to the well-known address of the generator point
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret).unwrap();
        assert_eq!(
            identity_from_verifying_key(key.verifying_key()).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_then_verify() {
        let key = key(7);
        let agent = identity_from_verifying_key(key.verifying_key());
        let principal = Identity::from_u64(42);
        let signature = sign_binding(&key, principal).unwrap();

        assert_eq!(signature.len(), SIGNATURE_LEN);
        assert!(matches!(signature[64], 27 | 28));
        assert!(verify_binding(principal, agent, &signature, false).is_ok());
    }

    #[test]
    fn test_signature_bound_to_principal() {
        let key = key(7);
        let agent = identity_from_verifying_key(key.verifying_key());
        let signature = sign_binding(&key, Identity::from_u64(42)).unwrap();
        assert_eq!(
            verify_binding(Identity::from_u64(43), agent, &signature, true),
            Err(BindingError::InvalidSignature { agent })
        );
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let principal = Identity::from_u64(42);
        let other = identity_from_verifying_key(key(9).verifying_key());
        let signature = sign_binding(&key(7), principal).unwrap();
        assert_eq!(
            verify_binding(principal, other, &signature, true),
            Err(BindingError::InvalidSignature { agent: other })
        );
    }

    #[test]
    fn test_length_checked_first() {
        let agent = Identity::from_u64(5);
        for len in [0usize, 64, 66] {
            assert_eq!(
                verify_binding(Identity::from_u64(1), agent, &vec![0u8; len], true),
                Err(BindingError::InvalidSignatureLength { len })
            );
        }
    }

    #[test]
    fn test_raw_recovery_ids() {
        let key = key(7);
        let agent = identity_from_verifying_key(key.verifying_key());
        let principal = Identity::from_u64(42);
        let mut signature = sign_binding(&key, principal).unwrap();
        signature[64] -= 27;

        assert!(verify_binding(principal, agent, &signature, true).is_ok());
        assert_eq!(
            verify_binding(principal, agent, &signature, false),
            Err(BindingError::InvalidSignature { agent })
        );
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let agent = Identity::from_u64(5);
        let mut signature = vec![0u8; SIGNATURE_LEN];
        signature[64] = 27;
        assert_eq!(
            verify_binding(Identity::from_u64(1), agent, &signature, true),
            Err(BindingError::InvalidSignature { agent })
        );
        signature[64] = 35;
        assert!(recover_signer(&[0u8; 32], &signature, true).is_none());
    }
}
