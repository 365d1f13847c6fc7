//! Signature verification for externally supplied principal signatures.
//!
//! Chain-A uses ECDSA over a keccak-hashed message (secp256k1, with a
//! recovery id), matching how EVM wallets sign arbitrary messages.
//! Chain-B uses plain Ed25519 over the raw message bytes.

use ed25519_dalek::{Signature as EdSignature, Verifier, VerifyingKey};
use eyre::{eyre, Result};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey as K256VerifyingKey};

use crate::address::EvmAddress;
use crate::hash::keccak256;

/// Recovers the Chain-A signer address from a 65-byte `r || s || v` signature
/// over `message`, and checks it matches `claimed` (case-normalized).
pub fn verify_evm_signature(message: &[u8], signature: &[u8], claimed: &EvmAddress) -> Result<bool> {
    if signature.len() != 65 {
        return Err(eyre!("evm signature must be 65 bytes, got {}", signature.len()));
    }
    let (rs, v) = signature.split_at(64);
    let recovery_id = RecoveryId::from_byte(normalize_recovery_byte(v[0]))
        .ok_or_else(|| eyre!("invalid recovery id byte {}", v[0]))?;
    let sig = K256Signature::from_slice(rs).map_err(|e| eyre!("invalid signature bytes: {e}"))?;
    let digest = keccak256(message);
    let recovered = K256VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|e| eyre!("signature recovery failed: {e}"))?;

    let encoded = recovered.to_encoded_point(false);
    let pubkey_bytes = &encoded.as_bytes()[1..]; // drop the 0x04 prefix
    let address_bytes = &keccak256(pubkey_bytes)[12..];
    let mut recovered_addr = [0u8; 20];
    recovered_addr.copy_from_slice(address_bytes);

    Ok(EvmAddress(recovered_addr).normalized() == claimed.normalized())
}

fn normalize_recovery_byte(v: u8) -> u8 {
    // EVM signatures commonly encode v as 27/28 instead of 0/1.
    if v >= 27 {
        v - 27
    } else {
        v
    }
}

/// Verifies a Chain-B Ed25519 signature over the raw message bytes.
pub fn verify_chain_b_signature(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    let key = VerifyingKey::from_bytes(
        public_key
            .try_into()
            .map_err(|_| eyre!("ed25519 public key must be 32 bytes"))?,
    )
    .map_err(|e| eyre!("invalid ed25519 public key: {e}"))?;
    let sig = EdSignature::from_slice(signature).map_err(|e| eyre!("invalid ed25519 signature: {e}"))?;

    Ok(key.verify(message, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn chain_b_signature_round_trips() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        let msg = b"withdraw 100 to principal X";
        let sig: EdSignature = {
            use ed25519_dalek::Signer;
            signing_key.sign(msg)
        };
        assert!(verify_chain_b_signature(msg, &sig.to_bytes(), verifying_key.as_bytes()).unwrap());
    }

    #[test]
    fn chain_b_signature_rejects_tampered_message() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        let sig: EdSignature = {
            use ed25519_dalek::Signer;
            signing_key.sign(b"original")
        };
        assert!(!verify_chain_b_signature(b"tampered", &sig.to_bytes(), verifying_key.as_bytes()).unwrap());
    }
}
