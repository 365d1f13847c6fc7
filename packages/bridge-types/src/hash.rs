//! Hash primitives used across the bridge.
//!
//! Two distinct hash functions are in play and must not be confused:
//! `keccak256` backs Chain-A signature recovery (ECDSA messages are
//! keccak-hashed before recovery), while `canonical_hash` is the `H`
//! function the Finalization Engine uses over adapter-supplied
//! canonical byte encodings (state roots, tx roots).

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// keccak256, as used for Chain-A message hashing prior to ECDSA recovery.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

/// The finalization engine's declared hash function `H`: SHA-256 over a
/// canonical byte encoding supplied by the adapter.
pub fn canonical_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the transactions root as `H(tx_hash_0 || tx_hash_1 || ...)`.
pub fn transactions_root<'a>(tx_hashes: impl Iterator<Item = &'a [u8; 32]>) -> [u8; 32] {
    let mut buf = Vec::new();
    for h in tx_hashes {
        buf.extend_from_slice(h);
    }
    canonical_hash(&buf)
}

pub fn bytes32_to_hex(b: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_known_vector() {
        // keccak256("hello")
        let h = keccak256(b"hello");
        assert_eq!(
            hex::encode(h),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac"
        );
    }

    #[test]
    fn canonical_hash_known_vector() {
        // sha256("hello")
        let h = canonical_hash(b"hello");
        assert_eq!(
            hex::encode(h),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn transactions_root_is_deterministic_over_order() {
        let a = canonical_hash(b"tx-a");
        let b = canonical_hash(b"tx-b");
        let root1 = transactions_root([a, b].iter());
        let root2 = transactions_root([a, b].iter());
        assert_eq!(root1, root2);
        let root_swapped = transactions_root([b, a].iter());
        assert_ne!(root1, root_swapped);
    }
}
