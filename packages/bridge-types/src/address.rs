//! Address types for Chain-A (EVM) and Chain-B (bech32-style) principals.

use std::fmt;

use eyre::{eyre, Result};

/// A 20-byte EVM address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// Parse from a hex string, with or without `0x` prefix.
    ///
    /// Accepts both 20-byte addresses and 32-byte left-padded addresses
    /// (as produced by ABI encoding), matching the shapes adapters hand us.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        match bytes.len() {
            20 => {
                let mut out = [0u8; 20];
                out.copy_from_slice(&bytes);
                Ok(EvmAddress(out))
            }
            32 => {
                if bytes[..12].iter().any(|&b| b != 0) {
                    return Err(eyre!("32-byte address has non-zero padding"));
                }
                let mut out = [0u8; 20];
                out.copy_from_slice(&bytes[12..]);
                Ok(EvmAddress(out))
            }
            n => Err(eyre!("EvmAddress must be 20 or 32 bytes, got {n}")),
        }
    }

    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Case-normalized form used for allow/block list membership tests.
    pub fn normalized(&self) -> String {
        self.as_hex().to_lowercase()
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// A Chain-B principal, addressed bech32-style (e.g. `cosmos1...`).
///
/// Chain-B is treated generically here: the bridge core never needs to
/// decode the payload, only compare and hash it, so this wraps the raw
/// decoded bytes alongside the human-readable prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainBAddress {
    pub hrp: String,
    pub bytes: Vec<u8>,
}

impl ChainBAddress {
    pub fn from_bech32(s: &str) -> Result<Self> {
        let (hrp, data, _variant) =
            bech32::decode(s).map_err(|e| eyre!("invalid bech32 address {s}: {e}"))?;
        let bytes = bech32::convert_bits(&data.iter().map(|u| u.to_u8()).collect::<Vec<_>>(), 5, 8, false)
            .map_err(|e| eyre!("bech32 bit conversion failed: {e}"))?;
        Ok(ChainBAddress { hrp, bytes })
    }

    pub fn to_bech32(&self) -> Result<String> {
        use bech32::ToBase32;
        bech32::encode(&self.hrp, self.bytes.to_base32(), bech32::Variant::Bech32)
            .map_err(|e| eyre!("bech32 encode failed: {e}"))
    }

    pub fn normalized(&self) -> String {
        format!("{}:{}", self.hrp, hex::encode(&self.bytes)).to_lowercase()
    }
}

impl fmt::Display for ChainBAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bech32() {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{}:{}", self.hrp, hex::encode(&self.bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_round_trips_20_byte_hex() {
        let a = EvmAddress::from_hex("0x000102030405060708090a0b0c0d0e0f10111213").unwrap();
        assert_eq!(a.as_hex(), "0x000102030405060708090a0b0c0d0e0f10111213");
    }

    #[test]
    fn evm_address_accepts_32_byte_padded() {
        let padded = format!("0x{}{}", "00".repeat(12), "ff".repeat(20));
        let a = EvmAddress::from_hex(&padded).unwrap();
        assert_eq!(a.as_bytes(), &[0xffu8; 20]);
    }

    #[test]
    fn evm_address_rejects_bad_padding() {
        let padded = format!("0x{}{}", "01".repeat(12), "ff".repeat(20));
        assert!(EvmAddress::from_hex(&padded).is_err());
    }

    #[test]
    fn evm_address_rejects_wrong_length() {
        assert!(EvmAddress::from_hex("0xabcd").is_err());
    }
}
