//! Account and contract addresses
//!
//! Addresses are 20 bytes, derived as the low 20 bytes of a keccak-256
//! digest. Externally owned accounts hash their uncompressed secp256k1 key;
//! contract-like components (registries, factories, proxies) hash a domain
//! tag plus their construction parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use super::hash::Hash;

/// Address size in bytes
pub const ADDRESS_SIZE: usize = 20;

/// 20-byte address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// Create from raw bytes
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    /// The zero address
    pub const fn zero() -> Self {
        Address([0u8; ADDRESS_SIZE])
    }

    /// Take the low 20 bytes of a digest
    pub fn from_hash(hash: &Hash) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&hash.as_bytes()[12..]);
        Address(bytes)
    }

    /// Derive a deterministic component address from a domain tag and seed data
    pub fn derive(domain: &[u8], parts: &[&[u8]]) -> Self {
        let mut data: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
        data.push(domain);
        data.extend_from_slice(parts);
        Self::from_hash(&Hash::keccak_multiple(&data))
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Check if address is zero using constant-time comparison
    #[inline]
    pub fn is_zero(&self) -> bool {
        let zero = [0u8; ADDRESS_SIZE];
        self.0.ct_eq(&zero).into()
    }

    /// 0x-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the 0x prefix
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(AddressParseError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Address parsing error
#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid address length: {0} bytes")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let addr = Address::derive(b"test", &[b"seed"]);
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_invalid_length() {
        assert!(matches!(
            Address::from_hex("0x1234"),
            Err(AddressParseError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_derive_is_domain_separated() {
        let a = Address::derive(b"registry", &[b"world"]);
        let b = Address::derive(b"factory", &[b"world"]);
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(Address::zero().is_zero());
    }
}
