//! Four-byte function selectors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Hash;

/// First four bytes of `keccak(signature)`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Selector(bytes)
    }

    /// Selector for a canonical signature such as `transfer(address,uint256)`
    pub fn from_signature(signature: &str) -> Self {
        let hash = Hash::keccak(signature.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&hash.as_bytes()[..4]);
        Selector(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
