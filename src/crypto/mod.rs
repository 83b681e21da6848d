//! Cryptographic primitives
//!
//! - keccak-256 hashing
//! - 20-byte addresses derived from keys or construction parameters
//! - secp256k1 recoverable signatures for off-chain attestations
//! - ABI tuple encoding for signed payloads

pub mod abi;
pub mod address;
pub mod hash;
pub mod signature;

pub use abi::Token;
pub use address::{Address, AddressParseError, ADDRESS_SIZE};
pub use hash::Hash;
pub use signature::{Keypair, RecoverableSignature, SignatureError, SIGNATURE_SIZE};
