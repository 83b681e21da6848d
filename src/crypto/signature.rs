//! secp256k1 recoverable signatures
//!
//! Attestations and terms are signed off-chain over a 32-byte keccak digest
//! and verified by recovering the signer address from the signature. The
//! wire form is the usual 65-byte `r || s || v` layout, with `v` in either
//! the raw `{0, 1}` or the offset `{27, 28}` convention.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use super::address::Address;
use super::hash::Hash;

/// Recoverable signature size in bytes
pub const SIGNATURE_SIZE: usize = 65;

/// Offset applied to the recovery id in the `v` byte
const V_OFFSET: u8 = 27;

/// Signature errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature length: {0} bytes")]
    InvalidLength(usize),

    #[error("invalid recovery byte: {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed signature scalars")]
    Malformed,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("signing failed")]
    SigningFailed,
}

/// 65-byte recoverable ECDSA signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(Vec<u8>);

impl RecoverableSignature {
    /// Wrap raw bytes, checking only the length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Recover the signer address from a 32-byte prehash
    pub fn recover(&self, digest: &Hash) -> Result<Address, SignatureError> {
        // deserialized values skip the length check in `from_bytes`
        if self.0.len() != SIGNATURE_SIZE {
            return Err(SignatureError::InvalidLength(self.0.len()));
        }
        let v = self.0[64];
        let raw = match v {
            0 | 1 => v,
            27 | 28 => v - V_OFFSET,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        let recovery_id =
            RecoveryId::from_byte(raw).ok_or(SignatureError::InvalidRecoveryId(v))?;
        let signature =
            EcdsaSignature::from_slice(&self.0[..64]).map_err(|_| SignatureError::Malformed)?;

        let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
            .map_err(|_| SignatureError::RecoveryFailed)?;
        Ok(address_of(&key))
    }

    /// True iff the signature recovers exactly `expected`
    pub fn verify(&self, digest: &Hash, expected: &Address) -> bool {
        if expected.is_zero() {
            return false;
        }
        matches!(self.recover(digest), Ok(signer) if signer == *expected)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = &self.0[..self.0.len().min(8)];
        write!(f, "RecoverableSignature({}..)", hex::encode(prefix))
    }
}

/// Derive the address of a secp256k1 public key
fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag
    Address::from_hash(&Hash::keccak(&point.as_bytes()[1..]))
}

/// secp256k1 signing keypair
pub struct Keypair {
    secret: SigningKey,
    address: Address,
}

impl Keypair {
    /// Generate new random keypair
    pub fn generate() -> Self {
        let secret = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_of(secret.verifying_key());
        Self { secret, address }
    }

    /// Create keypair from a seed (deterministic)
    ///
    /// The seed is hashed before use so that any 32 bytes map to a scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, SignatureError> {
        let mut scalar = Hash::keccak(seed).0;
        let secret = SigningKey::from_slice(&scalar);
        scalar.zeroize();
        let secret = secret.map_err(|_| SignatureError::InvalidSecretKey)?;
        let address = address_of(secret.verifying_key());
        Ok(Self { secret, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, producing `r || s || v` with `v` in {27, 28}
    pub fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, SignatureError> {
        let (signature, recovery_id) = self
            .secret
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|_| SignatureError::SigningFailed)?;

        let mut bytes = Vec::with_capacity(SIGNATURE_SIZE);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(recovery_id.to_byte() + V_OFFSET);
        Ok(RecoverableSignature(bytes))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
