//! Vector addresses and their authority attestations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{abi, Address, Hash, RecoverableSignature, Token};
use crate::error::{EntityError, Result};

/// Coordinate in the shared addressing space
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorAddress {
    pub x: String,
    pub y: String,
    pub z: String,
    pub t: u64,
    pub p: u64,
    pub p_sub: u64,
}

impl VectorAddress {
    pub fn new(
        x: impl Into<String>,
        y: impl Into<String>,
        z: impl Into<String>,
        t: u64,
        p: u64,
        p_sub: u64,
    ) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            z: z.into(),
            t,
            p,
            p_sub,
        }
    }

    /// Order-sensitive concatenation of all six fields
    pub fn key_string(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.x, self.y, self.z, self.t, self.p, self.p_sub
        )
    }

    /// All components empty or zero
    pub fn is_zero(&self) -> bool {
        self.x.is_empty()
            && self.y.is_empty()
            && self.z.is_empty()
            && self.t == 0
            && self.p == 0
            && self.p_sub == 0
    }

    /// Reject coordinates with empty spatial components
    pub fn validate(&self) -> Result<()> {
        if self.x.is_empty() || self.y.is_empty() || self.z.is_empty() {
            return Err(EntityError::InvalidVector(format!(
                "empty spatial component in {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for VectorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, t={}, p={}, p_sub={})",
            self.x, self.y, self.z, self.t, self.p, self.p_sub
        )
    }
}

/// Uniqueness key: keccak of the concatenated fields
pub fn derive_key(vector: &VectorAddress) -> Hash {
    Hash::keccak(vector.key_string().as_bytes())
}

/// Digest the vector authority signs: `keccak(abi.encode(key, registrar))`
pub fn attestation_digest(key: &str, registrar: &Address) -> Hash {
    abi::encode_and_hash(&[Token::String(key), Token::Address(*registrar)])
}

/// Check that `authority` signed the (key, registrar) pair
pub fn verify_attestation(
    key: &str,
    registrar: &Address,
    signature: &RecoverableSignature,
    authority: &Address,
) -> bool {
    signature.verify(&attestation_digest(key, registrar), authority)
}

/// A vector claim presented at registration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorAttestation {
    pub vector: VectorAddress,
    /// Authority signature over (key string, registrar)
    pub signature: RecoverableSignature,
}

impl VectorAttestation {
    pub fn new(vector: VectorAddress, signature: RecoverableSignature) -> Self {
        Self { vector, signature }
    }

    /// Validate the coordinate and the authority signature for `registrar`
    pub fn check(&self, registrar: &Address, authority: &Address) -> Result<Hash> {
        self.vector.validate()?;
        let key = self.vector.key_string();
        if !verify_attestation(&key, registrar, &self.signature, authority) {
            return Err(EntityError::InvalidAttestation { key });
        }
        Ok(derive_key(&self.vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn vector() -> VectorAddress {
        VectorAddress::new("100", "200", "300", 0, 1, 0)
    }

    #[test]
    fn test_key_is_order_sensitive() {
        let a = VectorAddress::new("1", "2", "3", 0, 0, 0);
        let b = VectorAddress::new("3", "2", "1", 0, 0, 0);
        assert_eq!(a.key_string(), "123000");
        assert_ne!(derive_key(&a), derive_key(&b));
        assert_eq!(derive_key(&a), derive_key(&a.clone()));
    }

    #[test]
    fn test_attestation_roundtrip() {
        let authority = Keypair::generate();
        let registrar = Address([5u8; 20]);
        let key = vector().key_string();
        let signature = authority
            .sign_digest(&attestation_digest(&key, &registrar))
            .unwrap();

        assert!(verify_attestation(&key, &registrar, &signature, &authority.address()));

        let attestation = VectorAttestation::new(vector(), signature);
        assert_eq!(
            attestation.check(&registrar, &authority.address()).unwrap(),
            derive_key(&vector())
        );
    }

    #[test]
    fn test_attestation_bound_to_registrar_and_key() {
        let authority = Keypair::generate();
        let registrar = Address([5u8; 20]);
        let key = vector().key_string();
        let signature = authority
            .sign_digest(&attestation_digest(&key, &registrar))
            .unwrap();

        assert!(!verify_attestation(&key, &Address([6u8; 20]), &signature, &authority.address()));

        // flip one bit in the key string
        let mut mutated = key.clone().into_bytes();
        mutated[0] ^= 0x01;
        let mutated = String::from_utf8(mutated).unwrap();
        assert!(!verify_attestation(&mutated, &registrar, &signature, &authority.address()));
    }

    #[test]
    fn test_wrong_authority_rejected() {
        let authority = Keypair::generate();
        let impostor = Keypair::generate();
        let registrar = Address([5u8; 20]);
        let signature = impostor
            .sign_digest(&attestation_digest(&vector().key_string(), &registrar))
            .unwrap();

        let attestation = VectorAttestation::new(vector(), signature);
        assert!(matches!(
            attestation.check(&registrar, &authority.address()),
            Err(EntityError::InvalidAttestation { .. })
        ));
    }

    #[test]
    fn test_empty_component_rejected() {
        let v = VectorAddress::new("", "1", "1", 0, 0, 0);
        assert!(matches!(v.validate(), Err(EntityError::InvalidVector(_))));
        assert!(!v.is_zero());
        assert!(VectorAddress::new("", "", "", 0, 0, 0).is_zero());
    }
}
