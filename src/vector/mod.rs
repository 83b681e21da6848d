//! Spatial uniqueness keys and signed registration terms
//!
//! Location-bearing entities claim a [`VectorAddress`]; the claim is only
//! accepted with a vector-authority signature over the concatenated key and
//! the registrar presenting it. Paid registrations carry
//! [`RegistrationTerms`] signed off-chain with an expiration timestamp.

pub mod address;
pub mod terms;

pub use address::{
    attestation_digest, derive_key, verify_attestation, VectorAddress, VectorAttestation,
};
pub use terms::{terms_digest, verify_terms, RegistrationTerms, SignedTerms};
