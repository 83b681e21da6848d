//! Registration terms and their off-chain signatures

use serde::{Deserialize, Serialize};

use crate::crypto::{abi, Address, Hash, RecoverableSignature, Token};
use crate::error::{EntityError, Result};
use crate::SECONDS_PER_DAY;

/// Paid registration lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationTerms {
    /// Fee due at registration or renewal
    pub fee: u128,
    /// Days the registration stays active without renewal (0 = no expiry)
    pub coverage_period_days: u64,
    /// Days after expiry during which the entity is lapsed but resolvable
    pub grace_period_days: u64,
}

impl RegistrationTerms {
    pub fn new(fee: u128, coverage_period_days: u64, grace_period_days: u64) -> Self {
        Self {
            fee,
            coverage_period_days,
            grace_period_days,
        }
    }

    pub fn coverage_seconds(&self) -> u64 {
        self.coverage_period_days.saturating_mul(SECONDS_PER_DAY)
    }

    pub fn grace_seconds(&self) -> u64 {
        self.grace_period_days.saturating_mul(SECONDS_PER_DAY)
    }

    /// Coverage end for a registration starting at `start`
    pub fn expires_at(&self, start: u64) -> Option<u64> {
        if self.coverage_period_days == 0 {
            None
        } else {
            Some(start.saturating_add(self.coverage_seconds()))
        }
    }
}

/// Digest the terms signer signs:
/// `keccak(abi.encode(fee, coverage, grace, owner, expiration))`
pub fn terms_digest(terms: &RegistrationTerms, owner: &Address, expiration: u64) -> Hash {
    abi::encode_and_hash(&[
        Token::Uint(terms.fee),
        Token::Uint(terms.coverage_period_days as u128),
        Token::Uint(terms.grace_period_days as u128),
        Token::Address(*owner),
        Token::Uint(expiration as u128),
    ])
}

/// Check that `signer` signed the terms tuple
///
/// This only covers the signature; callers must also enforce the expiration.
pub fn verify_terms(
    terms: &RegistrationTerms,
    owner: &Address,
    expiration: u64,
    signature: &RecoverableSignature,
    signer: &Address,
) -> bool {
    signature.verify(&terms_digest(terms, owner, expiration), signer)
}

/// Terms as presented by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTerms {
    pub terms: RegistrationTerms,
    /// Party the terms were issued to
    pub owner: Address,
    /// Last timestamp at which the terms may be used
    pub expiration: u64,
    pub signature: RecoverableSignature,
}

impl SignedTerms {
    /// Expiration first, then signature
    pub fn check(&self, now: u64, signer: &Address) -> Result<()> {
        if now > self.expiration {
            return Err(EntityError::ExpiredTerms {
                expiration: self.expiration,
                now,
            });
        }
        if !verify_terms(
            &self.terms,
            &self.owner,
            self.expiration,
            &self.signature,
            signer,
        ) {
            return Err(EntityError::InvalidTermsSignature {
                expected_signer: *signer,
            });
        }
        Ok(())
    }
}
