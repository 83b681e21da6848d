//! Error taxonomy shared by every governance component
//!
//! Every failed state transition surfaces exactly one of these variants to the
//! caller. Nothing is retried internally and no partial record is persisted.

use crate::crypto::{Address, SignatureError};
use crate::entity::EntityStatus;
use crate::extensions::Selector;

/// Governance errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("caller {caller} lacks the {required} role")]
    UnauthorizedCaller { caller: Address, required: &'static str },

    #[error("name '{0}' is already registered to an active entity")]
    DuplicateName(String),

    #[error("vector key {0} is already claimed in this registry")]
    VectorCollision(String),

    #[error("vector attestation for {key} was not signed by the vector authority")]
    InvalidAttestation { key: String },

    #[error("terms expired at {expiration}, current time {now}")]
    ExpiredTerms { expiration: u64, now: u64 },

    #[error("terms were not signed by {expected_signer}")]
    InvalidTermsSignature { expected_signer: Address },

    #[error("selector {selector} already routed to {existing}, refusing {attempted}")]
    SelectorConflict {
        selector: Selector,
        existing: Address,
        attempted: Address,
    },

    #[error("no implementation for selector {0}")]
    UnsupportedOperation(Selector),

    #[error("admin {0} is protected and cannot be removed")]
    ProtectedAdmin(Address),

    #[error("factory is already bound to registry {0}")]
    AlreadyBound(Address),

    #[error("factory has no authorized registry")]
    NotBound,

    #[error("entity {entity} is not active ({status})")]
    NotActive { entity: Address, status: EntityStatus },

    #[error("zero address supplied for {0}")]
    ZeroAddress(&'static str),

    #[error("unknown {what} {address}")]
    NotFound { what: &'static str, address: Address },

    #[error("implementation version {attempted} must exceed current version {current}")]
    NonMonotonicVersion { current: u64, attempted: u64 },

    #[error("no implementation registered for version {0}")]
    NoImplementation(u64),

    #[error("no implementation registered yet")]
    NoLatestImplementation,

    #[error("proxy implementation has not been set")]
    NoProxyImplementation,

    #[error("registration terms are required by this registry")]
    MissingTerms,

    #[error("insufficient fee: required {required}, paid {paid}")]
    InsufficientFee { required: u128, paid: u128 },

    #[error("invalid entity name '{0}'")]
    InvalidName(String),

    #[error("invalid vector address: {0}")]
    InvalidVector(String),

    #[error("invalid upgrade: {0}")]
    InvalidUpgrade(String),

    #[error("entity initialization failed: {0}")]
    InitializationFailed(String),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("execution reverted: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, EntityError>;

impl EntityError {
    /// Shorthand for an unauthorized-caller error
    pub fn unauthorized(caller: Address, required: &'static str) -> Self {
        EntityError::UnauthorizedCaller { caller, required }
    }

    /// Shorthand for a revert raised by entity or extension logic
    pub fn execution(message: impl Into<String>) -> Self {
        EntityError::Execution(message.into())
    }
}
