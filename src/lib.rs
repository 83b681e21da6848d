//! # Entity Governance
//!
//! Governance and lifecycle layer for a family of on-chain entities
//! (Worlds, Companies, Avatars, Experiences, Registrars, fungible and
//! non-fungible Assets, Portals).
//!
//! ## Components
//! - Registry: source of truth and authorization per entity kind
//! - Factory: proxy creation and monotonic implementation versions
//! - Proxy: per-instance storage, delegating calls to implementation code
//! - Core extension registry: selector routing for pluggable logic
//! - Vector addresses and signed registration terms
//! - Lapse / grace / removal lifecycle with configurable name reuse

pub mod access;
pub mod clock;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod events;
pub mod extensions;
pub mod vector;

// Re-exports
pub use access::{AccessControl, AdminSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{Address, Hash, Keypair, RecoverableSignature};
pub use entity::{
    CallContext, CallRequest, Dispatch, EntityFactory, EntityKind, EntityLogic, EntityProxy,
    EntityRecord, EntityRegistry, EntityStack, EntityStatus, FunctionSpec, Implementation,
    MetadataLogic, Mutability, NameReusePolicy, RegistrationRequest, RegistryConfig,
    RemovalReceipt, VersionPolicy, VersionSelector,
};
pub use error::{EntityError, Result};
pub use events::{Event, EventLog, EventLogConfig};
pub use extensions::{CoreExtensionRegistry, Extension, ExtensionMetadata, Selector};
pub use vector::{RegistrationTerms, SignedTerms, VectorAddress, VectorAttestation};

/// Crate version
pub const GOVERNANCE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Grace period for registrations that carry no terms
pub const DEFAULT_GRACE_PERIOD_DAYS: u64 = 30;

/// Event log entries kept in memory
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

/// Longest entity name, in characters
pub const MAX_NAME_LENGTH: usize = 64;
