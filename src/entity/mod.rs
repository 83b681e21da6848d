//! Registry / factory / proxy pattern shared by every entity kind
//!
//! - [`EntityRegistry`]: source of truth and authorization
//! - [`EntityFactory`]: proxy creation and implementation versions
//! - [`EntityProxy`]: per-instance storage and call delegation
//!
//! [`EntityStack`] wires one of each together for a kind.

pub mod builtin;
pub mod factory;
pub mod kind;
pub mod lifecycle;
pub mod logic;
pub mod proxy;
pub mod record;
pub mod registry;
pub mod stack;

#[cfg(test)]
pub(crate) mod testing;

pub use builtin::MetadataLogic;
pub use factory::{CreationRequest, EntityFactory};
pub use kind::{EntityKind, VersionPolicy};
pub use lifecycle::{EntityStatus, NameReusePolicy, RemovalReceipt};
pub use logic::{
    CallContext, CallRequest, EntityInit, EntityLogic, FunctionSpec, Implementation, Mutability,
    ProxyStorage,
};
pub use proxy::{Dispatch, EntityProxy, UpgradeState, VersionSelector};
pub use record::EntityRecord;
pub use registry::{EntityRegistry, RegistrationRequest, RegistryConfig};
pub use stack::EntityStack;
