//! Event taxonomy consumed by off-chain observers
//!
//! Components append events to a shared [`EventLog`]. Each entry is
//! hash-chained to its predecessor so an indexer can detect gaps or
//! tampering when it replays the log.

pub mod log;

pub use log::{ChainVerifyError, EventLog, EventLogConfig, EventRecord};

use serde::{Deserialize, Serialize};

use crate::crypto::{Address, Hash};
use crate::extensions::Selector;
use crate::vector::VectorAddress;

/// Governance event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A new entity was registered
    EntityRegistered {
        entity: Address,
        name: String,
        owner: Address,
        vector: Option<VectorAddress>,
    },
    /// An entity moved to a new implementation
    EntityUpgraded {
        entity: Address,
        old: Address,
        new: Address,
    },
    /// Entity ownership changed hands
    ControlChanged {
        entity: Address,
        old_owner: Address,
        new_owner: Address,
    },
    /// Coverage re-affirmed under fresh terms
    EntityRenewed {
        entity: Address,
        expires_at: Option<u64>,
    },
    /// Entity entered its grace period
    EntityLapsed { entity: Address, grace_until: u64 },
    /// Entity reached the terminal removed state
    EntityRemoved { entity: Address },
    /// Selector routed to an extension implementation
    ExtensionAdded {
        selector: Selector,
        implementation: Address,
    },
    /// Selector route dropped
    ExtensionRemoved {
        selector: Selector,
        implementation: Address,
    },
    /// Implementation recorded for a version
    ImplementationSet { version: u64, implementation: Address },
    /// Proxy shell used for future instances changed
    ProxyImplementationSet { implementation: Address },
    /// Factory bound to its sole minting registry
    RegistryBound { registry: Address },
    /// Factory binding cleared
    RegistryUnbound { registry: Address },
    AdminAdded { admin: Address },
    AdminRemoved { admin: Address },
    MainAdminTransferred { old: Address, new: Address },
}

impl Event {
    /// Short event name
    pub fn name(&self) -> &'static str {
        match self {
            Event::EntityRegistered { .. } => "EntityRegistered",
            Event::EntityUpgraded { .. } => "EntityUpgraded",
            Event::ControlChanged { .. } => "ControlChanged",
            Event::EntityRenewed { .. } => "EntityRenewed",
            Event::EntityLapsed { .. } => "EntityLapsed",
            Event::EntityRemoved { .. } => "EntityRemoved",
            Event::ExtensionAdded { .. } => "ExtensionAdded",
            Event::ExtensionRemoved { .. } => "ExtensionRemoved",
            Event::ImplementationSet { .. } => "ImplementationSet",
            Event::ProxyImplementationSet { .. } => "ProxyImplementationSet",
            Event::RegistryBound { .. } => "RegistryBound",
            Event::RegistryUnbound { .. } => "RegistryUnbound",
            Event::AdminAdded { .. } => "AdminAdded",
            Event::AdminRemoved { .. } => "AdminRemoved",
            Event::MainAdminTransferred { .. } => "MainAdminTransferred",
        }
    }

    /// Entity the event is about, if any
    pub fn entity(&self) -> Option<Address> {
        match self {
            Event::EntityRegistered { entity, .. }
            | Event::EntityUpgraded { entity, .. }
            | Event::ControlChanged { entity, .. }
            | Event::EntityRenewed { entity, .. }
            | Event::EntityLapsed { entity, .. }
            | Event::EntityRemoved { entity } => Some(*entity),
            _ => None,
        }
    }

    /// Digest of the canonical event encoding
    pub fn digest(&self) -> Hash {
        Hash::keccak(&bincode::serialize(self).unwrap_or_default())
    }
}
