//! Core extension registry: selector -> implementation routing
//!
//! One registry is shared by many entity proxies. Extensions describe the
//! selectors they implement; the registry refuses any selector already routed
//! to a different implementation, so an extension can never shadow another's
//! entry points.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Selector;
use crate::access::{AccessControl, AdminSet};
use crate::clock::Clock;
use crate::crypto::Address;
use crate::entity::{CallContext, FunctionSpec};
use crate::error::{EntityError, Result};
use crate::events::{Event, EventLog};

/// Descriptive metadata an extension reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMetadata {
    pub name: String,
    pub version: u32,
}

/// Pluggable logic module executed in an entity's context
pub trait Extension: Send + Sync {
    /// Implementation address the selectors route to
    fn address(&self) -> Address;

    fn metadata(&self) -> ExtensionMetadata;

    /// Functions this extension implements
    fn functions(&self) -> Vec<FunctionSpec>;

    /// Run `selector` against the calling entity's storage
    fn execute(
        &self,
        ctx: &mut CallContext<'_>,
        selector: Selector,
        input: &[u8],
    ) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct RouteTable {
    routes: HashMap<Selector, Address>,
    extensions: HashMap<Address, Arc<dyn Extension>>,
}

/// Central selector routing table
pub struct CoreExtensionRegistry {
    address: Address,
    access: AccessControl,
    table: RwLock<RouteTable>,
    events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
}

impl CoreExtensionRegistry {
    pub fn new(
        address: Address,
        admins: AdminSet,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if address.is_zero() {
            return Err(EntityError::ZeroAddress("extension registry"));
        }
        Ok(Self {
            address,
            access: AccessControl::new(address, admins, events.clone(), clock.clone()),
            table: RwLock::new(RouteTable::default()),
            events,
            clock,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Register every selector an extension implements
    ///
    /// Either all selectors are routed or none are. Re-adding an already
    /// registered implementation only routes its new selectors.
    pub fn add_extension(&self, caller: Address, extension: Arc<dyn Extension>) -> Result<()> {
        self.access.require_admin(caller)?;

        let implementation = extension.address();
        if implementation.is_zero() {
            return Err(EntityError::ZeroAddress("extension"));
        }
        let selectors: BTreeSet<Selector> =
            extension.functions().iter().map(|f| f.selector).collect();
        if selectors.is_empty() {
            return Err(EntityError::execution(format!(
                "extension {} exposes no functions",
                implementation
            )));
        }

        let mut table = self.table.write();
        for selector in &selectors {
            if let Some(existing) = table.routes.get(selector) {
                if *existing != implementation {
                    warn!(
                        "selector {} conflict: {} already routed, refusing {}",
                        selector, existing, implementation
                    );
                    return Err(EntityError::SelectorConflict {
                        selector: *selector,
                        existing: *existing,
                        attempted: implementation,
                    });
                }
            }
        }

        let now = self.clock.now();
        let metadata = extension.metadata();
        table.extensions.insert(implementation, extension);
        for selector in selectors {
            if table.routes.insert(selector, implementation).is_none() {
                self.events.emit(
                    self.address,
                    now,
                    Event::ExtensionAdded {
                        selector,
                        implementation,
                    },
                );
            }
        }

        info!(
            "extension {} v{} registered at {}",
            metadata.name, metadata.version, implementation
        );
        Ok(())
    }

    /// Drop every route to an implementation
    pub fn remove_extension(&self, caller: Address, implementation: Address) -> Result<()> {
        self.access.require_admin(caller)?;

        let mut table = self.table.write();
        if table.extensions.remove(&implementation).is_none() {
            return Err(EntityError::NotFound {
                what: "extension",
                address: implementation,
            });
        }

        let mut removed: Vec<Selector> = table
            .routes
            .iter()
            .filter(|(_, target)| **target == implementation)
            .map(|(selector, _)| *selector)
            .collect();
        removed.sort();

        let now = self.clock.now();
        for selector in removed {
            table.routes.remove(&selector);
            self.events.emit(
                self.address,
                now,
                Event::ExtensionRemoved {
                    selector,
                    implementation,
                },
            );
        }

        info!("extension {} removed", implementation);
        Ok(())
    }

    /// Implementation address for a selector; `None` means unsupported
    pub fn resolve(&self, selector: Selector) -> Option<Address> {
        let resolved = self.table.read().routes.get(&selector).copied();
        debug!("resolve {} -> {:?}", selector, resolved);
        resolved
    }

    /// Executable extension for a selector
    pub fn resolve_extension(&self, selector: Selector) -> Option<Arc<dyn Extension>> {
        let table = self.table.read();
        let implementation = table.routes.get(&selector)?;
        table.extensions.get(implementation).cloned()
    }

    pub fn extension(&self, implementation: &Address) -> Option<Arc<dyn Extension>> {
        self.table.read().extensions.get(implementation).cloned()
    }

    /// Selectors currently routed to an implementation
    pub fn selectors_of(&self, implementation: &Address) -> Vec<Selector> {
        let mut selectors: Vec<Selector> = self
            .table
            .read()
            .routes
            .iter()
            .filter(|(_, target)| *target == implementation)
            .map(|(selector, _)| *selector)
            .collect();
        selectors.sort();
        selectors
    }

    pub fn route_count(&self) -> usize {
        self.table.read().routes.len()
    }
}

impl fmt::Debug for CoreExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreExtensionRegistry")
            .field("address", &self.address)
            .field("routes", &self.route_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entity::Mutability;

    struct FixedExtension {
        address: Address,
        selectors: Vec<Selector>,
    }

    impl Extension for FixedExtension {
        fn address(&self) -> Address {
            self.address
        }

        fn metadata(&self) -> ExtensionMetadata {
            ExtensionMetadata {
                name: "fixed".into(),
                version: 1,
            }
        }

        fn functions(&self) -> Vec<FunctionSpec> {
            self.selectors
                .iter()
                .map(|s| FunctionSpec::new(*s, Mutability::View))
                .collect()
        }

        fn execute(
            &self,
            _ctx: &mut CallContext<'_>,
            _selector: Selector,
            _input: &[u8],
        ) -> Result<Vec<u8>> {
            Ok(self.address.as_bytes().to_vec())
        }
    }

    const ADMIN: Address = Address([1u8; 20]);

    fn registry() -> (CoreExtensionRegistry, Arc<EventLog>) {
        let events = Arc::new(EventLog::new());
        let registry = CoreExtensionRegistry::new(
            Address([0xee; 20]),
            AdminSet::new(ADMIN, &[]).unwrap(),
            events.clone(),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        (registry, events)
    }

    fn extension(byte: u8, selectors: &[[u8; 4]]) -> Arc<dyn Extension> {
        Arc::new(FixedExtension {
            address: Address([byte; 20]),
            selectors: selectors.iter().map(|s| Selector::new(*s)).collect(),
        })
    }

    #[test]
    fn test_shadowing_attempt_rejected() {
        let (registry, _) = registry();
        let a = extension(0xa0, &[[0xaa; 4]]);
        let b = extension(0xb0, &[[0xaa; 4]]);

        registry.add_extension(ADMIN, a).unwrap();
        let result = registry.add_extension(ADMIN, b);

        assert!(matches!(
            result,
            Err(EntityError::SelectorConflict { existing, attempted, .. })
                if existing == Address([0xa0; 20]) && attempted == Address([0xb0; 20])
        ));
        assert_eq!(
            registry.resolve(Selector::new([0xaa; 4])),
            Some(Address([0xa0; 20]))
        );
    }

    #[test]
    fn test_conflict_is_atomic() {
        let (registry, _) = registry();
        registry.add_extension(ADMIN, extension(0xa0, &[[0xaa; 4]])).unwrap();

        // second selector is fresh, first conflicts: nothing may be routed
        let result = registry.add_extension(ADMIN, extension(0xb0, &[[0xbb; 4], [0xaa; 4]]));
        assert!(result.is_err());
        assert_eq!(registry.resolve(Selector::new([0xbb; 4])), None);
        assert!(registry.extension(&Address([0xb0; 20])).is_none());
    }

    #[test]
    fn test_readd_same_implementation_is_idempotent() {
        let (registry, events) = registry();
        registry.add_extension(ADMIN, extension(0xa0, &[[0xaa; 4]])).unwrap();
        registry
            .add_extension(ADMIN, extension(0xa0, &[[0xaa; 4], [0xab; 4]]))
            .unwrap();

        assert_eq!(registry.route_count(), 2);
        assert_eq!(events.by_name("ExtensionAdded").len(), 2);
    }

    #[test]
    fn test_admin_only() {
        let (registry, _) = registry();
        let result = registry.add_extension(Address([9u8; 20]), extension(0xa0, &[[0xaa; 4]]));
        assert!(matches!(result, Err(EntityError::UnauthorizedCaller { .. })));
    }

    #[test]
    fn test_miss_resolves_to_none() {
        let (registry, _) = registry();
        assert_eq!(registry.resolve(Selector::new([0x01, 0x02, 0x03, 0x04])), None);
        assert!(registry.resolve_extension(Selector::new([0x01; 4])).is_none());
    }

    #[test]
    fn test_remove_frees_selectors() {
        let (registry, events) = registry();
        registry
            .add_extension(ADMIN, extension(0xa0, &[[0xaa; 4], [0xab; 4]]))
            .unwrap();
        registry.remove_extension(ADMIN, Address([0xa0; 20])).unwrap();

        assert_eq!(registry.route_count(), 0);
        assert_eq!(events.by_name("ExtensionRemoved").len(), 2);

        // the selector may now be claimed by another implementation
        registry.add_extension(ADMIN, extension(0xb0, &[[0xaa; 4]])).unwrap();
        assert_eq!(
            registry.resolve(Selector::new([0xaa; 4])),
            Some(Address([0xb0; 20]))
        );
        assert!(matches!(
            registry.remove_extension(ADMIN, Address([0xa0; 20])),
            Err(EntityError::NotFound { .. })
        ));
    }

    #[test]
    fn test_selectors_of() {
        let (registry, _) = registry();
        registry
            .add_extension(ADMIN, extension(0xa0, &[[0xab; 4], [0xaa; 4]]))
            .unwrap();
        assert_eq!(
            registry.selectors_of(&Address([0xa0; 20])),
            vec![Selector::new([0xaa; 4]), Selector::new([0xab; 4])]
        );
    }
}
