//! Entity factory: proxy creation and implementation versioning
//!
//! Each factory mints proxies for a single entity kind and only on behalf of
//! the one registry bound to it. Implementation versions form a strictly
//! increasing history; nothing is ever overwritten.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::kind::{EntityKind, VersionPolicy};
use super::logic::{CallContext, EntityInit, Implementation, ProxyStorage};
use super::proxy::{EntityProxy, VersionSelector};
use super::registry::EntityRegistry;
use crate::access::{AccessControl, AdminSet};
use crate::clock::Clock;
use crate::crypto::Address;
use crate::error::{EntityError, Result};
use crate::events::{Event, EventLog};
use crate::extensions::CoreExtensionRegistry;

/// Parameters for a new proxy
#[derive(Debug, Clone, Copy)]
pub struct CreationRequest<'a> {
    pub owner: Address,
    pub name: &'a str,
    pub init_data: &'a [u8],
    pub version_policy: VersionPolicy,
}

#[derive(Default)]
struct FactoryState {
    implementations: BTreeMap<u64, Implementation>,
    proxy_shell: Option<Address>,
    authorized_registry: Option<Address>,
    instances: Vec<Address>,
    nonce: u64,
}

/// Factory for one entity kind
pub struct EntityFactory {
    address: Address,
    kind: EntityKind,
    access: AccessControl,
    state: RwLock<FactoryState>,
    extensions: RwLock<Option<Arc<CoreExtensionRegistry>>>,
    events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
}

impl EntityFactory {
    pub fn new(
        address: Address,
        kind: EntityKind,
        admins: AdminSet,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if address.is_zero() {
            return Err(EntityError::ZeroAddress("factory"));
        }
        Ok(Self {
            address,
            kind,
            access: AccessControl::new(address, admins, events.clone(), clock.clone()),
            state: RwLock::new(FactoryState::default()),
            extensions: RwLock::new(None),
            events,
            clock,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub(crate) fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Admins and the bound registry may manage implementations
    fn require_manager(&self, state: &FactoryState, caller: Address) -> Result<()> {
        if self.access.is_admin(&caller) || state.authorized_registry == Some(caller) {
            Ok(())
        } else {
            Err(EntityError::unauthorized(caller, "factory admin or authorized registry"))
        }
    }

    /// Record implementation code for `version`
    ///
    /// Versions must strictly increase; the first one must be at least 1.
    pub fn set_implementation(
        &self,
        caller: Address,
        implementation: Implementation,
        version: u64,
    ) -> Result<()> {
        let mut state = self.state.write();
        self.require_manager(&state, caller)?;

        let current = state.implementations.keys().next_back().copied().unwrap_or(0);
        if version <= current {
            return Err(EntityError::NonMonotonicVersion {
                current,
                attempted: version,
            });
        }

        let address = implementation.address();
        state.implementations.insert(version, implementation);
        info!("{} factory: implementation v{} at {}", self.kind, version, address);
        self.events.emit(
            self.address,
            self.clock.now(),
            Event::ImplementationSet {
                version,
                implementation: address,
            },
        );
        Ok(())
    }

    /// Set the proxy code stamped into future instances
    pub fn set_proxy_implementation(&self, caller: Address, shell: Address) -> Result<()> {
        if shell.is_zero() {
            return Err(EntityError::ZeroAddress("proxy implementation"));
        }
        let mut state = self.state.write();
        self.require_manager(&state, caller)?;
        state.proxy_shell = Some(shell);

        info!("{} factory: proxy shell {}", self.kind, shell);
        self.events.emit(
            self.address,
            self.clock.now(),
            Event::ProxyImplementationSet {
                implementation: shell,
            },
        );
        Ok(())
    }

    /// Bind the sole registry allowed to create entities
    pub fn set_authorized_registry(&self, caller: Address, registry: Address) -> Result<()> {
        self.access.require_admin(caller)?;
        if registry.is_zero() {
            return Err(EntityError::ZeroAddress("registry"));
        }
        let mut state = self.state.write();
        if let Some(existing) = state.authorized_registry {
            return Err(EntityError::AlreadyBound(existing));
        }
        state.authorized_registry = Some(registry);

        info!("{} factory bound to registry {}", self.kind, registry);
        self.events
            .emit(self.address, self.clock.now(), Event::RegistryBound { registry });
        Ok(())
    }

    /// Unbind the current registry so another may be bound
    pub fn clear_authorized_registry(&self, caller: Address) -> Result<()> {
        self.access.require_admin(caller)?;
        let registry = self
            .state
            .write()
            .authorized_registry
            .take()
            .ok_or(EntityError::NotBound)?;

        info!("{} factory unbound from registry {}", self.kind, registry);
        self.events
            .emit(self.address, self.clock.now(), Event::RegistryUnbound { registry });
        Ok(())
    }

    pub fn authorized_registry(&self) -> Option<Address> {
        self.state.read().authorized_registry
    }

    pub fn proxy_implementation(&self) -> Option<Address> {
        self.state.read().proxy_shell
    }

    /// Extension registry consulted for selectors implementations lack
    pub fn set_extension_registry(
        &self,
        caller: Address,
        registry: Arc<CoreExtensionRegistry>,
    ) -> Result<()> {
        self.access.require_admin(caller)?;
        info!("{} factory: extension registry {}", self.kind, registry.address());
        *self.extensions.write() = Some(registry);
        Ok(())
    }

    pub fn extension_registry(&self) -> Option<Arc<CoreExtensionRegistry>> {
        self.extensions.read().clone()
    }

    /// Implementation a proxy with `selector` runs right now
    pub fn current_implementation(&self, selector: VersionSelector) -> Result<(u64, Implementation)> {
        let state = self.state.read();
        match selector {
            VersionSelector::Latest => state
                .implementations
                .iter()
                .next_back()
                .map(|(version, implementation)| (*version, implementation.clone()))
                .ok_or(EntityError::NoLatestImplementation),
            VersionSelector::Pinned(version) => state
                .implementations
                .get(&version)
                .map(|implementation| (version, implementation.clone()))
                .ok_or(EntityError::NoImplementation(version)),
        }
    }

    pub fn implementation(&self, version: u64) -> Result<Implementation> {
        self.current_implementation(VersionSelector::Pinned(version))
            .map(|(_, implementation)| implementation)
    }

    /// Version under which an implementation address was registered
    pub fn find_version(&self, address: &Address) -> Option<(u64, Implementation)> {
        self.state
            .read()
            .implementations
            .iter()
            .find(|(_, implementation)| implementation.address() == *address)
            .map(|(version, implementation)| (*version, implementation.clone()))
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.state.read().implementations.keys().next_back().copied()
    }

    /// Every (version, implementation) pair, oldest first
    pub fn implementation_history(&self) -> Vec<(u64, Address)> {
        self.state
            .read()
            .implementations
            .iter()
            .map(|(version, implementation)| (*version, implementation.address()))
            .collect()
    }

    /// Proxies created so far, in creation order
    pub fn instances(&self) -> Vec<Address> {
        self.state.read().instances.clone()
    }

    /// Mint and initialize a proxy on behalf of the bound registry
    ///
    /// The proxy address is derived from the factory address and a nonce
    /// that only advances when initialization succeeds.
    pub fn create_entity(
        self: &Arc<Self>,
        caller: Address,
        registry: Weak<EntityRegistry>,
        request: CreationRequest<'_>,
    ) -> Result<Arc<EntityProxy>> {
        let mut state = self.state.write();
        if state.authorized_registry != Some(caller) {
            return Err(EntityError::unauthorized(caller, "authorized registry"));
        }
        let shell = state.proxy_shell.ok_or(EntityError::NoProxyImplementation)?;
        let (version, implementation) = state
            .implementations
            .iter()
            .next_back()
            .map(|(version, implementation)| (*version, implementation.clone()))
            .ok_or(EntityError::NoLatestImplementation)?;

        let address = Address::derive(
            b"entity-proxy",
            &[&self.address.as_bytes()[..], &state.nonce.to_be_bytes()[..]],
        );

        let mut storage = ProxyStorage::new();
        let mut ctx = CallContext {
            entity: address,
            caller,
            owner: request.owner,
            value: 0,
            now: self.clock.now(),
            storage: &mut storage,
        };
        implementation
            .logic()
            .initialize(
                &mut ctx,
                EntityInit {
                    name: request.name,
                    owner: request.owner,
                    data: request.init_data,
                },
            )
            .map_err(|e| EntityError::InitializationFailed(e.to_string()))?;

        let selector = match request.version_policy {
            VersionPolicy::Latest => VersionSelector::Latest,
            VersionPolicy::Pinned => VersionSelector::Pinned(version),
        };
        let proxy = Arc::new(EntityProxy::new(
            address,
            caller,
            registry,
            self.clone(),
            shell,
            selector,
            request.owner,
            storage,
        ));

        state.nonce += 1;
        state.instances.push(address);
        debug!("{} factory: proxy {} created on v{}", self.kind, address, version);
        Ok(proxy)
    }
}

impl fmt::Debug for EntityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFactory")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("latest_version", &self.latest_version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entity::testing::{counter, implementation_address, ADMIN, OWNER};

    fn factory() -> Arc<EntityFactory> {
        Arc::new(
            EntityFactory::new(
                Address([0xfa; 20]),
                EntityKind::Avatar,
                AdminSet::new(ADMIN, &[]).unwrap(),
                Arc::new(EventLog::new()),
                Arc::new(ManualClock::new(1_000)),
            )
            .unwrap(),
        )
    }

    fn request(name: &str) -> CreationRequest<'_> {
        CreationRequest {
            owner: OWNER,
            name,
            init_data: &[],
            version_policy: VersionPolicy::Latest,
        }
    }

    #[test]
    fn test_versions_strictly_increase() {
        let factory = factory();
        factory.set_implementation(ADMIN, counter::implementation(1), 1).unwrap();
        factory.set_implementation(ADMIN, counter::implementation(3), 3).unwrap();

        assert!(matches!(
            factory.set_implementation(ADMIN, counter::implementation(2), 2),
            Err(EntityError::NonMonotonicVersion { current: 3, attempted: 2 })
        ));
        assert!(matches!(
            factory.set_implementation(ADMIN, counter::implementation(4), 3),
            Err(EntityError::NonMonotonicVersion { .. })
        ));
        assert_eq!(
            factory.implementation_history(),
            vec![(1, implementation_address(1)), (3, implementation_address(3))]
        );
        assert_eq!(factory.latest_version(), Some(3));
        assert!(matches!(factory.implementation(2), Err(EntityError::NoImplementation(2))));
    }

    #[test]
    fn test_version_zero_rejected() {
        let factory = factory();
        assert!(matches!(
            factory.set_implementation(ADMIN, counter::implementation(1), 0),
            Err(EntityError::NonMonotonicVersion { current: 0, attempted: 0 })
        ));
    }

    #[test]
    fn test_create_requires_bound_registry() {
        let factory = factory();
        let registry = Address([0x0e; 20]);
        factory.set_implementation(ADMIN, counter::implementation(1), 1).unwrap();
        factory.set_proxy_implementation(ADMIN, Address([0x5e; 20])).unwrap();

        // unbound: nobody may create, admins included
        assert!(matches!(
            factory.create_entity(ADMIN, Weak::new(), request("a")),
            Err(EntityError::UnauthorizedCaller { .. })
        ));

        factory.set_authorized_registry(ADMIN, registry).unwrap();
        assert!(matches!(
            factory.create_entity(ADMIN, Weak::new(), request("a")),
            Err(EntityError::UnauthorizedCaller { .. })
        ));

        let first = factory.create_entity(registry, Weak::new(), request("a")).unwrap();
        let second = factory.create_entity(registry, Weak::new(), request("b")).unwrap();
        assert_ne!(first.address(), second.address());
        assert_eq!(factory.instances(), vec![first.address(), second.address()]);
        assert_eq!(first.registry_address(), registry);
        assert_eq!(first.shell(), Address([0x5e; 20]));
    }

    #[test]
    fn test_single_binding() {
        let factory = factory();
        factory.set_authorized_registry(ADMIN, Address([1; 20])).unwrap();
        assert!(matches!(
            factory.set_authorized_registry(ADMIN, Address([2; 20])),
            Err(EntityError::AlreadyBound(a)) if a == Address([1; 20])
        ));

        // a bound registry cannot bind a replacement either
        assert!(matches!(
            factory.set_authorized_registry(Address([1; 20]), Address([2; 20])),
            Err(EntityError::UnauthorizedCaller { .. })
        ));

        factory.clear_authorized_registry(ADMIN).unwrap();
        factory.set_authorized_registry(ADMIN, Address([2; 20])).unwrap();
        assert_eq!(factory.authorized_registry(), Some(Address([2; 20])));
        assert!(matches!(
            factory.create_entity(Address([1; 20]), Weak::new(), request("a")),
            Err(EntityError::UnauthorizedCaller { .. })
        ));
    }

    #[test]
    fn test_missing_prerequisites() {
        let factory = factory();
        let registry = Address([0x0e; 20]);
        factory.set_authorized_registry(ADMIN, registry).unwrap();

        assert!(matches!(
            factory.create_entity(registry, Weak::new(), request("a")),
            Err(EntityError::NoProxyImplementation)
        ));
        factory.set_proxy_implementation(registry, Address([0x5e; 20])).unwrap();
        assert!(matches!(
            factory.create_entity(registry, Weak::new(), request("a")),
            Err(EntityError::NoLatestImplementation)
        ));
    }

    #[test]
    fn test_failed_initialization_consumes_nothing() {
        let factory = factory();
        let registry = Address([0x0e; 20]);
        factory.set_authorized_registry(ADMIN, registry).unwrap();
        factory.set_implementation(registry, counter::implementation(1), 1).unwrap();
        factory.set_proxy_implementation(registry, Address([0x5e; 20])).unwrap();

        let failing = CreationRequest {
            init_data: counter::FAIL_INIT,
            ..request("a")
        };
        assert!(matches!(
            factory.create_entity(registry, Weak::new(), failing),
            Err(EntityError::InitializationFailed(_))
        ));
        assert!(factory.instances().is_empty());

        // the nonce did not advance, so the next proxy takes the first address
        let proxy = factory.create_entity(registry, Weak::new(), request("a")).unwrap();
        assert_eq!(
            proxy.address(),
            Address::derive(
                b"entity-proxy",
                &[&factory.address().as_bytes()[..], &0u64.to_be_bytes()[..]]
            )
        );
    }
}
