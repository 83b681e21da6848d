//! Per-entity proxy
//!
//! A proxy is the entity's identity. It owns the entity's storage and
//! forwards every call to implementation code it looks up through its
//! factory, so implementation changes never move or reset state. Selectors
//! the implementation does not know fall through to the factory's extension
//! registry.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::factory::EntityFactory;
use super::logic::{CallContext, CallRequest, Implementation, Mutability, ProxyStorage};
use super::registry::EntityRegistry;
use super::EntityStatus;
use crate::crypto::Address;
use crate::error::{EntityError, Result};
use crate::events::Event;
use crate::extensions::{Extension, Selector};

/// Which implementation version a proxy runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionSelector {
    /// Whatever the factory registered last
    Latest,
    /// A fixed version, moved only by an explicit upgrade
    Pinned(u64),
}

/// Where a selector is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Native {
        implementation: Address,
        version: u64,
        mutability: Mutability,
    },
    Extension {
        implementation: Address,
        mutability: Mutability,
    },
}

impl Dispatch {
    pub fn implementation(&self) -> Address {
        match self {
            Dispatch::Native { implementation, .. } | Dispatch::Extension { implementation, .. } => {
                *implementation
            }
        }
    }

    pub fn mutability(&self) -> Mutability {
        match self {
            Dispatch::Native { mutability, .. } | Dispatch::Extension { mutability, .. } => {
                *mutability
            }
        }
    }
}

/// Upgrade history of a pinned proxy; never returns to `NotUpgraded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeState {
    NotUpgraded,
    Upgraded { version: u64, implementation: Address },
}

enum Target {
    Native(Implementation),
    Extension(Arc<dyn Extension>),
}

struct ProxyState {
    storage: ProxyStorage,
    version: VersionSelector,
    upgrade: UpgradeState,
    /// Current owner; the only party allowed to start an upgrade
    governor: Address,
}

/// Delegating proxy for one entity
pub struct EntityProxy {
    address: Address,
    registry_address: Address,
    registry: Weak<EntityRegistry>,
    factory: Arc<EntityFactory>,
    shell: Address,
    inner: RwLock<ProxyState>,
}

impl EntityProxy {
    pub(crate) fn new(
        address: Address,
        registry_address: Address,
        registry: Weak<EntityRegistry>,
        factory: Arc<EntityFactory>,
        shell: Address,
        version: VersionSelector,
        governor: Address,
        storage: ProxyStorage,
    ) -> Self {
        Self {
            address,
            registry_address,
            registry,
            factory,
            shell,
            inner: RwLock::new(ProxyState {
                storage,
                version,
                upgrade: UpgradeState::NotUpgraded,
                governor,
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn registry_address(&self) -> Address {
        self.registry_address
    }

    pub fn factory_address(&self) -> Address {
        self.factory.address()
    }

    /// Proxy code this instance was stamped from
    pub fn shell(&self) -> Address {
        self.shell
    }

    pub fn version_selector(&self) -> VersionSelector {
        self.inner.read().version
    }

    pub fn upgrade_state(&self) -> UpgradeState {
        self.inner.read().upgrade
    }

    pub fn governor(&self) -> Address {
        self.inner.read().governor
    }

    /// Snapshot of the entity's storage
    pub fn storage(&self) -> ProxyStorage {
        self.inner.read().storage.clone()
    }

    /// Version the next call would run
    pub fn implementation_version(&self) -> u64 {
        match self.version_selector() {
            VersionSelector::Pinned(version) => version,
            VersionSelector::Latest => self.factory.latest_version().unwrap_or(0),
        }
    }

    /// Address of the implementation the next call would run
    pub fn implementation(&self) -> Result<Address> {
        let (_, implementation) = self.factory.current_implementation(self.version_selector())?;
        Ok(implementation.address())
    }

    pub(crate) fn set_governor(&self, governor: Address) {
        self.inner.write().governor = governor;
    }

    fn resolve(&self, selector: Selector) -> Result<(Dispatch, Target)> {
        let (version, implementation) = self.factory.current_implementation(self.version_selector())?;
        if let Some(mutability) = implementation.native_function(selector) {
            let dispatch = Dispatch::Native {
                implementation: implementation.address(),
                version,
                mutability,
            };
            return Ok((dispatch, Target::Native(implementation)));
        }

        let extension = self
            .factory
            .extension_registry()
            .and_then(|registry| registry.resolve_extension(selector));
        match extension {
            Some(extension) => {
                let mutability = extension
                    .functions()
                    .into_iter()
                    .find(|f| f.selector == selector)
                    .map(|f| f.mutability)
                    .unwrap_or(Mutability::Mutating);
                let dispatch = Dispatch::Extension {
                    implementation: extension.address(),
                    mutability,
                };
                Ok((dispatch, Target::Extension(extension)))
            }
            None => {
                debug!("{}: no route for {}", self.address, selector);
                Err(EntityError::UnsupportedOperation(selector))
            }
        }
    }

    /// Routing decision for a selector, without executing anything
    pub fn route(&self, selector: Selector) -> Result<Dispatch> {
        self.resolve(selector).map(|(dispatch, _)| dispatch)
    }

    /// Status as seen by the owning registry
    fn registry_status(&self) -> Result<EntityStatus> {
        let registry = self.registry.upgrade().ok_or(EntityError::NotFound {
            what: "registry",
            address: self.registry_address,
        })?;
        registry.status(&self.address)
    }

    fn require_active(&self) -> Result<()> {
        let status = self.registry_status()?;
        if status.is_active() {
            Ok(())
        } else {
            Err(EntityError::NotActive {
                entity: self.address,
                status,
            })
        }
    }

    /// Execute a call against this entity's storage
    ///
    /// Mutating calls need an active entity and only commit storage when the
    /// target returns `Ok`. View calls run on a scratch copy.
    pub fn call(&self, request: CallRequest) -> Result<Vec<u8>> {
        let (dispatch, target) = self.resolve(request.selector)?;
        let mutating = dispatch.mutability() == Mutability::Mutating;
        if mutating {
            self.require_active()?;
        }
        debug!(
            "{}: {} from {} -> {:?}",
            self.address, request.selector, request.caller, dispatch
        );

        let now = self.factory.clock().now();
        let run = |storage: &mut ProxyStorage, owner: Address| {
            let mut ctx = CallContext {
                entity: self.address,
                caller: request.caller,
                owner,
                value: request.value,
                now,
                storage,
            };
            match &target {
                Target::Native(implementation) => {
                    implementation
                        .logic()
                        .execute(&mut ctx, request.selector, &request.input)
                }
                Target::Extension(extension) => {
                    extension.execute(&mut ctx, request.selector, &request.input)
                }
            }
        };

        if mutating {
            let mut state = self.inner.write();
            let mut scratch = state.storage.clone();
            let output = run(&mut scratch, state.governor)?;
            state.storage = scratch;
            Ok(output)
        } else {
            let (mut scratch, owner) = {
                let state = self.inner.read();
                (state.storage.clone(), state.governor)
            };
            run(&mut scratch, owner)
        }
    }

    /// Move a pinned entity onto the factory's newest implementation
    ///
    /// Only the governor may start an upgrade. The new implementation's
    /// `migrate` hook runs first; the switch itself is completed on behalf
    /// of the owning factory. Returns the new version.
    pub fn upgrade(&self, caller: Address, init_data: &[u8]) -> Result<u64> {
        self.require_active()?;

        let mut state = self.inner.write();
        if caller != state.governor {
            return Err(EntityError::unauthorized(caller, "entity governor"));
        }
        let current = match state.version {
            VersionSelector::Pinned(version) => version,
            VersionSelector::Latest => {
                return Err(EntityError::InvalidUpgrade(
                    "entity always runs the latest implementation".into(),
                ))
            }
        };
        let latest = self
            .factory
            .latest_version()
            .ok_or(EntityError::NoLatestImplementation)?;
        if latest <= current {
            return Err(EntityError::InvalidUpgrade(format!(
                "already on latest version {}",
                current
            )));
        }
        let next = self.factory.implementation(latest)?;

        let mut scratch = state.storage.clone();
        let mut ctx = CallContext {
            entity: self.address,
            caller,
            owner: state.governor,
            value: 0,
            now: self.factory.clock().now(),
            storage: &mut scratch,
        };
        next.logic().migrate(&mut ctx, init_data)?;

        self.complete_upgrade(&mut state, self.factory.address(), next.address())?;
        state.storage = scratch;
        Ok(latest)
    }

    /// Switch the pin to `next`; only the owning factory may do this
    pub fn upgrade_complete(&self, caller: Address, next: Address) -> Result<()> {
        let mut state = self.inner.write();
        self.complete_upgrade(&mut state, caller, next)
    }

    fn complete_upgrade(&self, state: &mut ProxyState, caller: Address, next: Address) -> Result<()> {
        if caller != self.factory.address() {
            return Err(EntityError::unauthorized(caller, "owning factory"));
        }
        let current = match state.version {
            VersionSelector::Pinned(version) => version,
            VersionSelector::Latest => {
                return Err(EntityError::InvalidUpgrade(
                    "entity always runs the latest implementation".into(),
                ))
            }
        };
        let (version, _) = self.factory.find_version(&next).ok_or(EntityError::NotFound {
            what: "implementation",
            address: next,
        })?;
        if version <= current {
            return Err(EntityError::NonMonotonicVersion {
                current,
                attempted: version,
            });
        }
        let old = self.factory.implementation(current)?.address();

        state.version = VersionSelector::Pinned(version);
        state.upgrade = UpgradeState::Upgraded {
            version,
            implementation: next,
        };

        info!("{} upgraded v{} -> v{} ({})", self.address, current, version, next);
        self.factory.events().emit(
            self.factory.address(),
            self.factory.clock().now(),
            Event::EntityUpgraded {
                entity: self.address,
                old,
                new: next,
            },
        );
        Ok(())
    }
}

impl fmt::Debug for EntityProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityProxy")
            .field("address", &self.address)
            .field("registry", &self.registry_address)
            .field("version", &self.version_selector())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::testing::{self, counter, ADMIN, OWNER};
    use crate::entity::{EntityKind, Mutability};
    use crate::extensions::ExtensionMetadata;
    use crate::entity::FunctionSpec;

    struct EchoExtension;

    impl Extension for EchoExtension {
        fn address(&self) -> Address {
            Address([0xe1; 20])
        }

        fn metadata(&self) -> ExtensionMetadata {
            ExtensionMetadata {
                name: "echo".into(),
                version: 1,
            }
        }

        fn functions(&self) -> Vec<FunctionSpec> {
            vec![
                FunctionSpec::from_signature("echo(bytes)", Mutability::View),
                FunctionSpec::from_signature("stamp()", Mutability::Mutating),
            ]
        }

        fn execute(
            &self,
            ctx: &mut CallContext<'_>,
            selector: Selector,
            input: &[u8],
        ) -> Result<Vec<u8>> {
            if selector == Selector::from_signature("stamp()") {
                ctx.storage.put("stamped-by", ctx.caller.as_bytes().to_vec());
                return Ok(vec![]);
            }
            Ok(input.to_vec())
        }
    }

    #[test]
    fn test_native_and_extension_routing() {
        let env = testing::env(EntityKind::Avatar);
        env.extensions
            .add_extension(ADMIN, Arc::new(EchoExtension))
            .unwrap();
        let proxy = env.register("alice");

        let native = proxy.route(counter::INCREMENT).unwrap();
        assert!(matches!(native, Dispatch::Native { version: 1, mutability: Mutability::Mutating, .. }));

        let echo = Selector::from_signature("echo(bytes)");
        assert_eq!(
            proxy.route(echo).unwrap(),
            Dispatch::Extension {
                implementation: Address([0xe1; 20]),
                mutability: Mutability::View
            }
        );
        assert_eq!(
            proxy.call(CallRequest::new(OWNER, echo, vec![1, 2, 3])).unwrap(),
            vec![1, 2, 3]
        );

        // extension code writes into the proxy's own storage
        proxy
            .call(CallRequest::new(OWNER, Selector::from_signature("stamp()"), vec![]))
            .unwrap();
        assert_eq!(proxy.storage().get("stamped-by"), Some(&OWNER.as_bytes()[..]));
    }

    #[test]
    fn test_unknown_selector_unsupported() {
        let env = testing::env(EntityKind::Avatar);
        let proxy = env.register("alice");
        let unknown = Selector::new([0x01, 0x02, 0x03, 0x04]);

        assert!(matches!(
            proxy.call(CallRequest::new(OWNER, unknown, vec![])),
            Err(EntityError::UnsupportedOperation(s)) if s == unknown
        ));
    }

    #[test]
    fn test_failed_call_leaves_storage_untouched() {
        let env = testing::env(EntityKind::Avatar);
        let proxy = env.register("alice");
        proxy.call(CallRequest::new(OWNER, counter::INCREMENT, vec![])).unwrap();

        let result = proxy.call(CallRequest::new(OWNER, counter::FAIL, vec![]));
        assert!(matches!(result, Err(EntityError::Execution(_))));
        assert_eq!(counter::count(&proxy), 1);
    }

    #[test]
    fn test_upgrade_complete_only_from_factory() {
        let env = testing::env(EntityKind::FungibleAsset);
        let proxy = env.register("gold");
        env.publish(2);
        let v2 = testing::implementation_address(2);

        assert!(matches!(
            proxy.upgrade_complete(OWNER, v2),
            Err(EntityError::UnauthorizedCaller { .. })
        ));
        proxy.upgrade_complete(env.factory.address(), v2).unwrap();
        assert_eq!(proxy.version_selector(), VersionSelector::Pinned(2));

        // never backwards
        assert!(matches!(
            proxy.upgrade_complete(env.factory.address(), testing::implementation_address(1)),
            Err(EntityError::NonMonotonicVersion { current: 2, attempted: 1 })
        ));
    }

    #[test]
    fn test_latest_policy_rejects_upgrade() {
        let env = testing::env(EntityKind::Avatar);
        let proxy = env.register("alice");
        env.publish(2);

        assert!(matches!(
            proxy.upgrade(OWNER, &[]),
            Err(EntityError::InvalidUpgrade(_))
        ));
        assert_eq!(proxy.upgrade_state(), UpgradeState::NotUpgraded);
    }
}
