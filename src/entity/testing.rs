//! Shared fixtures for entity tests

use std::sync::Arc;

use super::proxy::EntityProxy;
use super::registry::{EntityRegistry, RegistrationRequest, RegistryConfig};
use super::stack::EntityStack;
use super::{EntityFactory, EntityKind};
use crate::access::AdminSet;
use crate::clock::ManualClock;
use crate::crypto::Address;
use crate::events::EventLog;
use crate::extensions::CoreExtensionRegistry;

pub const ADMIN: Address = Address([0xad; 20]);
pub const OWNER: Address = Address([0x0a; 20]);
pub const SHELL: Address = Address([0x5e; 20]);
pub const START: u64 = 1_700_000_000;

pub fn implementation_address(version: u64) -> Address {
    Address::derive(b"counter-implementation", &[&version.to_be_bytes()[..]])
}

pub struct Env {
    pub events: Arc<EventLog>,
    pub clock: Arc<ManualClock>,
    pub extensions: Arc<CoreExtensionRegistry>,
    pub registry: Arc<EntityRegistry>,
    pub factory: Arc<EntityFactory>,
}

impl Env {
    pub fn register(&self, name: &str) -> Arc<EntityProxy> {
        let address = self
            .registry
            .register(OWNER, RegistrationRequest::new(OWNER, name))
            .unwrap();
        self.registry.entity(&address).unwrap()
    }

    pub fn publish(&self, version: u64) {
        self.registry
            .set_entity_implementation(ADMIN, counter::implementation(version), version)
            .unwrap();
    }
}

pub fn env(kind: EntityKind) -> Env {
    env_with(RegistryConfig::for_kind(kind), None)
}

/// Stack with a proxy shell and counter v1 published
pub fn env_with(config: RegistryConfig, upstream: Option<Arc<EntityRegistry>>) -> Env {
    let events = Arc::new(EventLog::new());
    let clock = Arc::new(ManualClock::new(START));
    let extensions = Arc::new(
        CoreExtensionRegistry::new(
            Address([0xee; 20]),
            AdminSet::new(ADMIN, &[]).unwrap(),
            events.clone(),
            clock.clone(),
        )
        .unwrap(),
    );
    let stack = EntityStack::deploy(
        config,
        AdminSet::new(ADMIN, &[]).unwrap(),
        Some(extensions.clone()),
        upstream,
        events.clone(),
        clock.clone(),
    )
    .unwrap();
    stack.registry.set_proxy_implementation(ADMIN, SHELL).unwrap();

    let env = Env {
        events,
        clock,
        extensions,
        registry: stack.registry,
        factory: stack.factory,
    };
    env.publish(1);
    env
}

/// Counter implementation whose `version()` reports the version it was published as
pub mod counter {
    use std::sync::Arc;

    use super::implementation_address;
    use crate::entity::logic::{
        CallContext, CallRequest, EntityInit, EntityLogic, FunctionSpec, Implementation, Mutability,
    };
    use crate::entity::proxy::EntityProxy;
    use crate::error::{EntityError, Result};
    use crate::extensions::Selector;

    pub const INCREMENT: Selector = Selector::new([0x10, 0, 0, 1]);
    pub const COUNT: Selector = Selector::new([0x10, 0, 0, 2]);
    pub const VERSION: Selector = Selector::new([0x10, 0, 0, 3]);
    /// Writes storage, then reverts
    pub const FAIL: Selector = Selector::new([0x10, 0, 0, 4]);
    /// Init data that makes initialization revert
    pub const FAIL_INIT: &[u8] = b"fail-init";

    pub struct CounterLogic {
        version: u64,
    }

    pub fn implementation(version: u64) -> Implementation {
        Implementation::new(implementation_address(version), Arc::new(CounterLogic { version }))
            .unwrap()
    }

    impl EntityLogic for CounterLogic {
        fn functions(&self) -> Vec<FunctionSpec> {
            vec![
                FunctionSpec::new(INCREMENT, Mutability::Mutating),
                FunctionSpec::new(COUNT, Mutability::View),
                FunctionSpec::new(VERSION, Mutability::View),
                FunctionSpec::new(FAIL, Mutability::Mutating),
            ]
        }

        fn initialize(&self, ctx: &mut CallContext<'_>, init: EntityInit<'_>) -> Result<()> {
            if init.data == FAIL_INIT {
                return Err(EntityError::execution("initializer reverted"));
            }
            ctx.storage.put_value("count", &0u64)
        }

        fn migrate(&self, ctx: &mut CallContext<'_>, init_data: &[u8]) -> Result<()> {
            ctx.storage.put("migrated", init_data.to_vec());
            Ok(())
        }

        fn execute(
            &self,
            ctx: &mut CallContext<'_>,
            selector: Selector,
            _input: &[u8],
        ) -> Result<Vec<u8>> {
            let count: u64 = ctx.storage.get_value("count")?.unwrap_or(0);
            if selector == INCREMENT {
                ctx.storage.put_value("count", &(count + 1))?;
                Ok(Vec::new())
            } else if selector == COUNT {
                Ok(bincode::serialize(&count).unwrap())
            } else if selector == VERSION {
                Ok(bincode::serialize(&self.version).unwrap())
            } else if selector == FAIL {
                ctx.storage.put_value("count", &u64::MAX)?;
                Err(EntityError::execution("counter reverted"))
            } else {
                Err(EntityError::UnsupportedOperation(selector))
            }
        }
    }

    fn view(proxy: &EntityProxy, selector: Selector) -> u64 {
        let out = proxy
            .call(CallRequest::new(super::OWNER, selector, Vec::new()))
            .unwrap();
        bincode::deserialize(&out).unwrap()
    }

    pub fn count(proxy: &EntityProxy) -> u64 {
        view(proxy, COUNT)
    }

    pub fn version(proxy: &EntityProxy) -> u64 {
        view(proxy, VERSION)
    }
}
