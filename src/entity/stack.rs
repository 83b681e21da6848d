//! Registry + factory wiring for one entity kind

use std::sync::Arc;
use tracing::info;

use super::factory::EntityFactory;
use super::registry::{EntityRegistry, RegistryConfig};
use crate::access::AdminSet;
use crate::clock::Clock;
use crate::crypto::Address;
use crate::error::Result;
use crate::events::EventLog;
use crate::extensions::CoreExtensionRegistry;

/// A registry bound to its factory
#[derive(Debug, Clone)]
pub struct EntityStack {
    pub registry: Arc<EntityRegistry>,
    pub factory: Arc<EntityFactory>,
}

impl EntityStack {
    /// Deploy and bind a registry/factory pair
    ///
    /// Component addresses are derived from the kind and the main admin. The
    /// main admin performs the binding, so it ends up admin of both.
    pub fn deploy(
        config: RegistryConfig,
        admins: AdminSet,
        extensions: Option<Arc<CoreExtensionRegistry>>,
        upstream: Option<Arc<EntityRegistry>>,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let kind = config.kind;
        let main_admin = admins.main_admin();
        let seed: [&[u8]; 2] = [kind.name().as_bytes(), main_admin.as_bytes()];
        let registry_address = Address::derive(b"entity-registry", &seed);
        let factory_address = Address::derive(b"entity-factory", &seed);

        let factory = Arc::new(EntityFactory::new(
            factory_address,
            kind,
            admins.clone(),
            events.clone(),
            clock.clone(),
        )?);
        let registry = EntityRegistry::new(registry_address, config, admins, upstream, events, clock)?;

        factory.set_authorized_registry(main_admin, registry.address())?;
        if let Some(extensions) = extensions {
            factory.set_extension_registry(main_admin, extensions)?;
        }
        registry.set_factory(main_admin, factory.clone())?;

        info!(
            "{} stack deployed: registry {}, factory {}",
            kind, registry_address, factory_address
        );
        Ok(Self { registry, factory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entity::EntityKind;
    use crate::error::EntityError;

    #[test]
    fn test_deploy_binds_both_sides() {
        let admin = Address([1u8; 20]);
        let stack = EntityStack::deploy(
            RegistryConfig::for_kind(EntityKind::Avatar),
            AdminSet::new(admin, &[]).unwrap(),
            None,
            None,
            Arc::new(EventLog::new()),
            Arc::new(ManualClock::default()),
        )
        .unwrap();

        assert_eq!(stack.factory.authorized_registry(), Some(stack.registry.address()));
        assert_eq!(
            stack.registry.factory().map(|f| f.address()),
            Some(stack.factory.address())
        );
        assert!(matches!(
            stack.registry.set_factory(admin, stack.factory.clone()),
            Err(EntityError::AlreadyBound(_))
        ));
        assert_ne!(stack.registry.address(), stack.factory.address());
    }
}
