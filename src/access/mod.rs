//! Access control capability
//!
//! Every registry, factory and extension registry embeds an
//! [`AccessControl`]: an owned [`AdminSet`] plus the component's identity so
//! membership changes are announced in the shared event log. Privileged
//! operations take the caller as an explicit argument and check it here.

pub mod admin;

pub use admin::AdminSet;

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::crypto::Address;
use crate::error::{EntityError, Result};
use crate::events::{Event, EventLog};

/// Admin set bound to the component that owns it
pub struct AccessControl {
    component: Address,
    admins: RwLock<AdminSet>,
    events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
}

impl AccessControl {
    pub fn new(
        component: Address,
        admins: AdminSet,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            component,
            admins: RwLock::new(admins),
            events,
            clock,
        }
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.admins.read().is_admin(address)
    }

    pub fn main_admin(&self) -> Address {
        self.admins.read().main_admin()
    }

    pub fn admins(&self) -> Vec<Address> {
        self.admins.read().admins()
    }

    /// Fail unless `caller` is an admin
    pub fn require_admin(&self, caller: Address) -> Result<()> {
        if self.is_admin(&caller) {
            Ok(())
        } else {
            warn!("{} rejected privileged call from {}", self.component, caller);
            Err(EntityError::unauthorized(caller, "admin"))
        }
    }

    pub fn add_admins(&self, caller: Address, addresses: &[Address]) -> Result<()> {
        let added = self.admins.write().add_admins(caller, addresses)?;
        let now = self.clock.now();
        for admin in added {
            info!("{}: admin {} added", self.component, admin);
            self.events.emit(self.component, now, Event::AdminAdded { admin });
        }
        Ok(())
    }

    pub fn remove_admins(&self, caller: Address, addresses: &[Address]) -> Result<()> {
        let removed = self.admins.write().remove_admins(caller, addresses)?;
        let now = self.clock.now();
        for admin in removed {
            info!("{}: admin {} removed", self.component, admin);
            self.events.emit(self.component, now, Event::AdminRemoved { admin });
        }
        Ok(())
    }

    pub fn transfer_main_admin(&self, caller: Address, new_main: Address) -> Result<()> {
        let old = self.admins.write().transfer_main_admin(caller, new_main)?;
        info!("{}: main admin {} -> {}", self.component, old, new_main);
        self.events.emit(
            self.component,
            self.clock.now(),
            Event::MainAdminTransferred { old, new: new_main },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_membership_changes_emit_events() {
        let events = Arc::new(EventLog::new());
        let main = Address([1u8; 20]);
        let control = AccessControl::new(
            Address([0xc0; 20]),
            AdminSet::new(main, &[]).unwrap(),
            events.clone(),
            Arc::new(ManualClock::new(5)),
        );

        let co = Address([2u8; 20]);
        control.add_admins(main, &[co]).unwrap();
        control.remove_admins(main, &[co]).unwrap();

        let names: Vec<_> = events.entries().iter().map(|r| r.event.name()).collect();
        assert_eq!(names, vec!["AdminAdded", "AdminRemoved"]);
        assert_eq!(events.entries()[0].timestamp, 5);
    }

    #[test]
    fn test_require_admin() {
        let main = Address([1u8; 20]);
        let control = AccessControl::new(
            Address([0xc0; 20]),
            AdminSet::new(main, &[]).unwrap(),
            Arc::new(EventLog::new()),
            Arc::new(ManualClock::default()),
        );
        assert!(control.require_admin(main).is_ok());
        assert!(matches!(
            control.require_admin(Address([3u8; 20])),
            Err(EntityError::UnauthorizedCaller { .. })
        ));
    }
}
