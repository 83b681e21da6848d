//! Admin set: one main admin plus co-admins

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::crypto::Address;
use crate::error::{EntityError, Result};

/// Role-gated admin membership
///
/// The main admin is always a member and can never be removed; it can only
/// hand the role to another address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSet {
    main_admin: Address,
    other_admins: BTreeSet<Address>,
}

impl AdminSet {
    /// Create a set, rejecting zero addresses
    pub fn new(main_admin: Address, other_admins: &[Address]) -> Result<Self> {
        if main_admin.is_zero() {
            return Err(EntityError::ZeroAddress("main admin"));
        }
        if other_admins.iter().any(Address::is_zero) {
            return Err(EntityError::ZeroAddress("admin"));
        }
        let other_admins = other_admins
            .iter()
            .copied()
            .filter(|a| *a != main_admin)
            .collect();
        Ok(Self {
            main_admin,
            other_admins,
        })
    }

    pub fn main_admin(&self) -> Address {
        self.main_admin
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        *address == self.main_admin || self.other_admins.contains(address)
    }

    /// All admins, main admin first
    pub fn admins(&self) -> Vec<Address> {
        std::iter::once(self.main_admin)
            .chain(self.other_admins.iter().copied())
            .collect()
    }

    /// Add co-admins; caller must already be an admin
    ///
    /// Returns the addresses that were not members before.
    pub fn add_admins(&mut self, caller: Address, addresses: &[Address]) -> Result<Vec<Address>> {
        if !self.is_admin(&caller) {
            return Err(EntityError::unauthorized(caller, "admin"));
        }
        if addresses.iter().any(Address::is_zero) {
            return Err(EntityError::ZeroAddress("admin"));
        }

        let mut added = Vec::new();
        for address in addresses {
            if !self.is_admin(address) && self.other_admins.insert(*address) {
                added.push(*address);
            }
        }
        Ok(added)
    }

    /// Remove co-admins; caller must be the main admin
    ///
    /// Returns the addresses that were actually members.
    pub fn remove_admins(
        &mut self,
        caller: Address,
        addresses: &[Address],
    ) -> Result<Vec<Address>> {
        if caller != self.main_admin {
            return Err(EntityError::unauthorized(caller, "main admin"));
        }
        if addresses.contains(&self.main_admin) {
            return Err(EntityError::ProtectedAdmin(self.main_admin));
        }

        Ok(addresses
            .iter()
            .filter(|a| self.other_admins.remove(*a))
            .copied()
            .collect())
    }

    /// Hand the main admin role to another address
    ///
    /// The previous main admin stays on as a co-admin.
    pub fn transfer_main_admin(&mut self, caller: Address, new_main: Address) -> Result<Address> {
        if caller != self.main_admin {
            return Err(EntityError::unauthorized(caller, "main admin"));
        }
        if new_main.is_zero() {
            return Err(EntityError::ZeroAddress("main admin"));
        }
        let old = self.main_admin;
        self.other_admins.remove(&new_main);
        self.other_admins.insert(old);
        self.main_admin = new_main;
        Ok(old)
    }
}
