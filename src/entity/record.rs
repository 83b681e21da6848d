//! Registry bookkeeping for one entity

use serde::{Deserialize, Serialize};

use super::lifecycle::EntityStatus;
use crate::crypto::{Address, Hash};
use crate::vector::{RegistrationTerms, VectorAddress};

/// Everything a registry knows about an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Proxy address; the entity's identity
    pub address: Address,
    pub name: String,
    pub owner: Address,
    pub status: EntityStatus,
    /// Implementation version the proxy ran when the record was last written
    pub implementation_version: u64,
    pub vector: Option<VectorAddress>,
    pub vector_key: Option<Hash>,
    /// Terms accepted at registration or last renewal
    pub terms: Option<RegistrationTerms>,
    pub registered_at: u64,
    /// End of coverage; `None` never lapses on its own
    pub expires_at: Option<u64>,
    pub grace_period_secs: u64,
    pub fee_paid: u128,
}

impl EntityRecord {
    pub fn new(
        address: Address,
        name: String,
        owner: Address,
        implementation_version: u64,
        registered_at: u64,
    ) -> Self {
        Self {
            address,
            name,
            owner,
            status: EntityStatus::Active,
            implementation_version,
            vector: None,
            vector_key: None,
            terms: None,
            registered_at,
            expires_at: None,
            grace_period_secs: 0,
            fee_paid: 0,
        }
    }

    /// Stored status, without time-driven transitions applied
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn pack(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn unpack(data: &[u8]) -> Option<Self> {
        bincode::deserialize(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let mut record = EntityRecord::new(
            Address([1u8; 20]),
            "Acme".into(),
            Address([2u8; 20]),
            3,
            1_000,
        );
        record.vector = Some(VectorAddress::new("1", "2", "3", 0, 0, 0));
        record.terms = Some(RegistrationTerms::new(10, 365, 30));
        record.expires_at = Some(2_000);

        let unpacked = EntityRecord::unpack(&record.pack()).unwrap();
        assert_eq!(unpacked, record);
        assert!(EntityRecord::unpack(&[0xff]).is_none());
    }
}
