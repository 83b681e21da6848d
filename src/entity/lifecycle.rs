//! Control-change and removal state machine
//!
//! ```text
//! Active --(owner/admin transfer)--> Active [new owner]
//! Active --(coverage lapse | admin removal)--> Lapsed --(grace elapses)--> Removed
//! ```
//!
//! Transitions driven by time are evaluated lazily: [`effective_status`]
//! computes where a record stands at `now` without mutating it, and the
//! registry persists the result whenever it writes. `Removed` is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::EntityRecord;
use crate::crypto::Address;
use crate::error::{EntityError, Result};

/// Lifecycle state of an entity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    Active,
    /// Resolvable but rejects mutating operations
    Lapsed { since: u64, grace_until: u64 },
    /// Terminal
    Removed { at: u64 },
}

impl EntityStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EntityStatus::Active)
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, EntityStatus::Removed { .. })
    }

    /// Read paths still succeed
    pub fn is_resolvable(&self) -> bool {
        !self.is_removed()
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityStatus::Active => write!(f, "active"),
            EntityStatus::Lapsed { grace_until, .. } => {
                write!(f, "lapsed until {}", grace_until)
            }
            EntityStatus::Removed { at } => write!(f, "removed at {}", at),
        }
    }
}

/// When a removed entity's name and vector key may be claimed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameReusePolicy {
    /// As soon as the entity reaches `Removed`
    Immediate,
    /// A further cooldown after reaching `Removed`
    Cooldown { seconds: u64 },
}

/// Outcome of a removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReceipt {
    pub entity: Address,
    pub status: EntityStatus,
    /// End of the grace period, if the entity lapsed rather than being removed outright
    pub grace_until: Option<u64>,
    pub removed_at: Option<u64>,
}

impl RemovalReceipt {
    fn from_status(entity: Address, status: EntityStatus) -> Self {
        let (grace_until, removed_at) = match status {
            EntityStatus::Active => (None, None),
            EntityStatus::Lapsed { grace_until, .. } => (Some(grace_until), None),
            EntityStatus::Removed { at } => (None, Some(at)),
        };
        Self {
            entity,
            status,
            grace_until,
            removed_at,
        }
    }
}

/// Status of `record` at `now`
pub fn effective_status(record: &EntityRecord, now: u64) -> EntityStatus {
    match record.status {
        EntityStatus::Removed { at } => EntityStatus::Removed { at },
        EntityStatus::Lapsed { since, grace_until } => {
            if now >= grace_until {
                EntityStatus::Removed { at: grace_until }
            } else {
                EntityStatus::Lapsed { since, grace_until }
            }
        }
        EntityStatus::Active => match record.expires_at {
            Some(expires_at) if now >= expires_at => {
                let grace_until = expires_at.saturating_add(record.grace_period_secs);
                if now >= grace_until {
                    EntityStatus::Removed { at: grace_until }
                } else {
                    EntityStatus::Lapsed {
                        since: expires_at,
                        grace_until,
                    }
                }
            }
            _ => EntityStatus::Active,
        },
    }
}

/// Whether the record's name and vector key are free for a new entity
pub fn is_reusable(record: &EntityRecord, now: u64, policy: NameReusePolicy) -> bool {
    match effective_status(record, now) {
        EntityStatus::Removed { at } => match policy {
            NameReusePolicy::Immediate => true,
            NameReusePolicy::Cooldown { seconds } => now >= at.saturating_add(seconds),
        },
        _ => false,
    }
}

/// Fail unless the record is active at `now`
pub fn require_active(record: &EntityRecord, now: u64) -> Result<()> {
    let status = effective_status(record, now);
    if status.is_active() {
        Ok(())
    } else {
        Err(EntityError::NotActive {
            entity: record.address,
            status,
        })
    }
}

/// Start removing an entity
///
/// An active entity lapses for `grace_secs` (or is removed outright when
/// `grace_secs` is zero); a lapsed entity is removed immediately.
pub fn begin_removal(record: &mut EntityRecord, now: u64, grace_secs: u64) -> Result<RemovalReceipt> {
    let status = match effective_status(record, now) {
        EntityStatus::Active if grace_secs > 0 => EntityStatus::Lapsed {
            since: now,
            grace_until: now.saturating_add(grace_secs),
        },
        EntityStatus::Active | EntityStatus::Lapsed { .. } => EntityStatus::Removed { at: now },
        removed @ EntityStatus::Removed { .. } => {
            return Err(EntityError::NotActive {
                entity: record.address,
                status: removed,
            })
        }
    };
    record.status = status;
    Ok(RemovalReceipt::from_status(record.address, status))
}

/// Re-affirm coverage; never leaves `Removed`
pub fn renew(record: &mut EntityRecord, now: u64, expires_at: Option<u64>, grace_secs: u64) -> Result<()> {
    let status = effective_status(record, now);
    if status.is_removed() {
        return Err(EntityError::NotActive {
            entity: record.address,
            status,
        });
    }
    record.status = EntityStatus::Active;
    record.expires_at = expires_at;
    record.grace_period_secs = grace_secs;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: Option<u64>, grace: u64) -> EntityRecord {
        let mut record = EntityRecord::new(
            Address([1u8; 20]),
            "acme".into(),
            Address([2u8; 20]),
            1,
            0,
        );
        record.expires_at = expires_at;
        record.grace_period_secs = grace;
        record
    }

    #[test]
    fn test_coverage_lapse_then_removal() {
        let r = record(Some(100), 50);
        assert_eq!(effective_status(&r, 99), EntityStatus::Active);
        assert_eq!(
            effective_status(&r, 100),
            EntityStatus::Lapsed {
                since: 100,
                grace_until: 150
            }
        );
        assert_eq!(effective_status(&r, 150), EntityStatus::Removed { at: 150 });
    }

    #[test]
    fn test_no_expiry_stays_active() {
        let r = record(None, 0);
        assert_eq!(effective_status(&r, u64::MAX), EntityStatus::Active);
    }

    #[test]
    fn test_admin_removal_with_grace() {
        let mut r = record(None, 0);
        let receipt = begin_removal(&mut r, 10, 20).unwrap();
        assert_eq!(receipt.grace_until, Some(30));
        assert_eq!(receipt.removed_at, None);
        assert!(!is_reusable(&r, 29, NameReusePolicy::Immediate));
        assert!(is_reusable(&r, 30, NameReusePolicy::Immediate));

        // lapsed -> removed on a second request
        let mut r = record(None, 0);
        begin_removal(&mut r, 10, 20).unwrap();
        let receipt = begin_removal(&mut r, 15, 20).unwrap();
        assert_eq!(receipt.status, EntityStatus::Removed { at: 15 });
    }

    #[test]
    fn test_removed_is_terminal() {
        let mut r = record(None, 0);
        begin_removal(&mut r, 10, 0).unwrap();
        assert!(matches!(begin_removal(&mut r, 11, 0), Err(EntityError::NotActive { .. })));
        assert!(matches!(renew(&mut r, 12, None, 0), Err(EntityError::NotActive { .. })));
        assert!(require_active(&r, 12).is_err());
    }

    #[test]
    fn test_cooldown_policy() {
        let mut r = record(None, 0);
        begin_removal(&mut r, 10, 0).unwrap();
        let policy = NameReusePolicy::Cooldown { seconds: 100 };
        assert!(!is_reusable(&r, 109, policy));
        assert!(is_reusable(&r, 110, policy));
    }

    #[test]
    fn test_renew_during_grace() {
        let mut r = record(Some(100), 50);
        renew(&mut r, 120, Some(500), 50).unwrap();
        assert_eq!(effective_status(&r, 120), EntityStatus::Active);
        assert_eq!(r.expires_at, Some(500));
    }
}
