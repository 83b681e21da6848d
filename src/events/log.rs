//! Append-only, hash-chained event log

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use super::Event;
use crate::crypto::{Address, Hash};
use crate::DEFAULT_EVENT_LOG_CAPACITY;

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Maximum entries kept in memory (oldest are dropped first)
    pub max_memory_entries: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

/// Single logged event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Entry sequence number
    pub sequence: u64,
    /// Timestamp (unix seconds, from the emitting component's clock)
    pub timestamp: u64,
    /// Component that emitted the event
    pub emitter: Address,
    /// Event payload
    pub event: Event,
    /// Hash of previous entry
    pub prev_hash: Hash,
    /// Hash of this entry
    pub entry_hash: Hash,
}

impl EventRecord {
    fn compute_hash(&self) -> Hash {
        Hash::keccak_multiple(&[
            &self.sequence.to_le_bytes(),
            &self.timestamp.to_le_bytes(),
            self.emitter.as_bytes(),
            self.event.digest().as_bytes(),
            self.prev_hash.as_bytes(),
        ])
    }
}

struct ChainState {
    entries: VecDeque<EventRecord>,
    sequence: u64,
    last_hash: Hash,
}

/// Shared event sink
pub struct EventLog {
    config: EventLogConfig,
    state: RwLock<ChainState>,
}

impl EventLog {
    /// Create a new log with default config
    pub fn new() -> Self {
        Self::with_config(EventLogConfig::default())
    }

    pub fn with_config(config: EventLogConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ChainState {
                entries: VecDeque::new(),
                sequence: 0,
                last_hash: Hash::zero(),
            }),
        }
    }

    /// Append an event
    pub fn emit(&self, emitter: Address, timestamp: u64, event: Event) {
        let mut state = self.state.write();

        let mut record = EventRecord {
            sequence: state.sequence,
            timestamp,
            emitter,
            event,
            prev_hash: state.last_hash,
            entry_hash: Hash::zero(),
        };
        record.entry_hash = record.compute_hash();

        debug!(
            "event #{} {} from {}",
            record.sequence,
            record.event.name(),
            emitter
        );

        state.sequence += 1;
        state.last_hash = record.entry_hash;
        state.entries.push_back(record);

        while state.entries.len() > self.config.max_memory_entries {
            state.entries.pop_front();
        }
    }

    /// Number of events ever emitted
    pub fn len(&self) -> u64 {
        self.state.read().sequence
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All retained entries, oldest first
    pub fn entries(&self) -> Vec<EventRecord> {
        self.state.read().entries.iter().cloned().collect()
    }

    /// Most recent `count` entries, newest first
    pub fn recent(&self, count: usize) -> Vec<EventRecord> {
        self.state.read().entries.iter().rev().take(count).cloned().collect()
    }

    /// Retained events with the given name
    pub fn by_name(&self, name: &str) -> Vec<Event> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|r| r.event.name() == name)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Retained events concerning one entity
    pub fn for_entity(&self, entity: &Address) -> Vec<Event> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|r| r.event.entity().as_ref() == Some(entity))
            .map(|r| r.event.clone())
            .collect()
    }

    /// Verify the hash chain over retained entries
    pub fn verify_chain(&self) -> Result<(), ChainVerifyError> {
        let state = self.state.read();
        let mut prev_hash: Option<Hash> = None;

        for entry in state.entries.iter() {
            if let Some(prev) = prev_hash {
                if entry.prev_hash != prev {
                    return Err(ChainVerifyError::PrevHashMismatch {
                        sequence: entry.sequence,
                    });
                }
            }
            if entry.compute_hash() != entry.entry_hash {
                return Err(ChainVerifyError::EntryHashMismatch {
                    sequence: entry.sequence,
                });
            }
            prev_hash = Some(entry.entry_hash);
        }

        Ok(())
    }

    /// Export retained entries as JSON
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain verification error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainVerifyError {
    #[error("previous hash mismatch at sequence {sequence}")]
    PrevHashMismatch { sequence: u64 },

    #[error("entry hash mismatch at sequence {sequence}")]
    EntryHashMismatch { sequence: u64 },
}
