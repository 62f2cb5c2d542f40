//! The partition index: (tenant, partition) → tier, tail, and lifecycle
//! flags.
//!
//! This is the persisted-state layout background jobs re-derive progress
//! from after a crash — never from in-memory counters. The index entry is
//! authoritative for which tier currently holds a partition; migration is
//! copy-then-switch, and the switch is the index update.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use custos_contracts::{
    ids::{EventId, PartitionKey},
    retention::StorageTier,
};

/// One partition's index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub key: PartitionKey,

    /// The tier whose store currently holds this partition's segment.
    pub tier: StorageTier,

    /// Last committed sequence number; `None` for an empty partition.
    pub tail_sequence: Option<u64>,

    /// Chain value the next append will link to (genesis sentinel or prior
    /// partition terminal for an empty partition).
    pub tail_chain: String,

    /// Set on chain integrity violation; halted partitions reject writes.
    pub halted: bool,

    /// Terminal chain value of the prior partition, for chained rollovers.
    pub chained_from: Option<String>,

    pub opened_at: DateTime<Utc>,

    /// Set when the whole segment was physically deleted after retention;
    /// the certificate is the remaining proof of what the tail committed to.
    pub disposed_certificate: Option<EventId>,
}

/// Thread-safe map of all known partitions.
pub struct PartitionIndex {
    records: RwLock<HashMap<PartitionKey, PartitionRecord>>,
}

impl PartitionIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new partition on the hot tier.
    pub fn open(&self, key: PartitionKey, tail_chain: String, chained_from: Option<String>) {
        let mut records = self.records.write().expect("partition index lock poisoned");
        records.insert(
            key.clone(),
            PartitionRecord {
                key,
                tier: StorageTier::Hot,
                tail_sequence: None,
                tail_chain,
                halted: false,
                chained_from,
                opened_at: Utc::now(),
                disposed_certificate: None,
            },
        );
    }

    pub fn get(&self, key: &PartitionKey) -> Option<PartitionRecord> {
        let records = self.records.read().expect("partition index lock poisoned");
        records.get(key).cloned()
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        let records = self.records.read().expect("partition index lock poisoned");
        records.contains_key(key)
    }

    /// All known partition keys, unordered.
    pub fn keys(&self) -> Vec<PartitionKey> {
        let records = self.records.read().expect("partition index lock poisoned");
        records.keys().cloned().collect()
    }

    /// Advance the tail after a committed append.
    pub fn record_append(&self, key: &PartitionKey, sequence: u64, chain_value: &str) {
        let mut records = self.records.write().expect("partition index lock poisoned");
        if let Some(record) = records.get_mut(key) {
            record.tail_sequence = Some(sequence);
            record.tail_chain = chain_value.to_string();
        }
    }

    /// Flip a partition to a new tier (the "switch" of copy-then-switch).
    pub fn set_tier(&self, key: &PartitionKey, tier: StorageTier) {
        let mut records = self.records.write().expect("partition index lock poisoned");
        if let Some(record) = records.get_mut(key) {
            record.tier = tier;
        }
    }

    pub fn set_halted(&self, key: &PartitionKey, halted: bool) {
        let mut records = self.records.write().expect("partition index lock poisoned");
        if let Some(record) = records.get_mut(key) {
            record.halted = halted;
        }
    }

    pub fn set_disposed(&self, key: &PartitionKey, certificate_id: EventId) {
        let mut records = self.records.write().expect("partition index lock poisoned");
        if let Some(record) = records.get_mut(key) {
            record.disposed_certificate = Some(certificate_id);
        }
    }
}

impl Default for PartitionIndex {
    fn default() -> Self {
        Self::new()
    }
}
