//! Partition segments and the tier-store abstraction.
//!
//! A `PartitionSegment` is the physical unit the tiered storage manager
//! moves around: one (tenant, partition)'s events plus the chain metadata
//! needed to verify it in isolation. `SegmentStore` is the seam between the
//! ledger's ordering logic and whatever holds the bytes — the in-memory
//! implementation is the reference; a durable backend implements the same
//! trait.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use custos_contracts::{
    error::{AuditError, AuditResult},
    event::{AuditEvent, EventBody},
    ids::PartitionKey,
};

/// One (tenant, partition)'s events plus chain metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSegment {
    pub key: PartitionKey,

    /// Terminal chain value of the prior partition when this one was opened
    /// as a continuation (monthly rollover); `None` for genesis partitions.
    pub chained_from: Option<String>,

    /// All events in sequence order.
    pub events: Vec<AuditEvent>,
}

impl PartitionSegment {
    pub fn empty(key: PartitionKey, chained_from: Option<String>) -> Self {
        Self {
            key,
            chained_from,
            events: Vec::new(),
        }
    }

    /// The chain anchor verification starts from: the prior partition's
    /// terminal chain value, or the genesis sentinel.
    pub fn anchor(&self) -> &str {
        self.chained_from
            .as_deref()
            .unwrap_or(custos_signer::GENESIS_HASH)
    }
}

/// Storage backend for one tier.
///
/// Implementations must be safe for concurrent readers; the ledger
/// serializes writers per partition above this layer.
pub trait SegmentStore: Send + Sync {
    /// Install or overwrite a whole segment (migration target side).
    fn put_segment(&self, segment: PartitionSegment) -> AuditResult<()>;

    /// A consistent snapshot of a segment, cloned out of the store.
    fn get_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>>;

    /// Append one event to an existing segment.
    fn append_event(&self, key: &PartitionKey, event: AuditEvent) -> AuditResult<()>;

    /// Replace the body of one event in place. Only the Disposal Engine
    /// calls this, and only with a tombstone body.
    fn replace_body(&self, key: &PartitionKey, sequence: u64, body: EventBody)
        -> AuditResult<()>;

    /// Remove a segment, returning it (migration source side).
    fn remove_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>>;
}

/// The reference `SegmentStore`: a `HashMap` behind an `RwLock`.
pub struct InMemorySegmentStore {
    segments: RwLock<HashMap<PartitionKey, PartitionSegment>>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentStore for InMemorySegmentStore {
    fn put_segment(&self, segment: PartitionSegment) -> AuditResult<()> {
        let mut segments = self.segments.write().expect("segment store lock poisoned");
        segments.insert(segment.key.clone(), segment);
        Ok(())
    }

    fn get_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>> {
        let segments = self.segments.read().expect("segment store lock poisoned");
        Ok(segments.get(key).cloned())
    }

    fn append_event(&self, key: &PartitionKey, event: AuditEvent) -> AuditResult<()> {
        let mut segments = self.segments.write().expect("segment store lock poisoned");
        let segment = segments.get_mut(key).ok_or_else(|| AuditError::Query {
            reason: format!("no segment for partition {key}"),
        })?;
        segment.events.push(event);
        Ok(())
    }

    fn replace_body(
        &self,
        key: &PartitionKey,
        sequence: u64,
        body: EventBody,
    ) -> AuditResult<()> {
        let mut segments = self.segments.write().expect("segment store lock poisoned");
        let segment = segments.get_mut(key).ok_or_else(|| AuditError::Disposal {
            reason: format!("no segment for partition {key}"),
        })?;
        let event = segment
            .events
            .iter_mut()
            .find(|e| e.sequence == sequence)
            .ok_or_else(|| AuditError::Disposal {
                reason: format!("no event at sequence {sequence} in partition {key}"),
            })?;
        event.body = body;
        Ok(())
    }

    fn remove_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>> {
        let mut segments = self.segments.write().expect("segment store lock poisoned");
        Ok(segments.remove(key))
    }
}
