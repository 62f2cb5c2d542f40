//! The tenant ledger: single-writer, append-only, hash-chained partitions.
//!
//! Appends to one (tenant, partition) are serialized behind that
//! partition's mutex — the only hard lock in the system, scoped so two
//! tenants (or two partitions of one tenant) never contend. Sealing runs
//! inside the lock because an event's hash and signature depend on the
//! sequence number and chain value the lock protects.
//!
//! A write either fully commits or leaves no trace: the sequence counter
//! and tail only advance after the event is in the store, so a failed seal
//! or store error never produces a visible gap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};

use custos_contracts::{
    error::{AuditError, AuditResult},
    event::{AppendReceipt, AuditEvent, EventBody},
    ids::{EventId, PartitionKey},
    retention::StorageTier,
};
use custos_signer::{event_chain_value, GENESIS_HASH};

use crate::{
    index::{PartitionIndex, PartitionRecord},
    segment::{InMemorySegmentStore, PartitionSegment, SegmentStore},
};

/// The last committed position of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTail {
    /// `None` for a partition with no events yet.
    pub sequence: Option<u64>,

    /// The chain value the next append will link to.
    pub chain_value: String,
}

/// Mutable write-side state of one partition, owned by its mutex.
struct PartitionWriter {
    next_sequence: u64,
    last_chain: String,
}

/// The multi-tenant audit ledger over three tier stores.
pub struct TenantLedger {
    hot: Box<dyn SegmentStore>,
    warm: Box<dyn SegmentStore>,
    cold: Box<dyn SegmentStore>,
    index: PartitionIndex,
    writers: RwLock<HashMap<PartitionKey, Arc<Mutex<PartitionWriter>>>>,
    /// Migration sources retained briefly for rollback, keyed by partition.
    superseded: Mutex<HashMap<PartitionKey, (StorageTier, PartitionSegment)>>,
}

impl TenantLedger {
    /// A ledger over in-memory stores for all three tiers.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(InMemorySegmentStore::new()),
            Box::new(InMemorySegmentStore::new()),
            Box::new(InMemorySegmentStore::new()),
        )
    }

    pub fn new(
        hot: Box<dyn SegmentStore>,
        warm: Box<dyn SegmentStore>,
        cold: Box<dyn SegmentStore>,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            index: PartitionIndex::new(),
            writers: RwLock::new(HashMap::new()),
            superseded: Mutex::new(HashMap::new()),
        }
    }

    fn store_for(&self, tier: StorageTier) -> &dyn SegmentStore {
        match tier {
            StorageTier::Hot => self.hot.as_ref(),
            StorageTier::Warm => self.warm.as_ref(),
            StorageTier::Cold => self.cold.as_ref(),
        }
    }

    /// Fetch or create the writer for a partition. Creation registers the
    /// partition in the index and installs an empty hot segment.
    fn writer_for(&self, key: &PartitionKey) -> AuditResult<Arc<Mutex<PartitionWriter>>> {
        {
            let writers = self.writers.read().expect("ledger writers lock poisoned");
            if let Some(writer) = writers.get(key) {
                return Ok(writer.clone());
            }
        }

        let mut writers = self.writers.write().expect("ledger writers lock poisoned");
        // Another thread may have created it between the locks.
        if let Some(writer) = writers.get(key) {
            return Ok(writer.clone());
        }

        self.hot
            .put_segment(PartitionSegment::empty(key.clone(), None))?;
        self.index.open(key.clone(), GENESIS_HASH.to_string(), None);

        let writer = Arc::new(Mutex::new(PartitionWriter {
            next_sequence: 0,
            last_chain: GENESIS_HASH.to_string(),
        }));
        writers.insert(key.clone(), writer.clone());

        info!(partition = %key, "partition opened");
        Ok(writer)
    }

    /// Open a partition whose chain continues a prior partition.
    ///
    /// The new partition's first event links to the prior partition's
    /// terminal chain value instead of the genesis sentinel, keeping the
    /// tenant's chain continuous across monthly shards.
    pub fn open_chained_partition(
        &self,
        key: PartitionKey,
        prior: &PartitionKey,
    ) -> AuditResult<()> {
        if self.index.contains(&key) {
            return Err(AuditError::Config {
                reason: format!("partition {key} already exists"),
            });
        }
        let prior_record = self.index.get(prior).ok_or_else(|| AuditError::Config {
            reason: format!("prior partition {prior} does not exist"),
        })?;
        if prior_record.tail_sequence.is_none() {
            return Err(AuditError::Config {
                reason: format!("prior partition {prior} is empty; nothing to chain from"),
            });
        }

        let anchor = prior_record.tail_chain.clone();

        let mut writers = self.writers.write().expect("ledger writers lock poisoned");
        self.hot
            .put_segment(PartitionSegment::empty(key.clone(), Some(anchor.clone())))?;
        self.index
            .open(key.clone(), anchor.clone(), Some(anchor.clone()));
        writers.insert(
            key.clone(),
            Arc::new(Mutex::new(PartitionWriter {
                next_sequence: 0,
                last_chain: anchor,
            })),
        );

        info!(partition = %key, prior = %prior, "chained partition opened");
        Ok(())
    }

    /// Append one event, sealed inside the partition's write lock.
    ///
    /// `seal` receives the sequence number and chain value this event must
    /// carry and returns the fully signed event. Any error from `seal` or
    /// the store leaves the partition exactly as it was — the ledger either
    /// fully commits an event or rejects it.
    pub fn append<F>(&self, key: &PartitionKey, seal: F) -> AuditResult<AppendReceipt>
    where
        F: FnOnce(u64, &str) -> AuditResult<AuditEvent>,
    {
        let writer = self.writer_for(key)?;
        let mut writer = writer.lock().expect("partition writer lock poisoned");

        // Lifecycle checks read the index under the writer lock, so a halt
        // or disposal never races an in-flight append.
        let record = self.index.get(key).ok_or_else(|| AuditError::Query {
            reason: format!("partition {key} missing from index"),
        })?;
        if record.halted {
            return Err(AuditError::PartitionHalted {
                tenant: key.tenant.clone(),
                partition: key.partition.clone(),
            });
        }
        if record.disposed_certificate.is_some() {
            return Err(AuditError::Disposal {
                reason: format!("partition {key} was disposed; it accepts no further events"),
            });
        }
        if record.tier != StorageTier::Hot {
            return Err(AuditError::StorageMigration {
                tenant: key.tenant.clone(),
                partition: key.partition.clone(),
                reason: "appends are hot-tier only; this partition has been migrated".to_string(),
            });
        }

        let sequence = writer.next_sequence;
        let prev_hash = writer.last_chain.clone();

        let event = seal(sequence, &prev_hash)?;
        let content_hash = event.content_hash.clone();
        let chain = event_chain_value(&event);

        self.hot.append_event(key, event)?;

        // Commit point: only now does the partition advance.
        writer.next_sequence = sequence + 1;
        writer.last_chain = chain.clone();
        self.index.record_append(key, sequence, &chain);

        Ok(AppendReceipt {
            sequence,
            content_hash,
            chain_value: chain,
        })
    }

    /// Events of one partition with sequence in `[from, to]`, snapshot
    /// semantics (cloned, unaffected by concurrent appends or migrations).
    pub fn read_range(
        &self,
        key: &PartitionKey,
        from: u64,
        to: u64,
    ) -> AuditResult<Vec<AuditEvent>> {
        if from > to {
            return Err(AuditError::Query {
                reason: format!("invalid range: from {from} > to {to}"),
            });
        }
        let segment = self.snapshot(key)?;
        Ok(segment
            .events
            .into_iter()
            .filter(|e| e.sequence >= from && e.sequence <= to)
            .collect())
    }

    /// A consistent snapshot of a whole partition segment.
    pub fn snapshot(&self, key: &PartitionKey) -> AuditResult<PartitionSegment> {
        let record = self.index.get(key).ok_or_else(|| AuditError::Query {
            reason: format!("unknown partition {key}"),
        })?;
        self.store_for(record.tier)
            .get_segment(key)?
            .ok_or_else(|| AuditError::Query {
                reason: format!(
                    "partition {key} indexed on {:?} tier but segment is missing",
                    record.tier
                ),
            })
    }

    /// Last committed sequence and the chain value the next append links to.
    pub fn tail(&self, key: &PartitionKey) -> Option<LedgerTail> {
        self.index.get(key).map(|record| LedgerTail {
            sequence: record.tail_sequence,
            chain_value: record.tail_chain,
        })
    }

    /// The index entry for a partition.
    pub fn partition_record(&self, key: &PartitionKey) -> Option<PartitionRecord> {
        self.index.get(key)
    }

    /// All known partitions, unordered.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.index.keys()
    }

    /// Halt a partition after an integrity violation. Halted partitions
    /// reject writes until an operator clears them; reads stay available
    /// for investigation.
    pub fn halt(&self, key: &PartitionKey) {
        warn!(partition = %key, "partition halted pending integrity investigation");
        self.index.set_halted(key, true);
    }

    pub fn clear_halt(&self, key: &PartitionKey) {
        self.index.set_halted(key, false);
    }

    pub fn is_halted(&self, key: &PartitionKey) -> bool {
        self.index.get(key).map(|r| r.halted).unwrap_or(false)
    }

    /// Replace one live event's body with a disposal tombstone.
    ///
    /// Disposal Engine only. The event's hashes and signature stay in
    /// place, so the chain across the tombstone remains verifiable. A
    /// second disposal of the same event is an error.
    pub fn dispose_event(
        &self,
        key: &PartitionKey,
        sequence: u64,
        certificate_id: EventId,
        disposed_at: chrono::DateTime<chrono::Utc>,
    ) -> AuditResult<()> {
        if !self.index.contains(key) {
            return Err(AuditError::Disposal {
                reason: format!("unknown partition {key}"),
            });
        }
        let writer = self.writer_for(key)?;
        let _writer = writer.lock().expect("partition writer lock poisoned");
        // Re-read under the lock: a concurrent migration may have moved the
        // segment since the caller resolved the partition.
        let record = self.index.get(key).ok_or_else(|| AuditError::Disposal {
            reason: format!("unknown partition {key}"),
        })?;
        let store = self.store_for(record.tier);

        let segment = store.get_segment(key)?.ok_or_else(|| AuditError::Disposal {
            reason: format!("segment missing for partition {key}"),
        })?;
        let event = segment
            .events
            .iter()
            .find(|e| e.sequence == sequence)
            .ok_or_else(|| AuditError::Disposal {
                reason: format!("no event at sequence {sequence} in partition {key}"),
            })?;
        if event.body.is_disposed() {
            return Err(AuditError::Disposal {
                reason: format!("event {sequence} in partition {key} is already disposed"),
            });
        }

        store.replace_body(
            key,
            sequence,
            EventBody::Disposed {
                disposed_at,
                certificate_id,
            },
        )
    }

    /// Physically delete a fully-disposed partition's segment.
    ///
    /// The index keeps the tier, tail, and certificate so the tenant chain
    /// across the deleted shard remains provable. The partition accepts no
    /// further events.
    pub fn remove_disposed_partition(
        &self,
        key: &PartitionKey,
        certificate_id: EventId,
    ) -> AuditResult<()> {
        if !self.index.contains(key) {
            return Err(AuditError::Disposal {
                reason: format!("unknown partition {key}"),
            });
        }
        let writer = self.writer_for(key)?;
        let _writer = writer.lock().expect("partition writer lock poisoned");
        let record = self.index.get(key).ok_or_else(|| AuditError::Disposal {
            reason: format!("unknown partition {key}"),
        })?;
        self.store_for(record.tier).remove_segment(key)?;
        self.index.set_disposed(key, certificate_id);

        info!(partition = %key, "disposed partition segment released");
        Ok(())
    }

    /// Move a partition's segment to another tier: copy, verify, switch.
    ///
    /// The copy is taken as a snapshot, `verify` runs against it (chain
    /// check against the segment anchor), and its terminal chain value is
    /// compared with the index tail before the index flips. The source
    /// segment is retained under a superseded holding area for rollback
    /// until [`release_superseded`](Self::release_superseded).
    ///
    /// Idempotent and resumable: progress is re-derived from the index, so
    /// re-running after a crash re-copies and switches again, and a no-op
    /// migration (already on `target`) returns immediately.
    pub fn migrate_partition<F>(
        &self,
        key: &PartitionKey,
        target: StorageTier,
        verify: F,
    ) -> AuditResult<()>
    where
        F: FnOnce(&PartitionSegment) -> AuditResult<()>,
    {
        if !self.index.contains(key) {
            return Err(AuditError::Query {
                reason: format!("unknown partition {key}"),
            });
        }

        // Block appends for the whole copy-verify-switch so a concurrent
        // write can never land between the snapshot and the tier flip.
        let writer = self.writer_for(key)?;
        let _writer = writer.lock().expect("partition writer lock poisoned");

        let record = self.index.get(key).ok_or_else(|| AuditError::Query {
            reason: format!("unknown partition {key}"),
        })?;
        if record.tier == target {
            return Ok(());
        }

        let copy = self
            .store_for(record.tier)
            .get_segment(key)?
            .ok_or_else(|| AuditError::StorageMigration {
                tenant: key.tenant.clone(),
                partition: key.partition.clone(),
                reason: "source segment missing".to_string(),
            })?;

        // Verify the copy before anything is switched; a mismatch aborts
        // with the partition still authoritative on its source tier.
        verify(&copy)?;

        if let Some(last) = copy.events.last() {
            let terminal = event_chain_value(last);
            if terminal != record.tail_chain {
                return Err(AuditError::ChainIntegrity {
                    tenant: key.tenant.clone(),
                    partition: key.partition.clone(),
                    sequence: last.sequence,
                    reason: format!(
                        "copied terminal chain {} does not match indexed tail {}",
                        terminal, record.tail_chain
                    ),
                });
            }
        }

        self.store_for(target).put_segment(copy)?;
        self.index.set_tier(key, target);

        if let Some(source) = self.store_for(record.tier).remove_segment(key)? {
            let mut superseded = self.superseded.lock().expect("superseded lock poisoned");
            superseded.insert(key.clone(), (record.tier, source));
        }

        info!(
            partition = %key,
            from = ?record.tier,
            to = ?target,
            "partition migrated"
        );
        Ok(())
    }

    /// Release the retained source copy of a completed migration.
    pub fn release_superseded(&self, key: &PartitionKey) {
        let mut superseded = self.superseded.lock().expect("superseded lock poisoned");
        superseded.remove(key);
    }
}
