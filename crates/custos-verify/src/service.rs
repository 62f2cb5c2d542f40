//! The verification service: on-demand re-validation of a chain range.
//!
//! Verification recomputes content hashes, checks prev-hash linkage, and
//! validates every signature by its recorded key id. Tombstoned events are
//! verified by linkage, signature, and the existence of their disposal
//! certificate on the tenant's system partition — the content is gone, the
//! commitment is not. A divergence halts the partition against further
//! writes and is reported with its exact first sequence.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use custos_contracts::{
    error::AuditResult,
    event::{AuditEvent, EventBody},
    ids::{EventId, PartitionId, PartitionKey, TenantId},
    retention::DisposalCertificate,
    verify::{VerificationFailure, VerificationReport},
};
use custos_ledger::TenantLedger;
use custos_signer::{event_chain_value, SigningService};

pub struct VerificationService {
    ledger: Arc<TenantLedger>,
    signer: Arc<SigningService>,
}

impl VerificationService {
    pub fn new(ledger: Arc<TenantLedger>, signer: Arc<SigningService>) -> Self {
        Self { ledger, signer }
    }

    /// Verify sequences `[from, to]` of one tenant partition.
    ///
    /// The anchor is the partition's own chain origin (genesis sentinel or
    /// the prior shard's terminal value) when the range starts at the
    /// partition head; for an interior range it is the stored `prev_hash`
    /// of the first in-range event, so any range is independently
    /// checkable. A range reaching the tail is additionally checked
    /// against the partition index, so deleting the newest events does
    /// not pass as an intact shorter chain. A divergence halts the
    /// partition.
    pub fn verify_range(
        &self,
        tenant: &TenantId,
        partition: &PartitionId,
        from: u64,
        to: u64,
    ) -> AuditResult<VerificationReport> {
        let key = PartitionKey::new(tenant.clone(), partition.clone());
        let segment = self.ledger.snapshot(&key)?;

        let events: Vec<&AuditEvent> = segment
            .events
            .iter()
            .filter(|e| e.sequence >= from && e.sequence <= to)
            .collect();

        let head = segment.events.first().map(|e| e.sequence);
        let anchor = match events.first() {
            Some(first) if Some(first.sequence) == head => segment.anchor().to_string(),
            Some(first) => first.prev_hash.clone(),
            None => segment.anchor().to_string(),
        };

        let certificates = self.known_certificates(tenant)?;

        let mut report = VerificationReport {
            tenant_id: tenant.clone(),
            partition: partition.clone(),
            from,
            to,
            ok: true,
            first_divergence: None,
            checked: 0,
            disposed: 0,
            failures: Vec::new(),
        };

        let fail = |sequence: u64, reason: String, report: &mut VerificationReport| {
            warn!(partition = %key, sequence, %reason, "verification failure");
            if report.first_divergence.is_none() {
                report.first_divergence = Some(sequence);
            }
            report.ok = false;
            report.failures.push(VerificationFailure { sequence, reason });
        };

        let mut expected_prev = anchor;
        for event in &events {
            if event.prev_hash != expected_prev {
                fail(
                    event.sequence,
                    format!(
                        "prev_hash {} does not match expected chain value {}",
                        event.prev_hash, expected_prev
                    ),
                    &mut report,
                );
            }

            if let Err(reason) = self.signer.verify_event(event) {
                fail(event.sequence, reason, &mut report);
            }

            match &event.body {
                EventBody::Disposed { certificate_id, .. } => {
                    report.disposed += 1;
                    if !certificates.contains(certificate_id) {
                        fail(
                            event.sequence,
                            format!(
                                "tombstone references certificate {certificate_id} absent from the system partition"
                            ),
                            &mut report,
                        );
                    }
                }
                EventBody::Live { .. } => report.checked += 1,
            }

            // Resync from the stored values so independent failures later
            // in the range are still reported individually.
            expected_prev = event_chain_value(event);
        }

        // A range that reaches the indexed tail must end exactly on it.
        // Linkage alone cannot see events cut off the end of the segment:
        // the surviving prefix still chains cleanly.
        if let Some(record) = self.ledger.partition_record(&key) {
            if let Some(tail_sequence) = record.tail_sequence {
                if from <= tail_sequence && to >= tail_sequence {
                    match events.last() {
                        Some(last) if last.sequence == tail_sequence => {
                            let terminal = event_chain_value(last);
                            if terminal != record.tail_chain {
                                fail(
                                    last.sequence,
                                    format!(
                                        "terminal chain value {terminal} does not match indexed tail {}",
                                        record.tail_chain
                                    ),
                                    &mut report,
                                );
                            }
                        }
                        Some(last) => fail(
                            tail_sequence,
                            format!(
                                "segment ends at sequence {} but the index records tail sequence {tail_sequence}",
                                last.sequence
                            ),
                            &mut report,
                        ),
                        None => fail(
                            tail_sequence,
                            format!(
                                "no events survive in range but the index records tail sequence {tail_sequence}"
                            ),
                            &mut report,
                        ),
                    }
                }
            }
        }

        if report.ok {
            info!(
                partition = %key,
                from,
                to,
                checked = report.checked,
                disposed = report.disposed,
                "chain range verified"
            );
        } else {
            self.ledger.halt(&key);
        }

        Ok(report)
    }

    /// Verify a whole partition from its head to its tail.
    pub fn verify_partition(
        &self,
        tenant: &TenantId,
        partition: &PartitionId,
    ) -> AuditResult<VerificationReport> {
        self.verify_range(tenant, partition, 0, u64::MAX)
    }

    /// Certificate ids recorded on the tenant's system partition.
    fn known_certificates(&self, tenant: &TenantId) -> AuditResult<HashSet<EventId>> {
        let system = PartitionKey::new(tenant.clone(), PartitionId::system());
        let mut ids = HashSet::new();
        if self.ledger.partition_record(&system).is_none() {
            return Ok(ids);
        }
        let segment = self.ledger.snapshot(&system)?;
        for event in &segment.events {
            if let Some(payload) = event.body.payload() {
                if let Ok(certificate) =
                    serde_json::from_value::<DisposalCertificate>(payload.clone())
                {
                    ids.insert(certificate.certificate_id);
                }
            }
        }
        Ok(ids)
    }
}
