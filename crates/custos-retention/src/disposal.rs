//! The disposal engine: provable, irreversible erasure at end of retention.
//!
//! A sweep walks every regular partition, finds live events whose deadline
//! (judged by the policy version stamped on them) has passed, appends a
//! `DisposalCertificate` event to the tenant's system partition FIRST, and
//! only then tombstones the content. The certificate is itself a chained,
//! signed audit event, so disposal is provable without retaining the
//! disposed content. There is no undo path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use custos_contracts::{
    error::{AuditError, AuditResult},
    ids::{CorrelationId, EventId, PartitionId, PartitionKey},
    kind::{EventKind, SecurityType, SystemLifecycleType},
    retention::{DisposalCertificate, DisposalMethod},
    submission::NormalizedEvent,
};
use custos_ledger::TenantLedger;
use custos_signer::SigningService;

use crate::policy::RetentionPolicySet;

/// What one retention sweep did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub partitions_scanned: u64,
    pub events_disposed: u64,
    pub certificates: Vec<DisposalCertificate>,
    /// Compliance alerts raised for deadlines missed beyond the grace
    /// window (a prior sweep should have disposed them).
    pub alerts_raised: u64,
    /// Per-partition failures. The sweep logs and continues; these ranges
    /// are retried on the next run.
    pub errors: Vec<String>,
    /// True when the sweep stopped early at a partition boundary because
    /// cancellation was requested.
    pub cancelled: bool,
}

/// Executes retention sweeps against the ledger.
pub struct DisposalEngine {
    ledger: Arc<TenantLedger>,
    signer: Arc<SigningService>,
    policies: Arc<RetentionPolicySet>,
    /// How far past its deadline an event may be found before the sweep
    /// raises an escalating compliance alert alongside disposing it.
    escalation_grace: Duration,
}

impl DisposalEngine {
    pub fn new(
        ledger: Arc<TenantLedger>,
        signer: Arc<SigningService>,
        policies: Arc<RetentionPolicySet>,
    ) -> Self {
        Self {
            ledger,
            signer,
            policies,
            escalation_grace: Duration::days(7),
        }
    }

    pub fn with_escalation_grace(mut self, grace: Duration) -> Self {
        self.escalation_grace = grace;
        self
    }

    /// Run one full sweep as of `now`. Never cancelled.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> AuditResult<SweepReport> {
        let never = AtomicBool::new(false);
        self.run_sweep_with_cancel(now, &never)
    }

    /// Run one sweep, checking `cancel` between partitions — cancellation
    /// is graceful and never interrupts a partition mid-disposal.
    pub fn run_sweep_with_cancel(
        &self,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> AuditResult<SweepReport> {
        let mut report = SweepReport {
            started_at: now,
            partitions_scanned: 0,
            events_disposed: 0,
            certificates: Vec::new(),
            alerts_raised: 0,
            errors: Vec::new(),
            cancelled: false,
        };

        for key in self.ledger.partitions() {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                info!("retention sweep cancelled at partition boundary");
                break;
            }
            // Reserved partitions hold the proofs (certificates, incident
            // records) that must outlive the ranges they attest to.
            if key.partition.0 == PartitionId::SYSTEM || key.partition.0 == PartitionId::SECURITY {
                continue;
            }

            report.partitions_scanned += 1;
            if let Err(e) = self.sweep_partition(&key, now, &mut report) {
                warn!(partition = %key, error = %e, "retention sweep failed for partition");
                report.errors.push(format!("{key}: {e}"));
            }
        }

        info!(
            partitions = report.partitions_scanned,
            disposed = report.events_disposed,
            alerts = report.alerts_raised,
            "retention sweep complete"
        );
        Ok(report)
    }

    fn sweep_partition(
        &self,
        key: &PartitionKey,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> AuditResult<()> {
        let record = match self.ledger.partition_record(key) {
            Some(r) => r,
            None => return Ok(()),
        };
        if record.disposed_certificate.is_some() {
            return Ok(());
        }

        let segment = self.ledger.snapshot(key)?;

        // Collect (sequence, method, overdue) for every live event past its
        // deadline, judged by the policy version stamped on the event.
        let mut due: Vec<(u64, DisposalMethod)> = Vec::new();
        let mut escalations = 0u64;
        let mut stamped_version = 0u32;
        for event in &segment.events {
            if event.body.is_disposed() {
                continue;
            }
            let policy = self.policies.for_stamped_version(event.policy_version);
            let deadline = policy.deadline(event.kind.category(), event.recorded_at)?;
            if deadline > now {
                continue;
            }
            if now - deadline > self.escalation_grace {
                escalations += 1;
            }
            stamped_version = stamped_version.max(event.policy_version);
            due.push((event.sequence, policy.method_for(event.kind.category())?));
        }

        if due.is_empty() {
            return Ok(());
        }

        // Whole-segment physical deletion only when every event in the
        // partition is due now and every rule asks for it; anything else
        // degrades to per-event cryptographic erasure.
        let live_total = segment.events.iter().filter(|e| !e.body.is_disposed()).count();
        let physical = due.len() == live_total
            && due
                .iter()
                .all(|(_, method)| *method == DisposalMethod::PhysicalDeletion);
        let method = if physical {
            DisposalMethod::PhysicalDeletion
        } else {
            DisposalMethod::CryptographicErasure
        };

        let certificate_id = EventId::new();
        let sequences: Vec<u64> = due.iter().map(|(seq, _)| *seq).collect();
        let (key_id, _) = self.signer.registry().active_key_for(&key.tenant)?;

        let certificate = DisposalCertificate {
            certificate_id,
            tenant_id: key.tenant.clone(),
            partition: key.partition.clone(),
            sequences: sequences.clone(),
            method,
            policy_version: stamped_version,
            disposed_at: now,
            key_id,
        };

        // The certificate is committed to the chain before any content is
        // touched: if tombstoning fails midway, the proof of intent exists
        // and the next sweep resumes from persisted state.
        self.append_certificate(key, &certificate)?;

        if physical {
            self.ledger.remove_disposed_partition(key, certificate_id)?;
        } else {
            for sequence in &sequences {
                self.ledger
                    .dispose_event(key, *sequence, certificate_id, now)?;
            }
        }

        if escalations > 0 {
            self.raise_compliance_alert(key, &certificate, escalations)?;
            report.alerts_raised += escalations;
        }

        info!(
            partition = %key,
            disposed = sequences.len(),
            method = ?method,
            certificate = %certificate_id,
            "retention disposal executed"
        );

        report.events_disposed += sequences.len() as u64;
        report.certificates.push(certificate);
        Ok(())
    }

    fn append_certificate(
        &self,
        key: &PartitionKey,
        certificate: &DisposalCertificate,
    ) -> AuditResult<()> {
        let active = self.policies.active();
        let event = NormalizedEvent::internal(
            "disposal-engine",
            key.tenant.clone(),
            PartitionId::system(),
            EventKind::SystemLifecycle(SystemLifecycleType::Disposal),
            serde_json::to_value(certificate).map_err(|e| AuditError::Disposal {
                reason: format!("certificate serialization failed: {e}"),
            })?,
            active.class_for(custos_contracts::kind::EventCategory::SystemLifecycle)?,
            active.version,
            CorrelationId::new(format!("disposal:{}", certificate.certificate_id)),
        );

        let system_key = PartitionKey::new(key.tenant.clone(), PartitionId::system());
        self.ledger
            .append(&system_key, |sequence, prev| {
                self.signer.seal(event, sequence, prev)
            })
            .map(|_| ())
    }

    fn raise_compliance_alert(
        &self,
        key: &PartitionKey,
        certificate: &DisposalCertificate,
        overdue_events: u64,
    ) -> AuditResult<()> {
        warn!(
            partition = %key,
            overdue = overdue_events,
            "retention deadline missed beyond grace window"
        );
        let active = self.policies.active();
        let event = NormalizedEvent::internal(
            "disposal-engine",
            key.tenant.clone(),
            PartitionId::security(),
            EventKind::Security(SecurityType::ComplianceAlert),
            serde_json::json!({
                "partition": key.partition.0,
                "overdue_events": overdue_events,
                "certificate_id": certificate.certificate_id,
                "message": "retention deadline missed beyond grace window; disposed on this sweep",
            }),
            active.class_for(custos_contracts::kind::EventCategory::Security)?,
            active.version,
            CorrelationId::new(format!("disposal:{}", certificate.certificate_id)),
        );

        let security_key = PartitionKey::new(key.tenant.clone(), PartitionId::security());
        self.ledger
            .append(&security_key, |sequence, prev| {
                self.signer.seal(event, sequence, prev)
            })
            .map(|_| ())
    }
}
