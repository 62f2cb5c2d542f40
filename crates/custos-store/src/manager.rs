//! The tiered storage manager: policy-driven Hot → Warm → Cold migration.
//!
//! A migration run walks every regular partition, derives its target tier
//! from the active policy's age thresholds, and moves segments via the
//! ledger's copy-verify-switch primitive. The chain is verified on the
//! copied segment before the index flips; a mismatch aborts the move,
//! halts the partition, and raises an integrity alert. Content hashes and
//! signatures are never touched by a migration.
//!
//! Runs are idempotent and resumable: the target tier is re-derived from
//! the persisted index every time, so re-running after a crash picks up
//! exactly where the index says things stand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use custos_contracts::{
    error::{AuditError, AuditResult},
    ids::{CorrelationId, PartitionId, PartitionKey, TenantId},
    kind::{EventCategory, EventKind, SecurityType, SystemLifecycleType},
    retention::StorageTier,
    submission::NormalizedEvent,
};
use custos_ledger::TenantLedger;
use custos_retention::RetentionPolicySet;
use custos_signer::SigningService;

/// One completed tier move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub tenant_id: TenantId,
    pub partition: PartitionId,
    pub from: StorageTier,
    pub to: StorageTier,
}

/// What one migration run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    pub partitions_scanned: u64,
    pub migrations: Vec<MigrationRecord>,

    /// Integrity alerts raised for partitions whose copied segment failed
    /// chain verification. Those partitions are halted and stay on their
    /// source tier.
    pub alerts_raised: u64,

    /// Per-partition failures; logged and retried on the next run.
    pub errors: Vec<String>,

    /// True when the run stopped early at a partition boundary.
    pub cancelled: bool,
}

/// Drives tier migration against the ledger.
pub struct StorageManager {
    ledger: Arc<TenantLedger>,
    signer: Arc<SigningService>,
    policies: Arc<RetentionPolicySet>,
}

impl StorageManager {
    pub fn new(
        ledger: Arc<TenantLedger>,
        signer: Arc<SigningService>,
        policies: Arc<RetentionPolicySet>,
    ) -> Self {
        Self {
            ledger,
            signer,
            policies,
        }
    }

    /// Run one full migration pass as of `now`. Never cancelled.
    pub fn run_migrations(&self, now: DateTime<Utc>) -> AuditResult<MigrationReport> {
        let never = AtomicBool::new(false);
        self.run_migrations_with_cancel(now, &never)
    }

    /// Run one migration pass, checking `cancel` between partitions — a
    /// partition move is never interrupted once started.
    pub fn run_migrations_with_cancel(
        &self,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> AuditResult<MigrationReport> {
        let mut report = MigrationReport {
            started_at: now,
            partitions_scanned: 0,
            migrations: Vec::new(),
            alerts_raised: 0,
            errors: Vec::new(),
            cancelled: false,
        };
        let tiers = self.policies.active().tiers;

        for key in self.ledger.partitions() {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                info!("tier migration run cancelled at partition boundary");
                break;
            }
            // Reserved partitions receive internal appends for the life of
            // the tenant, and appends are hot-tier only.
            if key.partition.0 == PartitionId::SYSTEM || key.partition.0 == PartitionId::SECURITY {
                continue;
            }

            let record = match self.ledger.partition_record(&key) {
                Some(r) => r,
                None => continue,
            };
            if record.halted || record.disposed_certificate.is_some() {
                continue;
            }
            report.partitions_scanned += 1;

            let age_days = (now - record.opened_at).num_days();
            let target = tiers.tier_for_age_days(age_days);
            if target == record.tier {
                continue;
            }

            match self.migrate(&key, record.tier, target) {
                Ok(()) => report.migrations.push(MigrationRecord {
                    tenant_id: key.tenant.clone(),
                    partition: key.partition.clone(),
                    from: record.tier,
                    to: target,
                }),
                Err(e @ AuditError::ChainIntegrity { .. }) => {
                    warn!(partition = %key, error = %e, "migration copy failed verification");
                    self.ledger.halt(&key);
                    if let Err(alert_err) = self.raise_integrity_alert(&key, &e) {
                        report.errors.push(format!("{key}: {alert_err}"));
                    }
                    report.alerts_raised += 1;
                    report.errors.push(format!("{key}: {e}"));
                }
                Err(e) => {
                    warn!(partition = %key, error = %e, "tier migration failed");
                    report.errors.push(format!("{key}: {e}"));
                }
            }
        }

        info!(
            scanned = report.partitions_scanned,
            migrated = report.migrations.len(),
            alerts = report.alerts_raised,
            "tier migration run complete"
        );
        Ok(report)
    }

    /// Copy-verify-switch one partition, then record the move on the
    /// tenant's system partition and release the superseded source copy.
    fn migrate(
        &self,
        key: &PartitionKey,
        from: StorageTier,
        target: StorageTier,
    ) -> AuditResult<()> {
        self.ledger.migrate_partition(key, target, |copy| {
            self.signer.verify_segment(&copy.events, copy.anchor())
        })?;

        self.record_migration(key, from, target)?;
        self.ledger.release_superseded(key);

        info!(partition = %key, from = ?from, to = ?target, "partition tier migrated");
        Ok(())
    }

    fn record_migration(
        &self,
        key: &PartitionKey,
        from: StorageTier,
        target: StorageTier,
    ) -> AuditResult<()> {
        let active = self.policies.active();
        let event = NormalizedEvent::internal(
            "storage-manager",
            key.tenant.clone(),
            PartitionId::system(),
            EventKind::SystemLifecycle(SystemLifecycleType::TierMigrated),
            serde_json::json!({
                "partition": key.partition.0,
                "from": from,
                "to": target,
            }),
            active.class_for(EventCategory::SystemLifecycle)?,
            active.version,
            CorrelationId::new(format!("migration:{key}")),
        );

        let system_key = PartitionKey::new(key.tenant.clone(), PartitionId::system());
        self.ledger
            .append(&system_key, |sequence, prev| {
                self.signer.seal(event, sequence, prev)
            })
            .map(|_| ())
    }

    fn raise_integrity_alert(&self, key: &PartitionKey, cause: &AuditError) -> AuditResult<()> {
        let active = self.policies.active();
        let event = NormalizedEvent::internal(
            "storage-manager",
            key.tenant.clone(),
            PartitionId::security(),
            EventKind::Security(SecurityType::IntegrityAlert),
            serde_json::json!({
                "partition": key.partition.0,
                "cause": cause.to_string(),
                "message": "migration copy failed chain verification; partition halted on source tier",
            }),
            active.class_for(EventCategory::Security)?,
            active.version,
            CorrelationId::new(format!("migration:{key}")),
        );

        let security_key = PartitionKey::new(key.tenant.clone(), PartitionId::security());
        self.ledger
            .append(&security_key, |sequence, prev| {
                self.signer.seal(event, sequence, prev)
            })
            .map(|_| ())
    }
}
