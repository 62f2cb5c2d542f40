//! # custos-store
//!
//! The tiered storage manager for the CUSTOS audit ledger. Partitions age
//! through Hot, Warm, and Cold tiers on policy-defined thresholds; moves
//! are copy-verify-switch, fully transparent to reads and verification,
//! and every completed move leaves a `TierMigrated` event on the tenant's
//! system partition.

pub mod manager;

pub use manager::{MigrationRecord, MigrationReport, StorageManager};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use custos_contracts::{
        error::AuditError,
        event::{Actor, Outcome},
        ids::{CorrelationId, EventId, PartitionId, PartitionKey, TenantId},
        kind::{DataAccessType, EventKind, SecurityType, SystemLifecycleType},
        retention::{RetentionClass, StorageTier},
        submission::NormalizedEvent,
    };
    use custos_ledger::TenantLedger;
    use custos_retention::{RetentionPolicy, RetentionPolicySet};
    use custos_signer::{KeyRegistry, SigningService};

    use super::StorageManager;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn key(tenant: &str, partition: &str) -> PartitionKey {
        PartitionKey::new(TenantId::new(tenant), PartitionId::new(partition))
    }

    fn append(ledger: &TenantLedger, signer: &SigningService, key: &PartitionKey, n: usize) {
        for i in 0..n {
            let event = NormalizedEvent {
                id: EventId::new(),
                tenant_id: key.tenant.clone(),
                partition: key.partition.clone(),
                kind: EventKind::DataAccess(DataAccessType::Read),
                actor: Actor {
                    user_id: Some("user-1".to_string()),
                    session_id: "sess-1".to_string(),
                    roles_snapshot: vec!["care-staff".to_string()],
                },
                correlation_id: CorrelationId::new(format!("req-{i}")),
                context: None,
                outcome: Outcome::success(),
                payload: json!({ "record": i }),
                retention_class: RetentionClass::DataLifecycle,
                policy_version: 1,
                recorded_at: Utc::now(),
            };
            ledger
                .append(key, |sequence, prev| signer.seal(event, sequence, prev))
                .unwrap();
        }
    }

    fn setup() -> (Arc<TenantLedger>, Arc<SigningService>, StorageManager) {
        let ledger = Arc::new(TenantLedger::in_memory());
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let policies = Arc::new(RetentionPolicySet::new(RetentionPolicy::standard()).unwrap());
        let manager = StorageManager::new(ledger.clone(), signer.clone(), policies);
        (ledger, signer, manager)
    }

    // ── Migration runs ────────────────────────────────────────────────────────

    /// A partition older than the hot window moves to Warm; the move is
    /// invisible to reads and verification, and leaves a TierMigrated
    /// record on the system partition.
    #[test]
    fn aged_partition_migrates_transparently() {
        let (ledger, signer, manager) = setup();
        let k = key("t-1", "2026-05");
        append(&ledger, &signer, &k, 3);

        let before = ledger.snapshot(&k).unwrap();
        let report = manager.run_migrations(Utc::now() + Duration::days(120)).unwrap();

        assert_eq!(report.migrations.len(), 1);
        assert_eq!(report.migrations[0].to, StorageTier::Warm);
        assert_eq!(
            ledger.partition_record(&k).unwrap().tier,
            StorageTier::Warm
        );

        // Same events, same hashes, chain still verifies.
        let after = ledger.snapshot(&k).unwrap();
        assert_eq!(before.events.len(), after.events.len());
        for (b, a) in before.events.iter().zip(after.events.iter()) {
            assert_eq!(b.content_hash, a.content_hash);
            assert_eq!(b.signature.signature, a.signature.signature);
        }
        assert!(signer.verify_segment(&after.events, after.anchor()).is_ok());

        let system = key("t-1", PartitionId::SYSTEM);
        let trail = ledger.read_range(&system, 0, 10).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(
            trail[0].kind,
            EventKind::SystemLifecycle(SystemLifecycleType::TierMigrated)
        );
    }

    /// Hot → Warm → Cold across successive runs as the partition ages.
    #[test]
    fn partition_ages_through_all_tiers() {
        let (ledger, signer, manager) = setup();
        let k = key("t-1", "2024-01");
        append(&ledger, &signer, &k, 2);

        manager.run_migrations(Utc::now() + Duration::days(120)).unwrap();
        assert_eq!(ledger.partition_record(&k).unwrap().tier, StorageTier::Warm);

        manager.run_migrations(Utc::now() + Duration::days(800)).unwrap();
        assert_eq!(ledger.partition_record(&k).unwrap().tier, StorageTier::Cold);

        let segment = ledger.snapshot(&k).unwrap();
        assert!(signer.verify_segment(&segment.events, segment.anchor()).is_ok());
    }

    /// Partitions inside the hot window are untouched, and a repeated run
    /// at the same clock does nothing further.
    #[test]
    fn fresh_partitions_stay_hot_and_runs_are_idempotent() {
        let (ledger, signer, manager) = setup();
        let k = key("t-1", "2026-08");
        append(&ledger, &signer, &k, 1);

        let report = manager.run_migrations(Utc::now()).unwrap();
        assert!(report.migrations.is_empty());

        let at = Utc::now() + Duration::days(120);
        let first = manager.run_migrations(at).unwrap();
        let second = manager.run_migrations(at).unwrap();
        assert_eq!(first.migrations.len(), 1);
        assert!(second.migrations.is_empty());
    }

    /// Migrated partitions reject appends: writes are hot-tier only.
    #[test]
    fn migrated_partition_rejects_appends() {
        let (ledger, signer, manager) = setup();
        let k = key("t-1", "2026-04");
        append(&ledger, &signer, &k, 1);
        manager.run_migrations(Utc::now() + Duration::days(120)).unwrap();

        let event = NormalizedEvent::internal(
            "test",
            k.tenant.clone(),
            k.partition.clone(),
            EventKind::DataAccess(DataAccessType::Read),
            json!({}),
            RetentionClass::DataLifecycle,
            1,
            CorrelationId::new("req-late"),
        );
        let err = ledger
            .append(&k, |sequence, prev| signer.seal(event, sequence, prev))
            .unwrap_err();
        assert!(matches!(err, AuditError::StorageMigration { .. }));
    }

    /// A copy that fails chain verification aborts the move: the source
    /// tier stays authoritative, the partition is halted, and an integrity
    /// alert lands on the security partition.
    #[test]
    fn verification_failure_aborts_and_alerts() {
        let ledger = Arc::new(TenantLedger::in_memory());
        let writer_signer =
            Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-04");
        append(&ledger, &writer_signer, &k, 2);

        // A manager whose registry never saw the writer's keys cannot
        // verify the copy, which reads as a chain integrity failure.
        let foreign_signer =
            Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let policies = Arc::new(RetentionPolicySet::new(RetentionPolicy::standard()).unwrap());
        let manager = StorageManager::new(ledger.clone(), foreign_signer, policies);

        let report = manager.run_migrations(Utc::now() + Duration::days(120)).unwrap();

        assert!(report.migrations.is_empty());
        assert_eq!(report.alerts_raised, 1);
        assert_eq!(ledger.partition_record(&k).unwrap().tier, StorageTier::Hot);
        assert!(ledger.is_halted(&k));

        let security = key("t-1", PartitionId::SECURITY);
        let alerts = ledger.read_range(&security, 0, 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, EventKind::Security(SecurityType::IntegrityAlert));
    }

    /// Reserved partitions never migrate — they take internal appends for
    /// the life of the tenant.
    #[test]
    fn reserved_partitions_never_migrate() {
        let (ledger, signer, manager) = setup();
        let system = key("t-1", PartitionId::SYSTEM);
        append(&ledger, &signer, &system, 1);

        manager.run_migrations(Utc::now() + Duration::days(800)).unwrap();
        assert_eq!(
            ledger.partition_record(&system).unwrap().tier,
            StorageTier::Hot
        );
    }

    /// A pre-set cancel flag stops the run before any partition moves.
    #[test]
    fn cancellation_stops_before_any_move() {
        let (ledger, signer, manager) = setup();
        let k = key("t-1", "2026-04");
        append(&ledger, &signer, &k, 1);

        let cancel = AtomicBool::new(true);
        let report = manager
            .run_migrations_with_cancel(Utc::now() + Duration::days(120), &cancel)
            .unwrap();

        assert!(report.cancelled);
        assert!(report.migrations.is_empty());
        assert_eq!(ledger.partition_record(&k).unwrap().tier, StorageTier::Hot);
    }
}
