//! # custos-retention
//!
//! Versioned retention policy, the disposal engine, and the sweep
//! scheduler for the CUSTOS audit ledger.
//!
//! Retention periods are regulation-driven (3–10 years depending on event
//! category) and fixed per event at ingestion by stamping the policy
//! version. Disposal is irreversible but provable: content is erased, the
//! chain is not, and a signed `DisposalCertificate` event records exactly
//! what was erased, when, and under which policy.

pub mod disposal;
pub mod policy;
pub mod scheduler;

pub use disposal::{DisposalEngine, SweepReport};
pub use policy::{CategoryPolicy, RetentionPolicy, RetentionPolicySet, TierThresholds};
pub use scheduler::SweepScheduler;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use custos_contracts::{
        event::{Actor, Outcome},
        ids::{CorrelationId, EventId, PartitionId, PartitionKey, TenantId},
        kind::{AuthenticationType, EventCategory, EventKind, SystemLifecycleType},
        retention::{DisposalMethod, RetentionClass, StorageTier},
        submission::NormalizedEvent,
    };
    use custos_ledger::TenantLedger;
    use custos_signer::{KeyRegistry, SigningService};

    use super::{DisposalEngine, RetentionPolicy, RetentionPolicySet, SweepScheduler};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn key(tenant: &str, partition: &str) -> PartitionKey {
        PartitionKey::new(TenantId::new(tenant), PartitionId::new(partition))
    }

    /// Append one event recorded at a chosen time (supports backfill).
    fn append_at(
        ledger: &TenantLedger,
        signer: &SigningService,
        key: &PartitionKey,
        kind: EventKind,
        class: RetentionClass,
        recorded_at: chrono::DateTime<Utc>,
    ) {
        let event = NormalizedEvent {
            id: EventId::new(),
            tenant_id: key.tenant.clone(),
            partition: key.partition.clone(),
            kind,
            actor: Actor {
                user_id: Some("user-1".to_string()),
                session_id: "sess-1".to_string(),
                roles_snapshot: vec!["care-staff".to_string()],
            },
            correlation_id: CorrelationId::new("req-1"),
            context: None,
            outcome: Outcome::success(),
            payload: json!({ "backfill": true }),
            retention_class: class,
            policy_version: 1,
            recorded_at,
        };
        ledger
            .append(key, |sequence, prev| signer.seal(event, sequence, prev))
            .unwrap();
    }

    fn setup() -> (Arc<TenantLedger>, Arc<SigningService>, Arc<RetentionPolicySet>) {
        (
            Arc::new(TenantLedger::in_memory()),
            Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key()))),
            Arc::new(RetentionPolicySet::new(RetentionPolicy::standard()).unwrap()),
        )
    }

    // ── Policy configuration ──────────────────────────────────────────────────

    const POLICY_TOML: &str = r#"
version = 2
effective_from = "2026-01-01T00:00:00Z"

[tiers]
hot_days = 90
warm_days = 730

[categories.authentication]
retention_class = "access-control"
retention_days = 2555
disposal_method = "cryptographic-erasure"

[categories.authorization]
retention_class = "access-control"
retention_days = 2555
disposal_method = "cryptographic-erasure"

[categories.data-access]
retention_class = "data-lifecycle"
retention_days = 2555
disposal_method = "cryptographic-erasure"

[categories.clinical]
retention_class = "clinical-record"
retention_days = 3650
disposal_method = "cryptographic-erasure"

[categories.system-lifecycle]
retention_class = "operational"
retention_days = 1095
disposal_method = "physical-deletion"

[categories.security]
retention_class = "security-incident"
retention_days = 3650
disposal_method = "cryptographic-erasure"
"#;

    #[test]
    fn policy_parses_from_toml() {
        let policy = RetentionPolicy::from_toml_str(POLICY_TOML).unwrap();
        assert_eq!(policy.version, 2);
        assert_eq!(
            policy.class_for(EventCategory::Clinical).unwrap(),
            RetentionClass::ClinicalRecord
        );
        assert_eq!(
            policy.method_for(EventCategory::SystemLifecycle).unwrap(),
            DisposalMethod::PhysicalDeletion
        );
    }

    #[test]
    fn policy_missing_category_is_rejected() {
        // Drop the clinical table; validation must name the gap.
        let truncated = POLICY_TOML.replace("[categories.clinical]", "[categories.clinical-x]");
        assert!(RetentionPolicy::from_toml_str(&truncated).is_err());
    }

    #[test]
    fn tier_thresholds_partition_the_age_axis() {
        let policy = RetentionPolicy::standard();
        assert_eq!(policy.tiers.tier_for_age_days(0), StorageTier::Hot);
        assert_eq!(policy.tiers.tier_for_age_days(89), StorageTier::Hot);
        assert_eq!(policy.tiers.tier_for_age_days(90), StorageTier::Warm);
        assert_eq!(policy.tiers.tier_for_age_days(729), StorageTier::Warm);
        assert_eq!(policy.tiers.tier_for_age_days(730), StorageTier::Cold);
    }

    /// Publishing is prospective: older versions stay queryable, and a
    /// stale version number is rejected.
    #[test]
    fn policy_versions_are_preserved() {
        let set = RetentionPolicySet::new(RetentionPolicy::standard()).unwrap();

        let mut v2 = RetentionPolicy::standard();
        v2.version = 2;
        set.publish(v2).unwrap();

        assert_eq!(set.active().version, 2);
        assert_eq!(set.version(1).unwrap().version, 1);
        assert_eq!(set.for_stamped_version(1).version, 1);

        let mut stale = RetentionPolicy::standard();
        stale.version = 2;
        assert!(set.publish(stale).is_err());
    }

    // ── Disposal sweeps ───────────────────────────────────────────────────────

    /// A backfilled 8-year-old authentication event (7-year policy) is
    /// disposed on the next sweep with a certificate; a fresh event in the
    /// same partition is untouched.
    #[test]
    fn sweep_disposes_expired_events_with_certificate() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2018-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(8 * 365),
        );
        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Logout),
            RetentionClass::AccessControl,
            now - Duration::days(30),
        );

        let engine = DisposalEngine::new(ledger.clone(), signer.clone(), policies);
        let report = engine
            .run_sweep(now)
            .unwrap();

        assert_eq!(report.events_disposed, 1);
        assert_eq!(report.certificates.len(), 1);
        let certificate = &report.certificates[0];
        assert_eq!(certificate.sequences, vec![0]);

        // The expired event is a tombstone referencing the certificate; the
        // fresh one is intact, and the chain still verifies.
        let events = ledger.read_range(&k, 0, 1).unwrap();
        assert!(events[0].body.is_disposed());
        assert!(!events[1].body.is_disposed());
        assert!(signer
            .verify_segment(&events, custos_signer::GENESIS_HASH)
            .is_ok());

        // The certificate landed on the tenant's system partition.
        let system = key("t-1", PartitionId::SYSTEM);
        let system_events = ledger.read_range(&system, 0, 10).unwrap();
        assert_eq!(system_events.len(), 1);
        assert_eq!(
            system_events[0].kind,
            EventKind::SystemLifecycle(SystemLifecycleType::Disposal)
        );
    }

    /// Nothing before its deadline is ever disposed.
    #[test]
    fn sweep_never_disposes_before_deadline() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2026-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(365),
        );

        let engine = DisposalEngine::new(ledger.clone(), signer, policies);
        let report = engine.run_sweep(now).unwrap();
        assert_eq!(report.events_disposed, 0);
        assert!(report.certificates.is_empty());
        assert!(!ledger.read_range(&k, 0, 0).unwrap()[0].body.is_disposed());
    }

    /// An event found long past its deadline raises a compliance alert on
    /// the security partition, in addition to being disposed.
    #[test]
    fn overdue_events_raise_compliance_alert() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2017-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(9 * 365),
        );

        let engine = DisposalEngine::new(ledger.clone(), signer, policies)
            .with_escalation_grace(Duration::days(7));
        let report = engine.run_sweep(now).unwrap();

        assert_eq!(report.alerts_raised, 1);
        let security = key("t-1", PartitionId::SECURITY);
        let alerts = ledger.read_range(&security, 0, 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind.category(), EventCategory::Security);
    }

    /// A partition whose every event is past a physical-deletion deadline
    /// loses its segment; the index keeps the certificate and tail.
    #[test]
    fn fully_expired_partition_is_physically_deleted() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2020-01");
        let now = Utc::now();

        for _ in 0..2 {
            append_at(
                &ledger,
                &signer,
                &k,
                EventKind::SystemLifecycle(SystemLifecycleType::ConfigChanged),
                RetentionClass::Operational,
                now - Duration::days(4 * 365),
            );
        }

        let engine = DisposalEngine::new(ledger.clone(), signer, policies);
        let report = engine.run_sweep(now).unwrap();

        assert_eq!(report.events_disposed, 2);
        assert_eq!(report.certificates[0].method, DisposalMethod::PhysicalDeletion);
        assert!(ledger.snapshot(&k).is_err());

        let record = ledger.partition_record(&k).unwrap();
        assert_eq!(
            record.disposed_certificate,
            Some(report.certificates[0].certificate_id)
        );
        assert_eq!(record.tail_sequence, Some(1));
    }

    /// A cancellation observed at the first partition boundary stops the
    /// sweep before anything is disposed.
    #[test]
    fn cancelled_sweep_stops_at_the_first_boundary() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2018-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(8 * 365),
        );

        let engine = DisposalEngine::new(ledger.clone(), signer, policies);
        let cancel = std::sync::atomic::AtomicBool::new(true);
        let report = engine.run_sweep_with_cancel(now, &cancel).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.events_disposed, 0);
        assert!(!ledger.read_range(&k, 0, 0).unwrap()[0].body.is_disposed());
    }

    /// The scheduler's immediate first run disposes expired events, and
    /// `stop` joins the thread promptly.
    #[test]
    fn scheduler_sweeps_on_its_interval_and_stops() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2018-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(8 * 365),
        );

        let engine = Arc::new(DisposalEngine::new(ledger.clone(), signer, policies));
        let scheduler = SweepScheduler::start(engine, std::time::Duration::from_millis(20));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !ledger.read_range(&k, 0, 0).unwrap()[0].body.is_disposed() {
            assert!(
                std::time::Instant::now() < deadline,
                "scheduled sweep never disposed the expired event"
            );
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let asked = std::time::Instant::now();
        scheduler.stop();
        assert!(asked.elapsed() < std::time::Duration::from_secs(2));
    }

    /// Sweeps are idempotent: a second run over the same state disposes
    /// nothing further and issues no new certificates.
    #[test]
    fn sweep_is_idempotent() {
        let (ledger, signer, policies) = setup();
        let k = key("t-1", "2018-08");
        let now = Utc::now();

        append_at(
            &ledger,
            &signer,
            &k,
            EventKind::Authentication(AuthenticationType::Login),
            RetentionClass::AccessControl,
            now - Duration::days(8 * 365),
        );

        let engine = DisposalEngine::new(ledger.clone(), signer, policies);
        let first = engine.run_sweep(now).unwrap();
        let second = engine.run_sweep(now).unwrap();

        assert_eq!(first.events_disposed, 1);
        assert_eq!(second.events_disposed, 0);
        assert!(second.certificates.is_empty());
    }
}
