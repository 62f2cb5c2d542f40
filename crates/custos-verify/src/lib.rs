//! # custos-verify
//!
//! Read-side assurance for the CUSTOS audit ledger: the verification
//! service re-validates chain ranges on demand, and the query service
//! serves tenant-scoped, role-redacted reads with stable cursors.

pub mod query;
pub mod service;

pub use query::{AccessRole, Cursor, QueryFilter, QueryIter, QueryPage, QueryService};
pub use service::VerificationService;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use custos_contracts::{
        error::{AuditError, AuditResult},
        event::{Actor, AuditEvent, EventBody, Outcome},
        ids::{CorrelationId, EventId, PartitionId, PartitionKey, TenantId},
        kind::{ClinicalType, DataAccessType, EventCategory, EventKind},
        retention::{RetentionClass, StorageTier},
        submission::NormalizedEvent,
    };
    use custos_ledger::{InMemorySegmentStore, PartitionSegment, SegmentStore, TenantLedger};
    use custos_signer::{KeyRegistry, SigningService};

    use super::{AccessRole, Cursor, QueryFilter, QueryService, VerificationService};

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// A hot store the test keeps a second handle to, so it can corrupt
    /// events behind the ledger's back.
    struct SharedStore(Arc<InMemorySegmentStore>);

    impl SegmentStore for SharedStore {
        fn put_segment(&self, segment: PartitionSegment) -> AuditResult<()> {
            self.0.put_segment(segment)
        }
        fn get_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>> {
            self.0.get_segment(key)
        }
        fn append_event(&self, key: &PartitionKey, event: AuditEvent) -> AuditResult<()> {
            self.0.append_event(key, event)
        }
        fn replace_body(
            &self,
            key: &PartitionKey,
            sequence: u64,
            body: EventBody,
        ) -> AuditResult<()> {
            self.0.replace_body(key, sequence, body)
        }
        fn remove_segment(&self, key: &PartitionKey) -> AuditResult<Option<PartitionSegment>> {
            self.0.remove_segment(key)
        }
    }

    fn key(tenant: &str, partition: &str) -> PartitionKey {
        PartitionKey::new(TenantId::new(tenant), PartitionId::new(partition))
    }

    fn ledger_with_tamper_handle() -> (Arc<TenantLedger>, Arc<InMemorySegmentStore>) {
        let hot = Arc::new(InMemorySegmentStore::new());
        let ledger = TenantLedger::new(
            Box::new(SharedStore(hot.clone())),
            Box::new(InMemorySegmentStore::new()),
            Box::new(InMemorySegmentStore::new()),
        );
        (Arc::new(ledger), hot)
    }

    fn append(
        ledger: &TenantLedger,
        signer: &SigningService,
        key: &PartitionKey,
        kind: EventKind,
        payload: serde_json::Value,
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
            payload,
            retention_class: RetentionClass::DataLifecycle,
            policy_version: 1,
            recorded_at: Utc::now(),
        };
        ledger
            .append(key, |sequence, prev| signer.seal(event, sequence, prev))
            .unwrap();
    }

    fn append_n(ledger: &TenantLedger, signer: &SigningService, key: &PartitionKey, n: usize) {
        for i in 0..n {
            append(
                ledger,
                signer,
                key,
                EventKind::DataAccess(DataAccessType::Read),
                json!({ "resource_type": "record", "resource_id": format!("r-{i}") }),
            );
        }
    }

    // ── Verification ──────────────────────────────────────────────────────────

    /// An untouched partition verifies clean, end to end.
    #[test]
    fn intact_chain_verifies() {
        let (ledger, _) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 5);

        let verifier = VerificationService::new(ledger, signer);
        let report = verifier
            .verify_range(&k.tenant, &k.partition, 0, 4)
            .unwrap();

        assert!(report.ok);
        assert_eq!(report.first_divergence, None);
        assert_eq!(report.checked, 5);
        assert_eq!(report.disposed, 0);
    }

    /// Five events, the third mutated in storage: verification pins the
    /// divergence to exactly sequence 2 and halts the partition.
    #[test]
    fn mutation_is_pinned_to_its_sequence() {
        let (ledger, hot) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 5);

        let mut segment = hot.get_segment(&k).unwrap().unwrap();
        segment.events[2].body = EventBody::Live {
            payload: json!({ "resource_type": "record", "resource_id": "FORGED" }),
        };
        hot.put_segment(segment).unwrap();

        let verifier = VerificationService::new(ledger.clone(), signer);
        let report = verifier
            .verify_range(&k.tenant, &k.partition, 0, 4)
            .unwrap();

        assert!(!report.ok);
        assert_eq!(report.first_divergence, Some(2));
        assert!(report.failures.iter().any(|f| f.sequence == 2));
        assert!(ledger.is_halted(&k));
    }

    /// Deleting the newest events leaves a prefix whose linkage is intact;
    /// the index tail exposes the cut.
    #[test]
    fn tail_truncation_is_detected() {
        let (ledger, hot) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 5);

        let mut segment = hot.get_segment(&k).unwrap().unwrap();
        segment.events.truncate(3);
        hot.put_segment(segment).unwrap();

        let verifier = VerificationService::new(ledger.clone(), signer);
        let report = verifier
            .verify_range(&k.tenant, &k.partition, 0, 4)
            .unwrap();

        assert!(!report.ok);
        assert_eq!(report.first_divergence, Some(4));
        assert!(report.failures[0].reason.contains("tail sequence 4"));
        assert!(ledger.is_halted(&k));

        // An interior range that never claims the tail is unaffected.
        ledger.clear_halt(&k);
        let interior = verifier
            .verify_range(&k.tenant, &k.partition, 0, 2)
            .unwrap();
        assert!(interior.ok);
    }

    /// An interior range is anchored at the first in-range event's stored
    /// prev_hash, so it verifies without the partition head.
    #[test]
    fn interior_range_verifies_independently() {
        let (ledger, _) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 6);

        let verifier = VerificationService::new(ledger, signer);
        let report = verifier
            .verify_range(&k.tenant, &k.partition, 2, 4)
            .unwrap();

        assert!(report.ok);
        assert_eq!(report.checked, 3);
    }

    /// A tombstone passes only when its certificate exists on the system
    /// partition; an orphan tombstone is a verification failure.
    #[test]
    fn tombstones_require_their_certificate() {
        let (ledger, _) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 3);

        // Tombstone sequence 1 without writing any certificate.
        let orphan_certificate = EventId::new();
        ledger
            .dispose_event(&k, 1, orphan_certificate, Utc::now())
            .unwrap();

        let verifier = VerificationService::new(ledger, signer);
        let report = verifier
            .verify_range(&k.tenant, &k.partition, 0, 2)
            .unwrap();

        assert!(!report.ok);
        assert_eq!(report.first_divergence, Some(1));
        assert_eq!(report.disposed, 1);
        assert!(report.failures[0].reason.contains("certificate"));
    }

    /// Tier migration is invisible to verification: identical reports
    /// before and after a Hot → Warm move.
    #[test]
    fn migration_is_transparent_to_verification() {
        let (ledger, _) = ledger_with_tamper_handle();
        let signer = Arc::new(SigningService::new(Arc::new(KeyRegistry::with_system_key())));
        let k = key("t-1", "2026-08");
        append_n(&ledger, &signer, &k, 4);

        let verifier = VerificationService::new(ledger.clone(), signer.clone());
        let before = verifier.verify_range(&k.tenant, &k.partition, 0, 3).unwrap();

        ledger
            .migrate_partition(&k, StorageTier::Warm, |copy| {
                signer.verify_segment(&copy.events, copy.anchor())
            })
            .unwrap();

        let after = verifier.verify_range(&k.tenant, &k.partition, 0, 3).unwrap();
        assert!(before.ok && after.ok);
        assert_eq!(before.checked, after.checked);
    }

    // ── Query ─────────────────────────────────────────────────────────────────

    fn query_fixture() -> (Arc<TenantLedger>, QueryService, PartitionKey) {
        let (ledger, _) = ledger_with_tamper_handle();
        let signer = SigningService::new(Arc::new(KeyRegistry::with_system_key()));
        let k = key("sunrise-care", "2026-08");

        append_n(&ledger, &signer, &k, 3);
        append(
            &ledger,
            &signer,
            &k,
            EventKind::Clinical(ClinicalType::MedicationAdministered),
            json!({
                "resident_id": "res-42",
                "phi": { "medication": "metformin", "dose_mg": 500 },
            }),
        );

        let service = QueryService::new(ledger.clone());
        (ledger, service, k)
    }

    /// Category filters narrow, and pagination walks the partition in
    /// sequence order with a stable cursor.
    #[test]
    fn filters_and_pagination() {
        let (_, service, k) = query_fixture();
        let filter = QueryFilter {
            categories: Some(vec![EventCategory::DataAccess]),
            ..QueryFilter::default()
        };

        let first = service
            .query(
                &k.tenant,
                &filter,
                AccessRole::Auditor,
                &Cursor::start(k.partition.clone()),
                2,
            )
            .unwrap();
        assert_eq!(first.events.len(), 2);
        let cursor = first.next_cursor.expect("one data-access event remains");
        assert_eq!(cursor.after_sequence, Some(1));

        let second = service
            .query(&k.tenant, &filter, AccessRole::Auditor, &cursor, 2)
            .unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].sequence, 2);
        assert!(second.next_cursor.is_none());
    }

    /// Clinicians see clinical payloads; auditors get them withheld, and
    /// `phi` subtrees are redacted everywhere else.
    #[test]
    fn role_redaction() {
        let (_, service, k) = query_fixture();
        let clinical_only = QueryFilter {
            categories: Some(vec![EventCategory::Clinical]),
            ..QueryFilter::default()
        };

        let clinician_view = service
            .query(
                &k.tenant,
                &clinical_only,
                AccessRole::Clinician,
                &Cursor::start(k.partition.clone()),
                10,
            )
            .unwrap();
        let payload = clinician_view.events[0].body.payload().unwrap();
        assert_eq!(payload["phi"]["medication"], "metformin");

        let auditor_view = service
            .query(
                &k.tenant,
                &clinical_only,
                AccessRole::Auditor,
                &Cursor::start(k.partition.clone()),
                10,
            )
            .unwrap();
        let payload = auditor_view.events[0].body.payload().unwrap();
        assert!(payload.get("phi").is_none());
        assert!(payload.get("redacted").is_some());
    }

    /// No filter expression reaches another tenant's data: the partition is
    /// resolved under the caller's tenant, and a foreign tenant simply has
    /// no such partition.
    #[test]
    fn tenant_isolation_holds_under_adversarial_filters() {
        let (_, service, k) = query_fixture();

        let intruder = TenantId::new("shady-corp");
        let err = service
            .query(
                &intruder,
                &QueryFilter::default(),
                AccessRole::Administrator,
                &Cursor::start(k.partition.clone()),
                10,
            )
            .unwrap_err();
        assert!(matches!(err, AuditError::Query { .. }));
    }

    /// The iterator yields every matching event exactly once, in order.
    #[test]
    fn query_iter_walks_the_whole_partition() {
        let (_, service, k) = query_fixture();
        let filter = QueryFilter::default();

        let sequences: Vec<u64> = service
            .iter(
                &k.tenant,
                &filter,
                AccessRole::Auditor,
                k.partition.clone(),
                2,
            )
            .map(|e| e.unwrap().sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    /// Correlation and outcome filters compose with the tenant scope.
    #[test]
    fn correlation_filter_narrows() {
        let (_, service, k) = query_fixture();
        let filter = QueryFilter {
            correlation_id: Some(CorrelationId::new("req-1")),
            success: Some(true),
            ..QueryFilter::default()
        };

        let page = service
            .query(
                &k.tenant,
                &filter,
                AccessRole::Auditor,
                &Cursor::start(k.partition.clone()),
                10,
            )
            .unwrap();
        assert_eq!(page.events.len(), 4);

        let none = QueryFilter {
            correlation_id: Some(CorrelationId::new("req-other")),
            ..QueryFilter::default()
        };
        let page = service
            .query(
                &k.tenant,
                &none,
                AccessRole::Auditor,
                &Cursor::start(k.partition.clone()),
                10,
            )
            .unwrap();
        assert!(page.events.is_empty());
    }
}
