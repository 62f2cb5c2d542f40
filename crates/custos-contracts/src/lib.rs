//! # custos-contracts
//!
//! Shared types, identifiers, and error taxonomy for the CUSTOS audit
//! ledger. All crates in the workspace import from here. No business logic
//! lives in this crate — only data definitions and error types.

pub mod error;
pub mod event;
pub mod ids;
pub mod kind;
pub mod retention;
pub mod submission;
pub mod verify;

#[cfg(test)]
mod tests {
    use super::*;
    use event::{EventBody, Outcome};
    use ids::{EventId, PartitionId, TenantId};
    use kind::{DataAccessType, EventCategory, EventKind, SecurityType};

    // ── EventKind parsing ────────────────────────────────────────────────────

    #[test]
    fn kind_parse_accepts_declared_members() {
        let kind = EventKind::parse("data-access", "update").unwrap();
        assert_eq!(kind, EventKind::DataAccess(DataAccessType::Update));
        assert_eq!(kind.category(), EventCategory::DataAccess);
    }

    #[test]
    fn kind_parse_rejects_type_outside_category() {
        // "login" belongs to authentication, not data-access.
        assert!(EventKind::parse("data-access", "login").is_none());
    }

    #[test]
    fn kind_parse_rejects_unknown_category() {
        assert!(EventKind::parse("billing", "create").is_none());
    }

    #[test]
    fn kind_display_is_category_slash_type() {
        let kind = EventKind::Security(SecurityType::IntegrityAlert);
        assert_eq!(kind.to_string(), "security/integrity-alert");
    }

    #[test]
    fn kind_round_trips_through_serde() {
        for (category, event_type) in [
            ("authentication", "login-failed"),
            ("authorization", "access-denied"),
            ("clinical", "medication-administered"),
            ("system-lifecycle", "tier-migrated"),
            ("security", "pipeline-failure"),
        ] {
            let kind = EventKind::parse(category, event_type)
                .unwrap_or_else(|| panic!("{category}/{event_type} must parse"));
            let json = serde_json::to_string(&kind).unwrap();
            let decoded: EventKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, decoded);
        }
    }

    // ── Partition ids ────────────────────────────────────────────────────────

    #[test]
    fn month_shard_formats_year_and_month() {
        let at = chrono::DateTime::parse_from_rfc3339("2026-08-23T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(PartitionId::month_shard(at).0, "2026-08");
    }

    // ── EventBody ────────────────────────────────────────────────────────────

    #[test]
    fn disposed_body_hides_payload() {
        let body = EventBody::Disposed {
            disposed_at: chrono::Utc::now(),
            certificate_id: EventId::new(),
        };
        assert!(body.is_disposed());
        assert!(body.payload().is_none());
    }

    // ── Outcome ──────────────────────────────────────────────────────────────

    #[test]
    fn outcome_helpers_populate_reason() {
        assert!(Outcome::success().failure_reason.is_none());
        let failed = Outcome::failure("bad credentials");
        assert!(!failed.success);
        assert_eq!(failed.failure_reason.as_deref(), Some("bad credentials"));
    }

    // ── Error display ────────────────────────────────────────────────────────

    #[test]
    fn error_chain_integrity_display_names_the_partition() {
        let err = error::AuditError::ChainIntegrity {
            tenant: TenantId::new("t-1"),
            partition: PartitionId::new("2026-08"),
            sequence: 3,
            reason: "content hash mismatch".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("t-1"));
        assert!(msg.contains("2026-08"));
        assert!(msg.contains("sequence 3"));
    }
}
