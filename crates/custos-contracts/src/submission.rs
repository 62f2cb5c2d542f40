//! Ingestion-side types: raw submissions and their normalized forms.
//!
//! A collaborator posts a [`RawSubmission`]; the validator turns it into a
//! [`ValidatedEvent`] (shape-checked, no policy knowledge); the pipeline
//! enriches that into a [`NormalizedEvent`] (retention class, policy
//! version, server timestamp) which lacks only the fields the ledger and
//! signer add at write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    event::{Actor, AppendReceipt, Outcome, RequestContext},
    ids::{CorrelationId, EventId, PartitionId, TenantId},
    kind::EventKind,
    retention::RetentionClass,
};

/// The wire shape every collaborator submits.
///
/// Category and type arrive as strings and are parsed against the declared
/// enumerations; `submission_id` is the caller-supplied idempotency key —
/// resubmitting with the same id after a timeout never creates a second
/// ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSubmission {
    /// Caller-supplied idempotency key. Required.
    pub submission_id: String,

    pub tenant_id: String,

    /// Target partition; defaults to the month shard of the event time.
    pub partition: Option<String>,

    pub category: String,
    pub event_type: String,

    pub actor: Actor,
    pub correlation_id: String,
    pub context: Option<RequestContext>,
    pub outcome: Outcome,
    pub payload: serde_json::Value,

    /// When the action happened at the source. The pipeline attaches the
    /// server clock when absent.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A submission that passed validation. Carries no retention information —
/// that is the pipeline's enrichment step, driven by the active policy.
#[derive(Debug, Clone)]
pub struct ValidatedEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub partition: Option<PartitionId>,
    pub kind: EventKind,
    pub actor: Actor,
    pub correlation_id: CorrelationId,
    pub context: Option<RequestContext>,
    pub outcome: Outcome,
    pub payload: serde_json::Value,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A validated, enriched event ready for signing and appending.
///
/// Lacks only `sequence`, `prev_hash`, `content_hash`, and `signature`,
/// which the ledger and signer assign inside the partition's write lock.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub partition: PartitionId,
    pub kind: EventKind,
    pub actor: Actor,
    pub correlation_id: CorrelationId,
    pub context: Option<RequestContext>,
    pub outcome: Outcome,
    pub payload: serde_json::Value,
    pub retention_class: RetentionClass,
    pub policy_version: u32,
    pub recorded_at: DateTime<Utc>,
}

impl NormalizedEvent {
    /// An internally generated event (disposal certificate, tier migration,
    /// security incident) attributed to a system component.
    #[allow(clippy::too_many_arguments)]
    pub fn internal(
        component: &str,
        tenant_id: TenantId,
        partition: PartitionId,
        kind: EventKind,
        payload: serde_json::Value,
        retention_class: RetentionClass,
        policy_version: u32,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            id: EventId::new(),
            tenant_id,
            partition,
            kind,
            actor: Actor::system(component),
            correlation_id,
            context: None,
            outcome: Outcome::success(),
            payload,
            retention_class,
            policy_version,
            recorded_at: Utc::now(),
        }
    }
}

/// The pipeline's synchronous answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitResponse {
    /// Validated, signed, and committed to the ledger.
    Accepted { receipt: AppendReceipt },

    /// Validation failed; the caller must correct and resubmit.
    Rejected { reason: String },

    /// Accepted into the bounded partition queue; will be committed by a
    /// later drain (at-least-once — idempotency de-duplicates on retry).
    Queued { submission_id: String },
}
