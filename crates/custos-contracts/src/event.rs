//! The audit event record and its component types.
//!
//! `AuditEvent` is a single entry in a tenant partition's hash chain — it
//! carries the who/what/when of one audited action plus the SHA-256 chain
//! fields and the Ed25519 signature that make tampering detectable.
//! Once sealed, no field covered by `content_hash` ever changes; a
//! correction is a new event sharing the original's correlation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::{CorrelationId, EventId, KeyId, PartitionId, TenantId},
    kind::EventKind,
    retention::RetentionClass,
};

/// Who performed the audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Absent for system-initiated events (sweeps, migrations).
    pub user_id: Option<String>,

    /// The session the action was performed under.
    pub session_id: String,

    /// The actor's roles at the time of the event. Snapshotted because role
    /// assignments change; the audit record must show what held then.
    pub roles_snapshot: Vec<String>,
}

impl Actor {
    /// The actor recorded on internally generated events.
    pub fn system(component: &str) -> Self {
        Self {
            user_id: None,
            session_id: format!("system:{component}"),
            roles_snapshot: vec!["system".to_string()],
        }
    }
}

/// Request-level context, present only when the collaborator had it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
}

/// Whether the audited action succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,

    /// Mandatory when `success` is false; the validator rejects a failure
    /// outcome without a reason.
    pub failure_reason: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            success: true,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// The event's content: live payload or disposal tombstone.
///
/// Disposal swaps `Live` for `Disposed` in place, leaving every hashed
/// field untouched. Chain verification over a tombstone checks linkage from
/// the stored hashes and the referenced certificate instead of recomputing
/// the content hash — it proves that something existed and was lawfully
/// disposed, without revealing content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EventBody {
    Live {
        /// Category-specific structured data. For data-access updates this
        /// holds `before`/`after` snapshots of changed fields only.
        payload: serde_json::Value,
    },
    Disposed {
        /// When the Disposal Engine erased the content.
        disposed_at: DateTime<Utc>,
        /// The disposal certificate proving the erasure was lawful.
        certificate_id: EventId,
    },
}

impl EventBody {
    pub fn is_disposed(&self) -> bool {
        matches!(self, EventBody::Disposed { .. })
    }

    /// The live payload, if the event has not been disposed.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            EventBody::Live { payload } => Some(payload),
            EventBody::Disposed { .. } => None,
        }
    }
}

/// The Ed25519 signature sealing one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSignature {
    /// The registry key that produced the signature. Recorded so rotation
    /// never orphans old events — verification looks the key up by id.
    pub key_id: KeyId,

    /// Hex-encoded Ed25519 signature over `content_hash ‖ prev_hash`.
    pub signature: String,
}

/// One immutable entry in a tenant partition's hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Globally unique, assigned at ingestion.
    pub id: EventId,

    /// The owning tenant. Every other field is scoped by this.
    pub tenant_id: TenantId,

    /// The partition (time shard or reserved name) this event lives in.
    pub partition: PartitionId,

    /// Position in the partition chain, starting at 0. Assigned by the
    /// ledger at write time, never by the caller. Contiguous per partition;
    /// a gap is itself a detectable integrity violation.
    pub sequence: u64,

    /// The (category, sub-type) tag.
    pub kind: EventKind,

    /// Who performed the action.
    pub actor: Actor,

    /// Groups causally related events from one originating request.
    pub correlation_id: CorrelationId,

    /// Request context, when available.
    pub context: Option<RequestContext>,

    /// Whether the action succeeded.
    pub outcome: Outcome,

    /// Live payload or disposal tombstone.
    pub body: EventBody,

    /// Retention class derived from the category at ingestion.
    pub retention_class: RetentionClass,

    /// The retention policy version in force at ingestion. Disposal
    /// deadlines are always computed against this version, never against a
    /// later one.
    pub policy_version: u32,

    /// Server-assigned timestamp (UTC).
    pub recorded_at: DateTime<Utc>,

    /// Chain value of the preceding event: SHA-256 of its
    /// `content_hash ‖ signature`, or the genesis sentinel / prior
    /// partition's terminal chain value for the first event.
    pub prev_hash: String,

    /// SHA-256 (hex) of this event's canonical serialization — every field
    /// above except the signature and mutable tier metadata.
    pub content_hash: String,

    /// Ed25519 signature over `content_hash ‖ prev_hash`.
    pub signature: EventSignature,
}

/// The ledger's acknowledgement of one committed append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// The sequence number the ledger assigned.
    pub sequence: u64,

    /// The committed event's content hash.
    pub content_hash: String,

    /// The chain value the next event in this partition will link to.
    pub chain_value: String,
}
