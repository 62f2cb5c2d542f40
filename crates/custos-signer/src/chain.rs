//! Hash-chain primitives: canonical content hashing and chain linking.
//!
//! Every field that contributes to an event's content hash is listed
//! explicitly so nothing is accidentally omitted.
//!
//! Content hash input layout (bytes, in order):
//!   1. event id as UUID bytes
//!   2. tenant id as UTF-8 bytes
//!   3. partition id as UTF-8 bytes
//!   4. sequence as 8-byte little-endian
//!   5. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   6. canonical JSON of the event content (serde_json, no pretty-printing)
//!
//! The chain value an event contributes to its successor's `prev_hash` is
//! `SHA-256(content_hash ‖ signature)`, so altering a signature breaks the
//! chain just as surely as altering content.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use custos_contracts::{
    event::{Actor, AuditEvent, EventSignature, Outcome, RequestContext},
    ids::{CorrelationId, EventId, PartitionId, TenantId},
    kind::EventKind,
    retention::RetentionClass,
    submission::NormalizedEvent,
};

/// The sentinel `prev_hash` for the first event of an unchained partition.
///
/// 64 hex zeros — a value that can never be the SHA-256 of real data,
/// making genesis detection unambiguous.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// The hashed view of an event's content.
///
/// Borrowed from either a `NormalizedEvent` (at seal time) or a live
/// `AuditEvent` (at verification time) so both sides hash byte-identical
/// JSON. Mutable metadata (storage tier) and the signature never appear
/// here.
#[derive(Serialize)]
struct CanonicalContent<'a> {
    kind: &'a EventKind,
    actor: &'a Actor,
    correlation_id: &'a CorrelationId,
    context: &'a Option<RequestContext>,
    outcome: &'a Outcome,
    payload: &'a serde_json::Value,
    retention_class: RetentionClass,
    policy_version: u32,
    recorded_at: &'a DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
fn hash_fields(
    id: &EventId,
    tenant: &TenantId,
    partition: &PartitionId,
    sequence: u64,
    prev_hash: &str,
    content: &CanonicalContent<'_>,
) -> String {
    // serde_json::to_vec produces deterministic JSON for a struct: field
    // order follows the declaration above on every call.
    let content_json =
        serde_json::to_vec(content).expect("event content must always serialize to JSON");

    let mut hasher = Sha256::new();
    hasher.update(id.0.as_bytes());
    hasher.update(tenant.0.as_bytes());
    hasher.update(partition.0.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&content_json);

    hex::encode(hasher.finalize())
}

/// Compute the content hash for a normalized event about to be sealed at
/// `sequence` behind `prev_hash`.
///
/// Returns a lowercase 64-character hex string.
pub fn content_hash(event: &NormalizedEvent, sequence: u64, prev_hash: &str) -> String {
    let content = CanonicalContent {
        kind: &event.kind,
        actor: &event.actor,
        correlation_id: &event.correlation_id,
        context: &event.context,
        outcome: &event.outcome,
        payload: &event.payload,
        retention_class: event.retention_class,
        policy_version: event.policy_version,
        recorded_at: &event.recorded_at,
    };
    hash_fields(
        &event.id,
        &event.tenant_id,
        &event.partition,
        sequence,
        prev_hash,
        &content,
    )
}

/// Recompute the content hash of a stored event.
///
/// Returns `None` for tombstoned events — their payload is gone, so the
/// stored `content_hash` is the only commitment and verification checks
/// linkage and signature instead.
pub fn recompute_content_hash(event: &AuditEvent) -> Option<String> {
    let payload = event.body.payload()?;
    let content = CanonicalContent {
        kind: &event.kind,
        actor: &event.actor,
        correlation_id: &event.correlation_id,
        context: &event.context,
        outcome: &event.outcome,
        payload,
        retention_class: event.retention_class,
        policy_version: event.policy_version,
        recorded_at: &event.recorded_at,
    };
    Some(hash_fields(
        &event.id,
        &event.tenant_id,
        &event.partition,
        event.sequence,
        &event.prev_hash,
        &content,
    ))
}

/// The byte string an event's Ed25519 signature covers:
/// `content_hash ‖ prev_hash`, both as ASCII hex.
pub fn signing_payload(content_hash: &str, prev_hash: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(content_hash.len() + prev_hash.len());
    payload.extend_from_slice(content_hash.as_bytes());
    payload.extend_from_slice(prev_hash.as_bytes());
    payload
}

/// The chain value an event contributes to its successor:
/// `SHA-256(content_hash ‖ signature)` as lowercase hex.
pub fn chain_value(content_hash: &str, signature: &EventSignature) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(signature.signature.as_bytes());
    hex::encode(hasher.finalize())
}

/// The chain value of a stored event, from its recorded fields.
pub fn event_chain_value(event: &AuditEvent) -> String {
    chain_value(&event.content_hash, &event.signature)
}
