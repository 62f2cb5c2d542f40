//! Retention classes, storage tiers, and disposal certificate types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, KeyId, PartitionId, TenantId};

/// The retention class stamped on every event at ingestion.
///
/// Derived from the event category by the active retention policy; the
/// class plus the policy version recorded on the event fix the disposal
/// deadline for the event's whole life, even after newer policies publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionClass {
    /// Clinical and care documentation (longest regulatory hold).
    ClinicalRecord,
    /// Authentication and authorization decisions.
    AccessControl,
    /// Data mutations and exports.
    DataLifecycle,
    /// System lifecycle events (startup, config, migrations).
    Operational,
    /// Security incidents and integrity alerts.
    SecurityIncident,
}

/// Storage class a partition currently resides in.
///
/// Mutable metadata tracked in the partition index — a tier change never
/// touches `content_hash` or `signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageTier {
    /// Immediate read/write, the only tier appends go to.
    Hot,
    /// Nearline; reads are still served directly.
    Warm,
    /// Archival; higher retrieval latency, lowest cost.
    Cold,
}

/// How content is erased when a retention deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisposalMethod {
    /// Replace each event's content with a tombstone referencing the
    /// certificate; hashes and signatures stay in place so the chain
    /// remains verifiable across the disposed region.
    CryptographicErasure,
    /// Drop the whole partition segment once every event in it is past
    /// deadline. The index keeps the terminal hash and the certificate.
    PhysicalDeletion,
}

/// Proof of lawful, irreversible erasure of a range of events.
///
/// Serialized as the payload of a `SystemLifecycle::Disposal` audit event
/// appended to the tenant's system partition, so the proof itself is
/// chained and signed — disposal is provable without retaining the
/// disposed content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisposalCertificate {
    /// Unique identifier; tombstones reference this.
    pub certificate_id: EventId,

    /// The tenant whose events were disposed.
    pub tenant_id: TenantId,

    /// The partition the disposed events lived in.
    pub partition: PartitionId,

    /// Sequence numbers of the disposed events, ascending.
    pub sequences: Vec<u64>,

    /// The erasure method that was executed.
    pub method: DisposalMethod,

    /// Retention policy version the deadline was computed from.
    pub policy_version: u32,

    /// Wall-clock time (UTC) the disposal was executed.
    pub disposed_at: DateTime<Utc>,

    /// The signing key that sealed the certificate event.
    pub key_id: KeyId,
}
