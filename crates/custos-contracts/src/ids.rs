//! Identifier newtypes used across the CUSTOS workspace.
//!
//! Every identifier is a distinct type so a tenant id can never be passed
//! where a partition id is expected. All of them serialize transparently.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for an isolated organizational customer.
///
/// Every event, partition, key scope, and query is bound to exactly one
/// tenant. Example: `TenantId("sunrise-care-group")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique identifier for a single audit event, assigned at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    /// Create a new, unique event ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier linking causally related events from one originating request.
///
/// Propagated end-to-end by collaborators; CUSTOS never generates one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one contiguous shard of a tenant's ledger.
///
/// Regular event traffic is sharded by month (`"2026-08"`). Two reserved
/// partitions exist per tenant: [`PartitionId::SYSTEM`] receives internally
/// generated lifecycle events (disposal certificates, tier migrations) and
/// [`PartitionId::SECURITY`] receives security incident events, so pipeline
/// and integrity failures land on a chain that is unaffected by the failure
/// being reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub String);

impl PartitionId {
    /// Reserved partition for internally generated lifecycle events.
    pub const SYSTEM: &'static str = "system";

    /// Reserved partition for security incident events.
    pub const SECURITY: &'static str = "security";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The month shard a timestamp falls into, e.g. `"2026-08"`.
    pub fn month_shard(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn security() -> Self {
        Self(Self::SECURITY.to_string())
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a signing key in the key registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (tenant, partition) pair addressing one ledger partition.
///
/// This is the unit of single-writer concurrency: appends to the same key
/// are serialized, appends to different keys never contend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub tenant: TenantId,
    pub partition: PartitionId,
}

impl PartitionKey {
    pub fn new(tenant: TenantId, partition: PartitionId) -> Self {
        Self { tenant, partition }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.partition)
    }
}
