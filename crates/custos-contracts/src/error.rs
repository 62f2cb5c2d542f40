//! Error taxonomy for the CUSTOS audit engine.
//!
//! All fallible operations return `AuditResult<T>`. Variants carry enough
//! context to produce actionable security incident events — integrity and
//! disposal failures are never swallowed, they surface as new, separately
//! chained audit events.

use thiserror::Error;

use crate::ids::{PartitionId, TenantId};

/// The unified error type for the CUSTOS crates.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A submission was malformed. Recoverable locally: the caller corrects
    /// and resubmits.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The submission named a tenant the platform does not know.
    #[error("unknown tenant '{tenant_id}'")]
    UnknownTenant { tenant_id: String },

    /// A signing key was unavailable or signing failed.
    ///
    /// Fail-closed: the event is NOT persisted. The pipeline retries with a
    /// bounded budget rather than silently dropping.
    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// The hash chain of a partition is broken.
    ///
    /// Fatal to the affected range — the partition is halted for writes
    /// pending investigation and a Security incident event is raised on a
    /// separate, unaffected partition.
    #[error("chain integrity violation in {tenant}/{partition} at sequence {sequence}: {reason}")]
    ChainIntegrity {
        tenant: TenantId,
        partition: PartitionId,
        sequence: u64,
        reason: String,
    },

    /// A write was attempted against a halted partition.
    #[error("partition {tenant}/{partition} is halted pending integrity investigation")]
    PartitionHalted {
        tenant: TenantId,
        partition: PartitionId,
    },

    /// A tier migration could not complete. The partition stays on its
    /// source tier; the migration is retried on the next pass.
    #[error("storage migration failed for {tenant}/{partition}: {reason}")]
    StorageMigration {
        tenant: TenantId,
        partition: PartitionId,
        reason: String,
    },

    /// The retention sweep could not dispose a due range.
    #[error("disposal failed: {reason}")]
    Disposal { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A read request was malformed (bad range, bad cursor).
    #[error("query error: {reason}")]
    Query { reason: String },
}

/// Convenience alias used throughout the CUSTOS crates.
pub type AuditResult<T> = Result<T, AuditError>;
