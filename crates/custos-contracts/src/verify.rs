//! Chain verification report types.
//!
//! Produced by the verification service when an auditor or incident
//! responder re-validates a range of a tenant partition.

use serde::{Deserialize, Serialize};

use crate::ids::{PartitionId, TenantId};

/// The result of verifying a range of one partition's hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub tenant_id: TenantId,
    pub partition: PartitionId,

    /// The inclusive range that was verified.
    pub from: u64,
    pub to: u64,

    /// True only if every event in range passed every check.
    pub ok: bool,

    /// The first sequence number at which the chain diverges, if any.
    /// Everything before this point is intact.
    pub first_divergence: Option<u64>,

    /// Events whose content hash was recomputed and signature checked.
    pub checked: u64,

    /// Tombstoned events, verified by linkage and certificate only.
    pub disposed: u64,

    /// Every failure found in the range, in sequence order.
    pub failures: Vec<VerificationFailure>,
}

/// A single check failure within a [`VerificationReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFailure {
    /// The sequence number of the offending event.
    pub sequence: u64,

    /// Human-readable explanation of what diverged.
    pub reason: String,
}
