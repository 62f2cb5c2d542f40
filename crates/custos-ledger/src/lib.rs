//! # custos-ledger
//!
//! Per-tenant, per-partition single-writer append-only ledger for the
//! CUSTOS audit engine, over pluggable tiered segment stores.
//!
//! ## Overview
//!
//! A partition is the unit of ordering and of concurrency control: appends
//! to one partition are serialized behind its mutex and assigned contiguous
//! sequence numbers; reads are concurrent and snapshot-based. The partition
//! index records which tier holds each segment, the committed tail, and
//! lifecycle flags (halted, disposed) — background jobs resume from it
//! after a crash.

pub mod index;
pub mod ledger;
pub mod segment;

pub use index::{PartitionIndex, PartitionRecord};
pub use ledger::{LedgerTail, TenantLedger};
pub use segment::{InMemorySegmentStore, PartitionSegment, SegmentStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
