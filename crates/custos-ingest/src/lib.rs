//! # custos-ingest
//!
//! The write path of the CUSTOS audit ledger: submission validation
//! (taxonomy, payload schemas, tenant registry) and the ingestion
//! pipeline (idempotency, enrichment, bounded retry, dead-letter).

pub mod pipeline;
pub mod validate;

pub use pipeline::{DeadLetter, IngestPipeline};
pub use validate::{SubmissionValidator, TenantRegistry, MAX_PAYLOAD_BYTES};

// ── Tests ─────────────────────────────────────────────────────────────────────
