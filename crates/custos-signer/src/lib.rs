//! # custos-signer
//!
//! Canonical hashing, hash-chain primitives, and Ed25519 signing for the
//! CUSTOS audit ledger.
//!
//! ## Overview
//!
//! Each audit event commits to its content via a SHA-256 content hash and
//! to its predecessor via a chain value of `SHA-256(content_hash ‖
//! signature)`. The signature covers `content_hash ‖ prev_hash`, produced
//! with the tenant's active Ed25519 key (system-wide fallback). Key
//! rotation retires old keys without orphaning the events they signed.
//!
//! Signing is fail-closed: no key available means the event is not
//! persisted, and the caller retries.

pub mod chain;
pub mod keys;
pub mod service;

pub use chain::{
    chain_value, content_hash, event_chain_value, recompute_content_hash, signing_payload,
    GENESIS_HASH,
};
pub use keys::{KeyRegistry, KeyStatus};
pub use service::SigningService;

// ── Tests ─────────────────────────────────────────────────────────────────────
