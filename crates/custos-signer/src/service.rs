//! Sealing and verifying individual events and whole segments.

use std::sync::Arc;

use ed25519_dalek::{Signature, Signer as _, Verifier as _};
use tracing::debug;

use custos_contracts::{
    error::{AuditError, AuditResult},
    event::{AuditEvent, EventBody, EventSignature},
    submission::NormalizedEvent,
};

use crate::{
    chain::{self, recompute_content_hash, signing_payload},
    keys::{KeyRegistry, KeyStatus},
};

/// Seals normalized events into signed ledger entries and re-verifies
/// stored ones.
///
/// Sealing is deterministic given identical inputs and key: Ed25519 is a
/// deterministic signature scheme and the canonical content serialization
/// is stable.
pub struct SigningService {
    registry: Arc<KeyRegistry>,
}

impl SigningService {
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Seal a normalized event at `sequence` behind `prev_hash`.
    ///
    /// Computes the content hash, signs `content_hash ‖ prev_hash` with the
    /// tenant's active key (system-wide fallback), and assembles the full
    /// `AuditEvent`. Fails closed with `AuditError::Signing` when no key is
    /// available — the event must not be persisted unsigned.
    pub fn seal(
        &self,
        event: NormalizedEvent,
        sequence: u64,
        prev_hash: &str,
    ) -> AuditResult<AuditEvent> {
        let (key_id, signing_key) = self.registry.active_key_for(&event.tenant_id)?;

        let content_hash = chain::content_hash(&event, sequence, prev_hash);
        let payload = signing_payload(&content_hash, prev_hash);
        let signature = signing_key.sign(&payload);

        debug!(
            event_id = %event.id,
            tenant = %event.tenant_id,
            partition = %event.partition,
            sequence,
            key_id = %key_id,
            "event sealed"
        );

        Ok(AuditEvent {
            id: event.id,
            tenant_id: event.tenant_id,
            partition: event.partition,
            sequence,
            kind: event.kind,
            actor: event.actor,
            correlation_id: event.correlation_id,
            context: event.context,
            outcome: event.outcome,
            body: EventBody::Live {
                payload: event.payload,
            },
            retention_class: event.retention_class,
            policy_version: event.policy_version,
            recorded_at: event.recorded_at,
            prev_hash: prev_hash.to_string(),
            content_hash,
            signature: EventSignature {
                key_id,
                signature: hex::encode(signature.to_bytes()),
            },
        })
    }

    /// Verify one stored event's content hash and signature.
    ///
    /// For live events the content hash is recomputed and compared; for
    /// tombstones the stored hash is the commitment and only the signature
    /// is checked (it covers the hash, not the erased content, so it
    /// survives disposal). Returns the failure reason on divergence.
    pub fn verify_event(&self, event: &AuditEvent) -> Result<(), String> {
        if let Some(recomputed) = recompute_content_hash(event) {
            if recomputed != event.content_hash {
                return Err(format!(
                    "content hash mismatch: stored {}, recomputed {}",
                    event.content_hash, recomputed
                ));
            }
        }

        let (verifying_key, status) = self
            .registry
            .verifying_key(&event.signature.key_id)
            .ok_or_else(|| format!("signing key '{}' not in registry", event.signature.key_id))?;

        if status == KeyStatus::Revoked {
            return Err(format!(
                "signing key '{}' is revoked",
                event.signature.key_id
            ));
        }

        let sig_bytes: [u8; 64] = hex::decode(&event.signature.signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| "signature is not 64 hex-encoded bytes".to_string())?;
        let signature = Signature::from_bytes(&sig_bytes);

        let payload = signing_payload(&event.content_hash, &event.prev_hash);
        verifying_key
            .verify(&payload, &signature)
            .map_err(|_| "signature does not verify against recorded key".to_string())
    }

    /// Verify a whole segment against its chain anchor.
    ///
    /// `anchor` is the expected `prev_hash` of the first event: the genesis
    /// sentinel, or the prior partition's terminal chain value for chained
    /// partitions. Used by the storage manager to check a migrated copy
    /// before the index switches tiers.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::ChainIntegrity` naming the first divergent
    /// sequence.
    pub fn verify_segment(&self, events: &[AuditEvent], anchor: &str) -> AuditResult<()> {
        let mut expected_prev = anchor.to_string();

        for event in events {
            let fault = |reason: String| AuditError::ChainIntegrity {
                tenant: event.tenant_id.clone(),
                partition: event.partition.clone(),
                sequence: event.sequence,
                reason,
            };

            if event.prev_hash != expected_prev {
                return Err(fault(format!(
                    "prev_hash {} does not match expected chain value {}",
                    event.prev_hash, expected_prev
                )));
            }

            self.verify_event(event).map_err(fault)?;

            expected_prev = chain::event_chain_value(event);
        }

        Ok(())
    }
}
