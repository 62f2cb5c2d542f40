//! The ingestion pipeline: validate, enrich, sign, append.
//!
//! Submissions are idempotent on the caller-supplied `submission_id` —
//! a resubmission after a timeout returns the original receipt, never a
//! second ledger entry. Transient signing failures get a bounded retry
//! budget; exhaustion moves the submission to the dead-letter store and
//! raises a pipeline-failure incident on the tenant's security partition.
//! Dropping an audit event silently is never an option.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use custos_contracts::{
    error::{AuditError, AuditResult},
    event::AppendReceipt,
    ids::{CorrelationId, PartitionId, PartitionKey, TenantId},
    kind::{EventCategory, EventKind, SecurityType},
    submission::{NormalizedEvent, RawSubmission, SubmitResponse, ValidatedEvent},
};
use custos_ledger::TenantLedger;
use custos_retention::RetentionPolicySet;
use custos_signer::SigningService;

use crate::validate::SubmissionValidator;

/// How many times an append is retried on a transient signing failure.
const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Bounded per-partition queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A submission the pipeline could not commit.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub submission: RawSubmission,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// State of one (tenant, submission_id) in the receipt map. `Pending`
/// reserves the id before the append, so two concurrent submits of the
/// same id can never both reach the ledger.
enum ReceiptEntry {
    Pending,
    Committed(AppendReceipt),
}

/// The write path every audit event enters through.
pub struct IngestPipeline {
    validator: SubmissionValidator,
    ledger: Arc<TenantLedger>,
    signer: Arc<SigningService>,
    policies: Arc<RetentionPolicySet>,
    /// (tenant, submission_id) → in-flight claim or committed receipt.
    receipts: RwLock<HashMap<(TenantId, String), ReceiptEntry>>,
    queues: Mutex<HashMap<PartitionKey, VecDeque<(RawSubmission, ValidatedEvent)>>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    retry_budget: u32,
    queue_capacity: usize,
}

impl IngestPipeline {
    pub fn new(
        validator: SubmissionValidator,
        ledger: Arc<TenantLedger>,
        signer: Arc<SigningService>,
        policies: Arc<RetentionPolicySet>,
    ) -> Self {
        Self {
            validator,
            ledger,
            signer,
            policies,
            receipts: RwLock::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(Vec::new()),
            retry_budget: DEFAULT_RETRY_BUDGET,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn validator(&self) -> &SubmissionValidator {
        &self.validator
    }

    /// Submissions the pipeline gave up on, for operator inspection.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .expect("dead letter lock poisoned")
            .clone()
    }

    /// Validate, enrich, sign, and append one submission synchronously.
    pub fn submit(&self, raw: RawSubmission) -> SubmitResponse {
        let idempotency_key = (TenantId::new(raw.tenant_id.clone()), raw.submission_id.clone());
        if let Some(receipt) = self.lookup_receipt(&idempotency_key) {
            info!(
                submission = %raw.submission_id,
                sequence = receipt.sequence,
                "duplicate submission; returning original receipt"
            );
            return SubmitResponse::Accepted { receipt };
        }

        let validated = match self.validator.validate(&raw) {
            Ok(v) => v,
            Err(e) => {
                return SubmitResponse::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        self.commit(raw, validated)
    }

    /// Queue a submission for a later [`drain`](Self::drain) instead of
    /// committing inline — the backpressure fallback when a caller cannot
    /// wait out the synchronous path. Validation and idempotency still
    /// answer synchronously; only the sealed append is deferred. Overflow
    /// dead-letters the submission.
    pub fn enqueue(&self, raw: RawSubmission) -> SubmitResponse {
        let idempotency_key = (TenantId::new(raw.tenant_id.clone()), raw.submission_id.clone());
        if let Some(receipt) = self.lookup_receipt(&idempotency_key) {
            return SubmitResponse::Accepted { receipt };
        }

        let validated = match self.validator.validate(&raw) {
            Ok(v) => v,
            Err(e) => {
                return SubmitResponse::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        let key = Self::queue_key(&validated);
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        let queue = queues.entry(key.clone()).or_default();
        if queue.len() >= self.queue_capacity {
            drop(queues);
            warn!(partition = %key, "partition queue full");
            self.dead_letter(raw, &key, "partition queue full");
            return SubmitResponse::Rejected {
                reason: "partition queue full; submission dead-lettered".to_string(),
            };
        }

        let submission_id = raw.submission_id.clone();
        queue.push_back((raw, validated));
        SubmitResponse::Queued { submission_id }
    }

    /// Commit everything queued for one partition, in arrival order.
    ///
    /// At-least-once with duplicates collapsed by idempotency: a drain that
    /// races a direct submit of the same submission_id still yields exactly
    /// one ledger entry.
    pub fn drain(&self, key: &PartitionKey) -> Vec<SubmitResponse> {
        let pending: Vec<(RawSubmission, ValidatedEvent)> = {
            let mut queues = self.queues.lock().expect("queue lock poisoned");
            queues
                .get_mut(key)
                .map(|q| q.drain(..).collect())
                .unwrap_or_default()
        };

        pending
            .into_iter()
            .map(|(raw, validated)| self.commit(raw, validated))
            .collect()
    }

    /// Enrich, sign, and append one validated submission, guarded by the
    /// idempotency claim.
    fn commit(&self, raw: RawSubmission, validated: ValidatedEvent) -> SubmitResponse {
        let idempotency_key = (validated.tenant_id.clone(), raw.submission_id.clone());

        // Reserve the id before touching the ledger. The claim is released
        // on failure so a later retry can go again.
        {
            let mut receipts = self.receipts.write().expect("receipt map lock poisoned");
            match receipts.get(&idempotency_key) {
                Some(ReceiptEntry::Committed(receipt)) => {
                    return SubmitResponse::Accepted {
                        receipt: receipt.clone(),
                    }
                }
                Some(ReceiptEntry::Pending) => {
                    return SubmitResponse::Rejected {
                        reason: format!(
                            "submission {} is already in flight; retry for its receipt",
                            raw.submission_id
                        ),
                    }
                }
                None => {
                    receipts.insert(idempotency_key.clone(), ReceiptEntry::Pending);
                }
            }
        }

        let event = self.enrich(validated);
        let key = PartitionKey::new(event.tenant_id.clone(), event.partition.clone());

        match self.append_with_retry(&key, &event) {
            Ok(receipt) => {
                self.receipts
                    .write()
                    .expect("receipt map lock poisoned")
                    .insert(idempotency_key, ReceiptEntry::Committed(receipt.clone()));
                SubmitResponse::Accepted { receipt }
            }
            Err(e) => {
                self.receipts
                    .write()
                    .expect("receipt map lock poisoned")
                    .remove(&idempotency_key);
                let reason = e.to_string();
                if matches!(e, AuditError::Signing { .. }) {
                    self.dead_letter(raw, &key, &reason);
                    SubmitResponse::Rejected {
                        reason: format!("retry budget exhausted; submission dead-lettered: {reason}"),
                    }
                } else {
                    SubmitResponse::Rejected { reason }
                }
            }
        }
    }

    fn lookup_receipt(&self, key: &(TenantId, String)) -> Option<AppendReceipt> {
        match self
            .receipts
            .read()
            .expect("receipt map lock poisoned")
            .get(key)
        {
            Some(ReceiptEntry::Committed(receipt)) => Some(receipt.clone()),
            _ => None,
        }
    }

    /// Stamp the active policy's retention class and version, the server
    /// clock, and the month-shard partition default.
    fn enrich(&self, validated: ValidatedEvent) -> NormalizedEvent {
        let active = self.policies.active();
        let now = Utc::now();
        let recorded_at = validated.occurred_at.unwrap_or(now);
        let partition = validated
            .partition
            .unwrap_or_else(|| PartitionId::month_shard(recorded_at));
        let retention_class = active
            .class_for(validated.kind.category())
            .unwrap_or(custos_contracts::retention::RetentionClass::Operational);

        NormalizedEvent {
            id: validated.id,
            tenant_id: validated.tenant_id,
            partition,
            kind: validated.kind,
            actor: validated.actor,
            correlation_id: validated.correlation_id,
            context: validated.context,
            outcome: validated.outcome,
            payload: validated.payload,
            retention_class,
            policy_version: active.version,
            recorded_at,
        }
    }

    fn append_with_retry(
        &self,
        key: &PartitionKey,
        event: &NormalizedEvent,
    ) -> AuditResult<AppendReceipt> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.ledger.append(key, |sequence, prev| {
                self.signer.seal(event.clone(), sequence, prev)
            });
            match result {
                Ok(receipt) => return Ok(receipt),
                Err(e @ AuditError::Signing { .. }) if attempt < self.retry_budget => {
                    warn!(
                        partition = %key,
                        attempt,
                        error = %e,
                        "signing failed; retrying append"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The partition a validated submission will land on, mirroring the
    /// enrichment default.
    fn queue_key(validated: &ValidatedEvent) -> PartitionKey {
        let partition = validated.partition.clone().unwrap_or_else(|| {
            PartitionId::month_shard(validated.occurred_at.unwrap_or_else(Utc::now))
        });
        PartitionKey::new(validated.tenant_id.clone(), partition)
    }

    /// Park a submission and raise a pipeline-failure incident on the
    /// tenant's security partition.
    fn dead_letter(&self, raw: RawSubmission, key: &PartitionKey, reason: &str) {
        warn!(
            partition = %key,
            submission = %raw.submission_id,
            reason,
            "submission dead-lettered"
        );
        let submission_id = raw.submission_id.clone();
        self.dead_letters
            .lock()
            .expect("dead letter lock poisoned")
            .push(DeadLetter {
                submission: raw,
                reason: reason.to_string(),
                at: Utc::now(),
            });

        let active = self.policies.active();
        let retention_class = match active.class_for(EventCategory::Security) {
            Ok(class) => class,
            Err(_) => custos_contracts::retention::RetentionClass::SecurityIncident,
        };
        let incident = NormalizedEvent::internal(
            "ingest-pipeline",
            key.tenant.clone(),
            PartitionId::security(),
            EventKind::Security(SecurityType::PipelineFailure),
            serde_json::json!({
                "submission_id": submission_id,
                "partition": key.partition.0,
                "reason": reason,
            }),
            retention_class,
            active.version,
            CorrelationId::new(format!("dead-letter:{submission_id}")),
        );

        let security_key = PartitionKey::new(key.tenant.clone(), PartitionId::security());
        if let Err(e) = self.ledger.append(&security_key, |sequence, prev| {
            self.signer.seal(incident, sequence, prev)
        }) {
            // The dead-letter entry itself is the durable record here.
            warn!(error = %e, "failed to record pipeline-failure incident");
        }
    }
}
