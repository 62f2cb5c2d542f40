//! Submission validation: shape checks with no side effects.
//!
//! The validator owns the tenant registry and one compiled JSON Schema per
//! event category. A submission that passes comes out as a
//! [`ValidatedEvent`] — parsed ids, a concrete [`EventKind`] — carrying no
//! retention information; enrichment is the pipeline's job.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde_json::json;
use tracing::debug;

use custos_contracts::{
    error::{AuditError, AuditResult},
    ids::{CorrelationId, EventId, PartitionId, TenantId},
    kind::{DataAccessType, EventCategory, EventKind},
    submission::{RawSubmission, ValidatedEvent},
};

/// Serialized payloads above this are rejected outright.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// The tenants allowed to submit events.
pub struct TenantRegistry {
    tenants: RwLock<HashSet<TenantId>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashSet::new()),
        }
    }

    pub fn register(&self, tenant: TenantId) {
        let mut tenants = self.tenants.write().expect("tenant registry lock poisoned");
        tenants.insert(tenant);
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        let tenants = self.tenants.read().expect("tenant registry lock poisoned");
        tenants.contains(tenant)
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates raw submissions against the declared event taxonomy and
/// per-category payload schemas.
pub struct SubmissionValidator {
    tenants: TenantRegistry,
    schemas: HashMap<EventCategory, jsonschema::Validator>,
    /// Extra structural requirements for data-access updates: the changed
    /// fields must be present as before/after objects.
    update_schema: jsonschema::Validator,
}

impl SubmissionValidator {
    /// Compile the per-category schemas. `AuditError::Config` if any schema
    /// fails to compile.
    pub fn new(tenants: TenantRegistry) -> AuditResult<Self> {
        let compile = |schema: serde_json::Value| {
            jsonschema::validator_for(&schema).map_err(|e| AuditError::Config {
                reason: format!("payload schema failed to compile: {e}"),
            })
        };

        let object_only = || json!({ "type": "object" });
        let mut schemas = HashMap::new();
        schemas.insert(EventCategory::Authentication, compile(object_only())?);
        schemas.insert(EventCategory::Authorization, compile(object_only())?);
        schemas.insert(
            EventCategory::DataAccess,
            compile(json!({
                "type": "object",
                "required": ["resource_type", "resource_id"],
                "properties": {
                    "resource_type": { "type": "string", "minLength": 1 },
                    "resource_id": { "type": "string", "minLength": 1 }
                }
            }))?,
        );
        schemas.insert(
            EventCategory::Clinical,
            compile(json!({
                "type": "object",
                "required": ["resident_id"],
                "properties": {
                    "resident_id": { "type": "string", "minLength": 1 }
                }
            }))?,
        );
        schemas.insert(EventCategory::SystemLifecycle, compile(object_only())?);
        schemas.insert(EventCategory::Security, compile(object_only())?);

        let update_schema = compile(json!({
            "type": "object",
            "required": ["before", "after"],
            "properties": {
                "before": { "type": "object" },
                "after": { "type": "object" }
            }
        }))?;

        Ok(Self {
            tenants,
            schemas,
            update_schema,
        })
    }

    pub fn tenants(&self) -> &TenantRegistry {
        &self.tenants
    }

    /// Validate one submission. No side effects; returns the first failure.
    pub fn validate(&self, raw: &RawSubmission) -> AuditResult<ValidatedEvent> {
        let tenant_id = TenantId::new(raw.tenant_id.clone());
        if !self.tenants.contains(&tenant_id) {
            return Err(AuditError::UnknownTenant {
                tenant_id: raw.tenant_id.clone(),
            });
        }

        if raw.submission_id.trim().is_empty() {
            return Err(AuditError::Validation {
                reason: "submission_id is required".to_string(),
            });
        }
        if raw.correlation_id.trim().is_empty() {
            return Err(AuditError::Validation {
                reason: "correlation_id is required".to_string(),
            });
        }
        if raw.actor.session_id.trim().is_empty() {
            return Err(AuditError::Validation {
                reason: "actor.session_id is required".to_string(),
            });
        }

        let kind = EventKind::parse(&raw.category, &raw.event_type).ok_or_else(|| {
            AuditError::Validation {
                reason: format!(
                    "unknown event kind '{}/{}'",
                    raw.category, raw.event_type
                ),
            }
        })?;

        if !raw.outcome.success && raw.outcome.failure_reason.is_none() {
            return Err(AuditError::Validation {
                reason: "failed outcomes must carry a failure_reason".to_string(),
            });
        }

        // Reserved partitions are written by internal components only.
        if let Some(partition) = &raw.partition {
            if partition.as_str() == PartitionId::SYSTEM
                || partition.as_str() == PartitionId::SECURITY
            {
                return Err(AuditError::Validation {
                    reason: format!("partition '{partition}' is reserved for internal events"),
                });
            }
        }

        let size = serde_json::to_vec(&raw.payload)
            .map_err(|e| AuditError::Validation {
                reason: format!("payload is not serializable: {e}"),
            })?
            .len();
        if size > MAX_PAYLOAD_BYTES {
            return Err(AuditError::Validation {
                reason: format!("payload of {size} bytes exceeds the {MAX_PAYLOAD_BYTES}-byte ceiling"),
            });
        }

        self.check_payload(kind, &raw.payload)?;

        debug!(
            tenant = %tenant_id,
            kind = %kind,
            submission = %raw.submission_id,
            "submission validated"
        );

        Ok(ValidatedEvent {
            id: EventId::new(),
            tenant_id,
            partition: raw.partition.clone().map(PartitionId::new),
            kind,
            actor: raw.actor.clone(),
            correlation_id: CorrelationId::new(raw.correlation_id.clone()),
            context: raw.context.clone(),
            outcome: raw.outcome.clone(),
            payload: raw.payload.clone(),
            occurred_at: raw.occurred_at,
        })
    }

    fn check_payload(&self, kind: EventKind, payload: &serde_json::Value) -> AuditResult<()> {
        if let Some(validator) = self.schemas.get(&kind.category()) {
            if let Some(error) = validator.iter_errors(payload).next() {
                return Err(AuditError::Validation {
                    reason: format!(
                        "payload violates the {} schema at {}: {error}",
                        kind.category(),
                        error.instance_path
                    ),
                });
            }
        }

        if kind == EventKind::DataAccess(DataAccessType::Update) {
            if let Some(error) = self.update_schema.iter_errors(payload).next() {
                return Err(AuditError::Validation {
                    reason: format!(
                        "update payloads must carry before/after objects: {error}"
                    ),
                });
            }
        }

        Ok(())
    }
}
