//! Tenant-scoped, role-redacted reads over the ledger.
//!
//! Scoping order is deliberate: the tenant boundary is applied before any
//! caller-supplied filter, so no filter expression can widen a query
//! across tenants. Redaction happens last, on the copies leaving the
//! service — clinical payloads and `phi`-marked subtrees never reach a
//! caller whose role does not clear them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use custos_contracts::{
    error::{AuditError, AuditResult},
    event::{AuditEvent, EventBody},
    ids::{CorrelationId, PartitionId, PartitionKey, TenantId},
    kind::EventCategory,
};
use custos_ledger::TenantLedger;

/// The payload subtree key treated as protected health information.
const PHI_KEY: &str = "phi";

/// What the caller's role is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessRole {
    /// Clinical staff: full payload access, including clinical events.
    Clinician,

    /// Compliance auditors: every event, clinical payloads redacted.
    Auditor,

    /// Platform operators: every event, clinical payloads redacted.
    Administrator,
}

impl AccessRole {
    fn sees_clinical_payloads(&self) -> bool {
        matches!(self, AccessRole::Clinician)
    }
}

/// Caller-supplied narrowing. Everything is optional; an empty filter
/// returns the whole partition (paged).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    pub categories: Option<Vec<EventCategory>>,
    pub correlation_id: Option<CorrelationId>,
    pub recorded_after: Option<DateTime<Utc>>,
    pub recorded_before: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub user_id: Option<String>,
}

impl QueryFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(categories) = &self.categories {
            if !categories.contains(&event.kind.category()) {
                return false;
            }
        }
        if let Some(correlation) = &self.correlation_id {
            if &event.correlation_id != correlation {
                return false;
            }
        }
        if let Some(after) = self.recorded_after {
            if event.recorded_at < after {
                return false;
            }
        }
        if let Some(before) = self.recorded_before {
            if event.recorded_at >= before {
                return false;
            }
        }
        if let Some(success) = self.success {
            if event.outcome.success != success {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if event.actor.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Resumable position within one partition: everything with a sequence
/// greater than `after_sequence` is still unread. Stable under concurrent
/// appends — new events only ever land after the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub partition: PartitionId,
    pub after_sequence: Option<u64>,
}

impl Cursor {
    /// The start of a partition.
    pub fn start(partition: PartitionId) -> Self {
        Self {
            partition,
            after_sequence: None,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub events: Vec<AuditEvent>,

    /// Present when more events matched than `limit`; feed it back in to
    /// continue where this page stopped.
    pub next_cursor: Option<Cursor>,
}

/// Read access for auditors, compliance officers, and tenant staff.
pub struct QueryService {
    ledger: Arc<TenantLedger>,
}

impl QueryService {
    pub fn new(ledger: Arc<TenantLedger>) -> Self {
        Self { ledger }
    }

    /// One page of events from a tenant partition.
    pub fn query(
        &self,
        tenant: &TenantId,
        filter: &QueryFilter,
        role: AccessRole,
        cursor: &Cursor,
        limit: usize,
    ) -> AuditResult<QueryPage> {
        if limit == 0 {
            return Err(AuditError::Query {
                reason: "limit must be at least 1".to_string(),
            });
        }

        let key = PartitionKey::new(tenant.clone(), cursor.partition.clone());
        let segment = self.ledger.snapshot(&key)?;

        let after = cursor.after_sequence;
        let mut matched = segment
            .events
            .into_iter()
            // Tenant boundary first; the partition key already scopes the
            // read, this guards against a mis-stored segment.
            .filter(|e| &e.tenant_id == tenant)
            .filter(|e| after.map_or(true, |s| e.sequence > s))
            .filter(|e| filter.matches(e));

        let mut events: Vec<AuditEvent> = Vec::with_capacity(limit);
        for event in matched.by_ref() {
            events.push(redact(event, role));
            if events.len() == limit {
                break;
            }
        }

        let next_cursor = if matched.next().is_some() {
            events.last().map(|last| Cursor {
                partition: cursor.partition.clone(),
                after_sequence: Some(last.sequence),
            })
        } else {
            None
        };

        debug!(
            tenant = %tenant,
            partition = %cursor.partition,
            returned = events.len(),
            more = next_cursor.is_some(),
            "query page served"
        );

        Ok(QueryPage { events, next_cursor })
    }

    /// A restartable iterator over every matching event, page by page, in
    /// sequence order.
    pub fn iter<'a>(
        &'a self,
        tenant: &'a TenantId,
        filter: &'a QueryFilter,
        role: AccessRole,
        partition: PartitionId,
        page_size: usize,
    ) -> QueryIter<'a> {
        QueryIter {
            service: self,
            tenant,
            filter,
            role,
            page_size,
            cursor: Some(Cursor::start(partition)),
            buffer: Vec::new(),
        }
    }
}

/// Pages through a query until the partition is exhausted. Errors end the
/// iteration after being yielded once.
pub struct QueryIter<'a> {
    service: &'a QueryService,
    tenant: &'a TenantId,
    filter: &'a QueryFilter,
    role: AccessRole,
    page_size: usize,
    cursor: Option<Cursor>,
    buffer: Vec<AuditEvent>,
}

impl Iterator for QueryIter<'_> {
    type Item = AuditResult<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.buffer.is_empty() {
                return Some(Ok(self.buffer.remove(0)));
            }
            let cursor = self.cursor.take()?;
            match self
                .service
                .query(self.tenant, self.filter, self.role, &cursor, self.page_size)
            {
                Ok(page) => {
                    if page.events.is_empty() {
                        return None;
                    }
                    self.buffer = page.events;
                    self.cursor = page.next_cursor;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Strip what the role may not see. Clinical payloads are replaced whole;
/// `phi`-keyed subtrees are removed from any payload.
fn redact(mut event: AuditEvent, role: AccessRole) -> AuditEvent {
    if role.sees_clinical_payloads() {
        return event;
    }

    if let EventBody::Live { payload } = &mut event.body {
        if event.kind.category() == EventCategory::Clinical {
            *payload = serde_json::json!({ "redacted": "clinical payload withheld by role" });
        } else {
            redact_phi(payload);
        }
    }
    event
}

fn redact_phi(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.contains_key(PHI_KEY) {
                map.insert(
                    PHI_KEY.to_string(),
                    serde_json::Value::String("[redacted]".to_string()),
                );
            }
            for (_, v) in map.iter_mut() {
                redact_phi(v);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                redact_phi(item);
            }
        }
        _ => {}
    }
}
