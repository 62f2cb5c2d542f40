//! Event categories and their fixed sub-type enumerations.
//!
//! `EventKind` is the tagged variant carried on every audit event. A
//! sub-type outside its category's enumeration is unrepresentable — the
//! validator converts raw `(category, type)` strings via [`EventKind::parse`]
//! and rejects anything that does not name a declared variant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The six top-level audit event categories.
///
/// `EventCategory` is the plain discriminant used by retention policy rules
/// and query filters; the full sub-type lives in [`EventKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    Authentication,
    Authorization,
    DataAccess,
    Clinical,
    SystemLifecycle,
    Security,
}

impl EventCategory {
    /// All categories, in declaration order.
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Authentication,
        EventCategory::Authorization,
        EventCategory::DataAccess,
        EventCategory::Clinical,
        EventCategory::SystemLifecycle,
        EventCategory::Security,
    ];

    /// The kebab-case name used in raw submissions and policy files.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::Authorization => "authorization",
            EventCategory::DataAccess => "data-access",
            EventCategory::Clinical => "clinical",
            EventCategory::SystemLifecycle => "system-lifecycle",
            EventCategory::Security => "security",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-types of [`EventCategory::Authentication`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticationType {
    Login,
    Logout,
    LoginFailed,
    TokenIssued,
    PasswordChanged,
}

/// Sub-types of [`EventCategory::Authorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationType {
    AccessGranted,
    AccessDenied,
    RoleAssigned,
    RoleRevoked,
}

/// Sub-types of [`EventCategory::DataAccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataAccessType {
    Create,
    Read,
    Update,
    Delete,
    Export,
}

/// Sub-types of [`EventCategory::Clinical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClinicalType {
    MedicationAdministered,
    AssessmentRecorded,
    CarePlanUpdated,
    VitalsRecorded,
    IncidentReported,
}

/// Sub-types of [`EventCategory::SystemLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemLifecycleType {
    Startup,
    Shutdown,
    ConfigChanged,
    PolicyPublished,
    PartitionOpened,
    TierMigrated,
    Disposal,
}

/// Sub-types of [`EventCategory::Security`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityType {
    IntegrityAlert,
    PipelineFailure,
    ComplianceAlert,
    KeyRotated,
    SuspiciousActivity,
}

/// The full (category, sub-type) tag carried on every audit event.
///
/// Serializes as `{"category": "data-access", "type": "update"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", content = "type", rename_all = "kebab-case")]
pub enum EventKind {
    Authentication(AuthenticationType),
    Authorization(AuthorizationType),
    DataAccess(DataAccessType),
    Clinical(ClinicalType),
    SystemLifecycle(SystemLifecycleType),
    Security(SecurityType),
}

impl EventKind {
    /// The category discriminant of this kind.
    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::Authentication(_) => EventCategory::Authentication,
            EventKind::Authorization(_) => EventCategory::Authorization,
            EventKind::DataAccess(_) => EventCategory::DataAccess,
            EventKind::Clinical(_) => EventCategory::Clinical,
            EventKind::SystemLifecycle(_) => EventCategory::SystemLifecycle,
            EventKind::Security(_) => EventCategory::Security,
        }
    }

    /// Parse raw `(category, type)` strings from a submission.
    ///
    /// Returns `None` when the category is unknown or the type is not a
    /// member of that category's enumeration — the validator turns this
    /// into `AuditError::Validation`.
    pub fn parse(category: &str, event_type: &str) -> Option<EventKind> {
        // Round-trip through the serde representation so the accepted
        // strings are exactly the kebab-case variant names above.
        let tagged = serde_json::json!({ "category": category, "type": event_type });
        serde_json::from_value(tagged).ok()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "data-access/update" form, used in logs and error messages.
        let type_name = match serde_json::to_value(self) {
            Ok(v) => v
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string(),
            Err(_) => "unknown".to_string(),
        };
        write!(f, "{}/{}", self.category(), type_name)
    }
}
