//! Retention policy configuration and versioning.
//!
//! A `RetentionPolicy` is deserialized from TOML and maps every event
//! category to a retention class, a retention period, and a disposal
//! method, plus the age thresholds driving tier migration. Policies are
//! versioned and never silently rewritten: publishing a new version applies
//! prospectively, and events keep being judged by the version stamped on
//! them at ingestion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use custos_contracts::{
    error::{AuditError, AuditResult},
    kind::EventCategory,
    retention::{DisposalMethod, RetentionClass, StorageTier},
};

/// Retention rule for one event category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// The class stamped on events of this category at ingestion.
    pub retention_class: RetentionClass,

    /// Days the event must be kept before it may be disposed.
    pub retention_days: u32,

    /// How content is erased once the deadline passes.
    pub disposal_method: DisposalMethod,
}

/// Age thresholds (days since the partition opened) driving tier
/// migration: `[0, hot_days)` Hot, `[hot_days, warm_days)` Warm, beyond
/// that Cold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    pub hot_days: u32,
    pub warm_days: u32,
}

impl TierThresholds {
    /// The tier a partition of the given age belongs on.
    pub fn tier_for_age_days(&self, age_days: i64) -> StorageTier {
        if age_days < i64::from(self.hot_days) {
            StorageTier::Hot
        } else if age_days < i64::from(self.warm_days) {
            StorageTier::Warm
        } else {
            StorageTier::Cold
        }
    }
}

/// One immutable, versioned retention policy.
///
/// Example TOML:
/// ```toml
/// version = 1
/// effective_from = "2026-01-01T00:00:00Z"
///
/// [tiers]
/// hot_days = 90
/// warm_days = 730
///
/// [categories.authentication]
/// retention_class = "access-control"
/// retention_days = 2555
/// disposal_method = "cryptographic-erasure"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub version: u32,
    pub effective_from: DateTime<Utc>,
    pub tiers: TierThresholds,
    pub categories: HashMap<EventCategory, CategoryPolicy>,
}

impl RetentionPolicy {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `AuditError::Config` if the TOML is malformed, a category is
    /// missing, or a duration is zero.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let policy: RetentionPolicy = toml::from_str(s).map_err(|e| AuditError::Config {
            reason: format!("failed to parse retention policy TOML: {e}"),
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read the file at `path` and parse it as a retention policy.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::Config {
            reason: format!("failed to read policy file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The organization-wide baseline: regulation-driven periods per
    /// category (3–10 years), 90-day hot window, 2-year warm window.
    pub fn standard() -> Self {
        let mut categories = HashMap::new();
        let mut rule = |category: EventCategory,
                        retention_class: RetentionClass,
                        retention_days: u32,
                        disposal_method: DisposalMethod| {
            categories.insert(
                category,
                CategoryPolicy {
                    retention_class,
                    retention_days,
                    disposal_method,
                },
            );
        };
        rule(
            EventCategory::Authentication,
            RetentionClass::AccessControl,
            7 * 365,
            DisposalMethod::CryptographicErasure,
        );
        rule(
            EventCategory::Authorization,
            RetentionClass::AccessControl,
            7 * 365,
            DisposalMethod::CryptographicErasure,
        );
        rule(
            EventCategory::DataAccess,
            RetentionClass::DataLifecycle,
            7 * 365,
            DisposalMethod::CryptographicErasure,
        );
        rule(
            EventCategory::Clinical,
            RetentionClass::ClinicalRecord,
            10 * 365,
            DisposalMethod::CryptographicErasure,
        );
        rule(
            EventCategory::SystemLifecycle,
            RetentionClass::Operational,
            3 * 365,
            DisposalMethod::PhysicalDeletion,
        );
        rule(
            EventCategory::Security,
            RetentionClass::SecurityIncident,
            10 * 365,
            DisposalMethod::CryptographicErasure,
        );

        Self {
            version: 1,
            effective_from: Utc::now(),
            tiers: TierThresholds {
                hot_days: 90,
                warm_days: 730,
            },
            categories,
        }
    }

    /// Validate structural constraints.
    pub fn validate(&self) -> AuditResult<()> {
        for category in EventCategory::ALL {
            let rule = self
                .categories
                .get(&category)
                .ok_or_else(|| AuditError::Config {
                    reason: format!("retention policy has no rule for category '{category}'"),
                })?;
            if rule.retention_days == 0 {
                return Err(AuditError::Config {
                    reason: format!("retention_days for '{category}' must be > 0"),
                });
            }
        }
        if self.tiers.hot_days == 0 || self.tiers.warm_days <= self.tiers.hot_days {
            return Err(AuditError::Config {
                reason: "tier thresholds must satisfy 0 < hot_days < warm_days".to_string(),
            });
        }
        Ok(())
    }

    fn rule(&self, category: EventCategory) -> AuditResult<&CategoryPolicy> {
        self.categories
            .get(&category)
            .ok_or_else(|| AuditError::Config {
                reason: format!("retention policy v{} has no rule for '{category}'", self.version),
            })
    }

    /// The retention class events of `category` are stamped with.
    pub fn class_for(&self, category: EventCategory) -> AuditResult<RetentionClass> {
        Ok(self.rule(category)?.retention_class)
    }

    pub fn method_for(&self, category: EventCategory) -> AuditResult<DisposalMethod> {
        Ok(self.rule(category)?.disposal_method)
    }

    /// The disposal deadline of an event recorded at `recorded_at`.
    pub fn deadline(
        &self,
        category: EventCategory,
        recorded_at: DateTime<Utc>,
    ) -> AuditResult<DateTime<Utc>> {
        let rule = self.rule(category)?;
        Ok(recorded_at + Duration::days(i64::from(rule.retention_days)))
    }
}

/// All published policy versions, newest active.
///
/// Publication is strictly prospective: old versions are preserved and
/// still govern the events stamped with them.
pub struct RetentionPolicySet {
    versions: RwLock<Vec<RetentionPolicy>>,
}

impl RetentionPolicySet {
    /// Start from one initial policy version.
    pub fn new(initial: RetentionPolicy) -> AuditResult<Self> {
        initial.validate()?;
        Ok(Self {
            versions: RwLock::new(vec![initial]),
        })
    }

    /// Publish a new version. Must be strictly newer than the current one.
    pub fn publish(&self, policy: RetentionPolicy) -> AuditResult<()> {
        policy.validate()?;
        let mut versions = self.versions.write().expect("policy set lock poisoned");
        let current = versions.last().map(|p| p.version).unwrap_or(0);
        if policy.version <= current {
            return Err(AuditError::Config {
                reason: format!(
                    "policy version {} must be greater than current version {current}",
                    policy.version
                ),
            });
        }
        info!(version = policy.version, "retention policy published");
        versions.push(policy);
        Ok(())
    }

    /// The currently active policy.
    pub fn active(&self) -> RetentionPolicy {
        let versions = self.versions.read().expect("policy set lock poisoned");
        versions
            .last()
            .cloned()
            .expect("policy set always holds at least one version")
    }

    /// A specific published version, for judging events stamped with it.
    pub fn version(&self, version: u32) -> Option<RetentionPolicy> {
        let versions = self.versions.read().expect("policy set lock poisoned");
        versions.iter().find(|p| p.version == version).cloned()
    }

    /// The policy an event stamped with `version` is judged by: that exact
    /// version when it is still known, otherwise the active one.
    pub fn for_stamped_version(&self, version: u32) -> RetentionPolicy {
        self.version(version).unwrap_or_else(|| self.active())
    }
}
