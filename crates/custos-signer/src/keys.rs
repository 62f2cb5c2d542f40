//! Ed25519 key registry with tenant scoping and rotation.
//!
//! Keys are scoped either to one tenant or system-wide. Rotation retires
//! the previous active key without removing it — every signature ever
//! produced stays verifiable by its recorded `key_id`. Revocation marks a
//! key compromised: events it signed fail verification from then on.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tracing::{info, warn};

use custos_contracts::{
    error::{AuditError, AuditResult},
    ids::{KeyId, TenantId},
};

/// Lifecycle status of a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Signs new events for its scope.
    Active,
    /// Replaced by rotation; still verifies old signatures.
    Retired,
    /// Compromised; signatures by this key no longer verify.
    Revoked,
}

/// One registered keypair.
pub struct KeyRecord {
    pub key_id: KeyId,
    /// `None` for the system-wide key.
    pub tenant: Option<TenantId>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    signing: SigningKey,
}

impl KeyRecord {
    /// The verification half, derivable from the signing key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }
}

struct RegistryState {
    keys: HashMap<KeyId, KeyRecord>,
    /// Scope → currently active key. `None` scope is the system-wide key.
    active: HashMap<Option<TenantId>, KeyId>,
    next_serial: u64,
}

/// Thread-safe registry of signing keys.
///
/// Reads (verification lookups) and writes (generation, rotation) both go
/// through an `RwLock`; signing itself happens on a cloned `SigningKey` so
/// the lock is never held across crypto work.
pub struct KeyRegistry {
    state: RwLock<RegistryState>,
}

impl KeyRegistry {
    /// An empty registry. Signing fails closed until a key is generated.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                keys: HashMap::new(),
                active: HashMap::new(),
                next_serial: 1,
            }),
        }
    }

    /// Convenience constructor with a system-wide key already active.
    pub fn with_system_key() -> Self {
        let registry = Self::new();
        registry.generate(None);
        registry
    }

    /// Generate a fresh keypair for `tenant` (or system-wide for `None`)
    /// and make it the active key for that scope.
    pub fn generate(&self, tenant: Option<&TenantId>) -> KeyId {
        let mut state = self.state.write().expect("key registry lock poisoned");

        let serial = state.next_serial;
        state.next_serial += 1;

        let scope = match tenant {
            Some(t) => t.0.clone(),
            None => "system".to_string(),
        };
        let key_id = KeyId::new(format!("{scope}/k{serial}"));

        let signing = SigningKey::generate(&mut OsRng);
        let record = KeyRecord {
            key_id: key_id.clone(),
            tenant: tenant.cloned(),
            status: KeyStatus::Active,
            created_at: Utc::now(),
            signing,
        };

        state.keys.insert(key_id.clone(), record);
        state.active.insert(tenant.cloned(), key_id.clone());

        info!(key_id = %key_id, scope = %scope, "signing key generated");
        key_id
    }

    /// Rotate the active key for a scope: the old key is retired (still
    /// verifies), a fresh key becomes active.
    ///
    /// Returns `AuditError::Signing` when the scope has no active key to
    /// rotate.
    pub fn rotate(&self, tenant: Option<&TenantId>) -> AuditResult<KeyId> {
        {
            let mut state = self.state.write().expect("key registry lock poisoned");
            let current = state
                .active
                .get(&tenant.cloned())
                .cloned()
                .ok_or_else(|| AuditError::Signing {
                    reason: format!(
                        "no active key to rotate for scope '{}'",
                        tenant.map(|t| t.0.as_str()).unwrap_or("system")
                    ),
                })?;
            if let Some(record) = state.keys.get_mut(&current) {
                record.status = KeyStatus::Retired;
            }
            info!(key_id = %current, "signing key retired by rotation");
        }
        Ok(self.generate(tenant))
    }

    /// Mark a key compromised. Events it signed fail verification.
    pub fn revoke(&self, key_id: &KeyId) -> AuditResult<()> {
        let mut state = self.state.write().expect("key registry lock poisoned");
        let record = state.keys.get_mut(key_id).ok_or_else(|| AuditError::Signing {
            reason: format!("cannot revoke unknown key '{key_id}'"),
        })?;
        record.status = KeyStatus::Revoked;

        // A revoked key must never remain the active signer for its scope.
        let scope = record.tenant.clone();
        if state.active.get(&scope) == Some(key_id) {
            state.active.remove(&scope);
        }

        warn!(key_id = %key_id, "signing key revoked");
        Ok(())
    }

    /// The active signing key for a tenant, falling back to the system-wide
    /// key when the tenant has none of its own.
    ///
    /// Returns `AuditError::Signing` when neither exists — the caller must
    /// fail closed, never persist unsigned.
    pub fn active_key_for(&self, tenant: &TenantId) -> AuditResult<(KeyId, SigningKey)> {
        let state = self.state.read().expect("key registry lock poisoned");

        let key_id = state
            .active
            .get(&Some(tenant.clone()))
            .or_else(|| state.active.get(&None))
            .cloned()
            .ok_or_else(|| AuditError::Signing {
                reason: format!("no signing key available for tenant '{tenant}'"),
            })?;

        let record = state.keys.get(&key_id).ok_or_else(|| AuditError::Signing {
            reason: format!("active key '{key_id}' missing from registry"),
        })?;

        Ok((key_id, record.signing.clone()))
    }

    /// Look up the verification half and status of a key by id.
    pub fn verifying_key(&self, key_id: &KeyId) -> Option<(VerifyingKey, KeyStatus)> {
        let state = self.state.read().expect("key registry lock poisoned");
        state
            .keys
            .get(key_id)
            .map(|r| (r.verifying_key(), r.status))
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
