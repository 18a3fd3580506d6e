//! Registered users and the allow-list.
//!
//! Both maps are keyed by the primary canonical form of the sender, so
//! `0812...`, `62812...` and `62812...@s.whatsapp.net` all hit the same
//! entry. Owners are never stored in either map: their access is implicit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use wabot_types::{CanonicalId, OwnerSet};

/// A user who has messaged the bot at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredUser {
    pub id: CanonicalId,
    pub first_seen: DateTime<Utc>,
    pub greeting_sent: bool,
}

/// An explicit access grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowlistEntry {
    pub id: CanonicalId,
    pub allowed_at: DateTime<Utc>,
    pub allowed_by: Option<CanonicalId>,
}

/// Why an allow-list grant was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllowError {
    #[error("{0} already has full access")]
    Owner(String),
    #[error("{0} is already allowed")]
    AlreadyAllowed(CanonicalId),
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
}

/// Why an allow-list revocation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevokeError {
    #[error("cannot revoke owner {0}")]
    Owner(String),
    #[error("{0} is not in allowlist")]
    NotAllowed(CanonicalId),
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
}

/// First-contact tracking and the allow-list.
pub struct AccessRegistry {
    owners: Arc<OwnerSet>,
    registered: Mutex<HashMap<CanonicalId, RegisteredUser>>,
    allowed: Mutex<HashMap<CanonicalId, AllowlistEntry>>,
}

impl AccessRegistry {
    pub fn new(owners: Arc<OwnerSet>) -> Self {
        Self {
            owners,
            registered: Mutex::new(HashMap::new()),
            allowed: Mutex::new(HashMap::new()),
        }
    }

    fn primary(&self, raw: &str) -> Option<CanonicalId> {
        self.owners.normalize(raw).primary().cloned()
    }

    /// Record a first contact. Returns `true` only the first time a
    /// non-owner is seen.
    pub fn register_if_new(&self, raw: &str) -> bool {
        self.register_if_new_at(raw, Utc::now())
    }

    pub fn register_if_new_at(&self, raw: &str, now: DateTime<Utc>) -> bool {
        if self.owners.is_owner(raw) {
            return false;
        }
        let Some(id) = self.primary(raw) else {
            return false;
        };
        let mut registered = self.registered.lock();
        if registered.contains_key(&id) {
            return false;
        }
        info!(user = %id, "registered new user");
        registered.insert(
            id.clone(),
            RegisteredUser {
                id,
                first_seen: now,
                greeting_sent: false,
            },
        );
        true
    }

    pub fn is_registered(&self, raw: &str) -> bool {
        self.primary(raw)
            .is_some_and(|id| self.registered.lock().contains_key(&id))
    }

    /// Flag the welcome message as delivered. No-op for unknown users.
    pub fn mark_greeting_sent(&self, raw: &str) {
        let Some(id) = self.primary(raw) else {
            return;
        };
        if let Some(user) = self.registered.lock().get_mut(&id) {
            user.greeting_sent = true;
        }
    }

    pub fn was_greeting_sent(&self, raw: &str) -> bool {
        self.primary(raw).is_some_and(|id| {
            self.registered
                .lock()
                .get(&id)
                .is_some_and(|u| u.greeting_sent)
        })
    }

    /// Owners always pass; everyone else needs an explicit grant.
    pub fn is_allowed(&self, raw: &str) -> bool {
        if self.owners.is_owner(raw) {
            return true;
        }
        self.primary(raw)
            .is_some_and(|id| self.allowed.lock().contains_key(&id))
    }

    pub fn allow(&self, raw: &str, granted_by: &str) -> Result<CanonicalId, AllowError> {
        self.allow_at(raw, granted_by, Utc::now())
    }

    pub fn allow_at(
        &self,
        raw: &str,
        granted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<CanonicalId, AllowError> {
        if self.owners.is_owner(raw) {
            return Err(AllowError::Owner(raw.trim().to_string()));
        }
        let id = self
            .primary(raw)
            .ok_or_else(|| AllowError::InvalidId(raw.to_string()))?;
        let mut allowed = self.allowed.lock();
        if allowed.contains_key(&id) {
            return Err(AllowError::AlreadyAllowed(id));
        }
        allowed.insert(
            id.clone(),
            AllowlistEntry {
                id: id.clone(),
                allowed_at: now,
                allowed_by: self.primary(granted_by),
            },
        );
        info!(user = %id, by = granted_by, "granted access");
        Ok(id)
    }

    pub fn revoke(&self, raw: &str) -> Result<CanonicalId, RevokeError> {
        if self.owners.is_owner(raw) {
            return Err(RevokeError::Owner(raw.trim().to_string()));
        }
        let id = self
            .primary(raw)
            .ok_or_else(|| RevokeError::InvalidId(raw.to_string()))?;
        match self.allowed.lock().remove(&id) {
            Some(_) => {
                info!(user = %id, "revoked access");
                Ok(id)
            }
            None => Err(RevokeError::NotAllowed(id)),
        }
    }

    /// Allow-list entries, oldest grant first.
    pub fn list_allowed(&self) -> Vec<AllowlistEntry> {
        let mut entries: Vec<AllowlistEntry> = self.allowed.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.allowed_at.cmp(&b.allowed_at).then(a.id.cmp(&b.id)));
        entries
    }

    pub fn allowed_count(&self) -> usize {
        self.allowed.lock().len()
    }

    pub fn registered_count(&self) -> usize {
        self.registered.lock().len()
    }
}
