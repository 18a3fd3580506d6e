//! Temporary blocks with lazy expiry.
//!
//! A block is written under every canonical form of the target, so a
//! lookup through any address spelling finds it. Expired entries are
//! removed the moment a lookup touches them; the periodic purge only
//! reclaims memory.
//!
//! ## Owner protection
//!
//! Owners can never be blocked. [`BlockManager::block`] checks the raw
//! input and every derived form against the owner set *before* inserting
//! anything, [`BlockManager::is_blocked`] short-circuits for owners, and
//! [`BlockManager::clear_owner_blocks`] scrubs any owner entry that got in
//! through other means.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use wabot_types::OwnerSet;

use crate::expiring::{deadline_after, Expiring, ExpiringMap};

/// Stored alongside every blocked form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub reason: String,
    /// The identifier the caller asked to block.
    pub original_raw_id: String,
    /// The form reported back to the caller and used for listings.
    pub primary: String,
    pub blocked_at: DateTime<Utc>,
}

/// Why a block request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("cannot block owner bot")]
    Owner,
    #[error("cannot block an empty identifier")]
    EmptyId,
}

/// A successful block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReceipt {
    pub blocked_id: String,
    pub forms: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Human-facing view of an active block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub reason: String,
    pub remaining: Duration,
    /// Remaining time rounded up to whole minutes.
    pub remaining_minutes: u64,
    pub expires_at: DateTime<Utc>,
}

/// One row of [`BlockManager::list_blocked`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub id: String,
    pub original_raw_id: String,
    pub reason: String,
    pub remaining_minutes: u64,
    pub expires_at: DateTime<Utc>,
}

/// Owner-protected, expiring block list.
pub struct BlockManager {
    owners: Arc<OwnerSet>,
    entries: Mutex<ExpiringMap<String, BlockEntry>>,
}

impl BlockManager {
    pub fn new(owners: Arc<OwnerSet>) -> Self {
        Self {
            owners,
            entries: Mutex::new(ExpiringMap::new()),
        }
    }

    pub fn is_blocked(&self, raw: &str) -> bool {
        self.is_blocked_at(raw, Utc::now())
    }

    /// Check the raw id and then every canonical form.
    pub fn is_blocked_at(&self, raw: &str, now: DateTime<Utc>) -> bool {
        self.live_entry(raw, now).is_some()
    }

    fn live_entry(&self, raw: &str, now: DateTime<Utc>) -> Option<Expiring<BlockEntry>> {
        if self.owners.is_owner(raw) {
            return None;
        }
        let raw = raw.trim();
        let forms = self.owners.normalize(raw);
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get_live(raw, now) {
            return Some(hit.clone());
        }
        for form in forms.iter() {
            if let Some(hit) = entries.get_live(form.as_str(), now) {
                return Some(hit.clone());
            }
        }
        None
    }

    pub fn block(
        &self,
        raw: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<BlockReceipt, BlockError> {
        self.block_at(raw, duration, reason, Utc::now())
    }

    /// Block `raw` under every canonical form for `duration`.
    pub fn block_at(
        &self,
        raw: &str,
        duration: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockReceipt, BlockError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(BlockError::EmptyId);
        }
        let forms = self.owners.normalize(raw);
        if self.owners.is_owner(raw) || forms.iter().any(|f| self.owners.is_owner(f.as_str())) {
            warn!(target: "security", id = raw, "refused to block an owner identity");
            return Err(BlockError::Owner);
        }

        let keys: Vec<String> = if forms.is_empty() {
            vec![raw.to_string()]
        } else {
            forms.iter().map(|f| f.as_str().to_string()).collect()
        };
        let primary = keys[0].clone();
        let expires_at = deadline_after(now, duration);
        let entry = BlockEntry {
            reason: reason.to_string(),
            original_raw_id: raw.to_string(),
            primary: primary.clone(),
            blocked_at: now,
        };

        let mut entries = self.entries.lock();
        for key in &keys {
            entries.insert(key.clone(), Expiring::new(entry.clone(), expires_at));
        }
        drop(entries);

        info!(
            target: "security",
            id = %primary,
            forms = keys.len(),
            reason,
            minutes = duration.as_secs() / 60,
            "blocked user"
        );
        Ok(BlockReceipt {
            blocked_id: primary,
            forms: keys,
            expires_at,
        })
    }

    /// Remove the block under the raw id and every canonical form, along
    /// with any sibling entry written by the same block call.
    pub fn unblock(&self, raw: &str) -> bool {
        let raw = raw.trim();
        let forms = self.owners.normalize(raw);
        let mut entries = self.entries.lock();
        let mut primaries = Vec::new();
        for key in std::iter::once(raw).chain(forms.iter().map(|f| f.as_str())) {
            if let Some(hit) = entries.remove(key) {
                primaries.push(hit.value().primary.clone());
            }
        }
        let removed = !primaries.is_empty();
        if removed {
            entries.retain(|_, e| !primaries.contains(&e.value().primary));
            info!(target: "security", id = raw, "unblocked user");
        }
        removed
    }

    /// Drop every block. Returns the number of distinct users released.
    pub fn unblock_all(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let users = entries
            .iter_live(now)
            .filter(|(key, e)| key.as_str() == e.value().primary)
            .count();
        entries.clear();
        users
    }

    pub fn block_info(&self, raw: &str) -> Option<BlockInfo> {
        self.block_info_at(raw, Utc::now())
    }

    /// Reason and remaining time of an active block, if any.
    pub fn block_info_at(&self, raw: &str, now: DateTime<Utc>) -> Option<BlockInfo> {
        let hit = self.live_entry(raw, now)?;
        let remaining = hit.remaining(now);
        Some(BlockInfo {
            reason: hit.value().reason.clone(),
            remaining,
            remaining_minutes: remaining.as_secs().div_ceil(60),
            expires_at: hit.expires_at(),
        })
    }

    /// Remove any block held by a configured owner. Returns entries removed.
    pub fn clear_owner_blocks(&self) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for owner in self.owners.raw_ids() {
            if entries.remove(owner.as_str()).is_some() {
                removed += 1;
            }
            for form in self.owners.normalize(owner).iter() {
                if entries.remove(form.as_str()).is_some() {
                    removed += 1;
                }
            }
        }
        for form in self.owners.forms() {
            if entries.remove(form.as_str()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(target: "security", removed, "cleared block entries held by owners");
        }
        removed
    }

    pub fn list_blocked(&self) -> Vec<BlockSummary> {
        self.list_blocked_at(Utc::now())
    }

    /// One row per blocked user, soonest expiry first.
    pub fn list_blocked_at(&self, now: DateTime<Utc>) -> Vec<BlockSummary> {
        let entries = self.entries.lock();
        let mut rows: Vec<BlockSummary> = entries
            .iter_live(now)
            .filter(|(key, e)| key.as_str() == e.value().primary)
            .map(|(key, e)| BlockSummary {
                id: key.clone(),
                original_raw_id: e.value().original_raw_id.clone(),
                reason: e.value().reason.clone(),
                remaining_minutes: e.remaining(now).as_secs().div_ceil(60),
                expires_at: e.expires_at(),
            })
            .collect();
        rows.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn blocked_count_at(&self, now: DateTime<Utc>) -> usize {
        self.list_blocked_at(now).len()
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.entries.lock().purge_expired(now)
    }

    /// Insert an entry without any owner check. Test-only: simulates state
    /// left behind by an earlier bug.
    #[cfg(test)]
    fn insert_raw(&self, key: &str, until: DateTime<Utc>) {
        self.entries.lock().insert(
            key.to_string(),
            Expiring::new(
                BlockEntry {
                    reason: "legacy".into(),
                    original_raw_id: key.into(),
                    primary: key.into(),
                    blocked_at: until,
                },
                until,
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use wabot_types::NormalizeRules;

    const OWNER: &str = "08111000111";

    fn manager() -> BlockManager {
        BlockManager::new(Arc::new(OwnerSet::new(
            &[OWNER.to_string()],
            NormalizeRules::default(),
        )))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    const TEN_MIN: Duration = Duration::from_secs(600);

    #[test]
    fn block_covers_every_spelling() {
        let bm = manager();
        let receipt = bm.block_at("08123456789", TEN_MIN, "spam", t0()).unwrap();
        assert_eq!(receipt.blocked_id, "628123456789@s.whatsapp.net");
        assert_eq!(receipt.forms.len(), 2);

        for spelling in [
            "08123456789",
            "628123456789",
            "+62 812 3456 789",
            "628123456789@s.whatsapp.net",
            "08123456789@s.whatsapp.net",
            "628123456789:9@s.whatsapp.net",
        ] {
            assert!(bm.is_blocked_at(spelling, t0()), "{spelling} should be blocked");
        }
        assert!(!bm.is_blocked_at("628123456780", t0()));
    }

    #[test]
    fn block_expires() {
        let bm = manager();
        bm.block_at("628123", TEN_MIN, "spam", t0()).unwrap();
        assert!(bm.is_blocked_at("628123", t0() + TimeDelta::minutes(9)));
        assert!(!bm.is_blocked_at("628123", t0() + TimeDelta::minutes(10)));
        assert_eq!(bm.blocked_count_at(t0()), 0, "lazy read removed the entry");
    }

    #[test]
    fn owner_cannot_be_blocked_in_any_spelling() {
        let bm = manager();
        for spelling in [
            OWNER,
            "628111000111",
            "628111000111@s.whatsapp.net",
            "08111000111@s.whatsapp.net",
            "628111000111:2@s.whatsapp.net",
        ] {
            assert_eq!(
                bm.block_at(spelling, TEN_MIN, "oops", t0()),
                Err(BlockError::Owner),
                "{spelling}"
            );
            assert!(!bm.is_blocked_at(spelling, t0()));
        }
        assert_eq!(bm.blocked_count_at(t0()), 0);
    }

    #[test]
    fn owner_never_reported_blocked_even_with_stale_entry() {
        let bm = manager();
        bm.insert_raw("628111000111@s.whatsapp.net", t0() + TimeDelta::hours(1));
        assert!(!bm.is_blocked_at(OWNER, t0()));
        assert!(bm.block_info_at(OWNER, t0()).is_none());
    }

    #[test]
    fn clear_owner_blocks_scrubs_entries() {
        let bm = manager();
        bm.insert_raw("628111000111@s.whatsapp.net", t0() + TimeDelta::hours(1));
        bm.insert_raw(OWNER, t0() + TimeDelta::hours(1));
        bm.block_at("628999", TEN_MIN, "spam", t0()).unwrap();
        assert_eq!(bm.clear_owner_blocks(), 2);
        assert!(bm.is_blocked_at("628999", t0()));
    }

    #[test]
    fn unparseable_id_blocked_verbatim() {
        let bm = manager();
        let receipt = bm.block_at("someone", TEN_MIN, "manual", t0()).unwrap();
        assert_eq!(receipt.forms, vec!["someone".to_string()]);
        assert!(bm.is_blocked_at("someone", t0()));
        assert!(bm.unblock("someone"));
        assert!(!bm.is_blocked_at("someone", t0()));
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(
            manager().block_at("  ", TEN_MIN, "x", t0()),
            Err(BlockError::EmptyId)
        );
    }

    #[test]
    fn unblock_through_other_spelling() {
        let bm = manager();
        bm.block_at("628123456789@s.whatsapp.net", TEN_MIN, "spam", t0())
            .unwrap();
        assert!(bm.unblock("08123456789"));
        assert!(!bm.is_blocked_at("628123456789", t0()));
        assert!(!bm.unblock("08123456789"), "nothing left to remove");
    }

    #[test]
    fn unblock_by_primary_clears_local_spelling() {
        let bm = manager();
        let receipt = bm.block_at("08123", TEN_MIN, "spam", t0()).unwrap();
        assert!(receipt.forms.contains(&"08123@s.whatsapp.net".to_string()));
        assert!(bm.unblock("628123@s.whatsapp.net"));
        assert!(!bm.is_blocked_at("08123", t0()));
        assert!(!bm.is_blocked_at("08123@s.whatsapp.net", t0()));
        assert_eq!(bm.purge_expired_at(t0() + TimeDelta::hours(1)), 0);
    }

    #[test]
    fn block_info_reports_remaining_time() {
        let bm = manager();
        bm.block_at("628123", TEN_MIN, "flooding", t0()).unwrap();
        let info = bm
            .block_info_at("628123@s.whatsapp.net", t0() + TimeDelta::seconds(30))
            .unwrap();
        assert_eq!(info.reason, "flooding");
        assert_eq!(info.remaining, Duration::from_secs(570));
        assert_eq!(info.remaining_minutes, 10);
        assert_eq!(info.expires_at, t0() + TimeDelta::minutes(10));
        assert!(bm.block_info_at("628124", t0()).is_none());
    }

    #[test]
    fn list_has_one_row_per_user() {
        let bm = manager();
        bm.block_at("08123", TEN_MIN, "a", t0()).unwrap();
        bm.block_at("628456", Duration::from_secs(60), "b", t0()).unwrap();
        let rows = bm.list_blocked_at(t0());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "628456@s.whatsapp.net");
        assert_eq!(rows[1].original_raw_id, "08123");
    }

    #[test]
    fn purge_drops_expired_forms() {
        let bm = manager();
        bm.block_at("08123", Duration::from_secs(60), "a", t0()).unwrap();
        assert_eq!(bm.purge_expired_at(t0() + TimeDelta::minutes(2)), 2);
    }

    #[test]
    fn unblock_all_releases_everyone() {
        let bm = manager();
        let now = Utc::now();
        bm.block_at("08123", TEN_MIN, "a", now).unwrap();
        bm.block_at("628456", TEN_MIN, "b", now).unwrap();
        assert_eq!(bm.unblock_all(), 2);
        assert!(!bm.is_blocked("08123"));
    }
}
