//! The composite security service.
//!
//! [`SecurityManager`] owns one instance of every stateful gate and the
//! static policy derived from [`WabotConfig`]. It is built once at startup,
//! shared behind an `Arc`, and is the only path by which suspicious activity
//! turns into a block.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use wabot_types::{CanonicalId, OwnerSet, WabotConfig};

use crate::blocklist::{BlockError, BlockManager, BlockReceipt, BlockSummary};
use crate::cooldown::CooldownGate;
use crate::features::{Features, UnknownFeature};
use crate::patterns::PatternDetector;
use crate::permissions::PermissionChecker;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::registry::{AccessRegistry, AllowError, AllowlistEntry, RevokeError};
use crate::suspicious::{ActivityKind, SuspiciousConfig, SuspiciousTracker};
use crate::throttle::ConcurrencyThrottle;

/// Reason attached to automatic blocks.
pub const AUTO_BLOCK_REASON: &str = "Excessive suspicious activity";

/// Rows shown in [`SecurityStats::recent_blocks`].
const RECENT_BLOCKS_SHOWN: usize = 10;

/// Counters for the admin `stats` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityStats {
    pub blocked: usize,
    pub allowed: usize,
    pub registered: usize,
    pub suspicious_tracked: usize,
    /// Most recent blocks, latest expiry first.
    pub recent_blocks: Vec<BlockSummary>,
}

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_blocks: usize,
    pub suspicious_events: usize,
    pub rate_windows: usize,
    pub cooldowns: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired_blocks + self.suspicious_events + self.rate_windows + self.cooldowns
    }
}

pub struct SecurityManager {
    owners: Arc<OwnerSet>,
    registry: AccessRegistry,
    blocks: BlockManager,
    suspicious: SuspiciousTracker,
    rate_limiter: RateLimiter,
    cooldowns: CooldownGate,
    throttle: ConcurrencyThrottle,
    permissions: PermissionChecker,
    detector: PatternDetector,
    features: Features,
    auto_block: Duration,
    default_block: Duration,
    default_cooldown: Duration,
    max_input_len: usize,
}

impl SecurityManager {
    /// Build every gate from a validated configuration.
    pub fn from_config(config: &WabotConfig) -> Self {
        let owners = Arc::new(config.owner_set());
        let limits = &config.limits;
        let security = &config.security;
        Self {
            registry: AccessRegistry::new(Arc::clone(&owners)),
            blocks: BlockManager::new(Arc::clone(&owners)),
            suspicious: SuspiciousTracker::new(SuspiciousConfig {
                threshold: security.suspicious_threshold,
                window: Duration::from_secs(security.suspicious_window_secs),
                retention: Duration::from_secs(security.suspicious_retention_secs),
                log_cap: security.suspicious_log_cap,
            }),
            rate_limiter: RateLimiter::new(RateLimitConfig {
                max_requests: limits.rate_limit_max,
                window: Duration::from_millis(limits.rate_limit_window_ms),
                max_users: limits.rate_limit_max_users,
            }),
            cooldowns: CooldownGate::new(),
            throttle: ConcurrencyThrottle::new(limits.max_heavy_concurrency),
            permissions: PermissionChecker::new(
                Arc::clone(&owners),
                &security.owner_only_commands,
                &security.admin_only_group_commands,
            ),
            detector: PatternDetector::new(),
            features: Features::new(&config.features),
            auto_block: minutes(security.auto_block_minutes),
            default_block: minutes(limits.default_block_minutes),
            default_cooldown: Duration::from_millis(limits.default_cooldown_ms),
            max_input_len: config.bot.max_input_len,
            owners,
        }
    }

    pub fn is_owner(&self, raw: &str) -> bool {
        self.owners.is_owner(raw)
    }

    pub fn owners(&self) -> &OwnerSet {
        &self.owners
    }

    /// Key under which per-user state (rate limit, cooldown, suspicious
    /// log) is stored: the primary canonical form, or the trimmed raw id
    /// when nothing canonical can be derived.
    pub fn user_key(&self, raw: &str) -> String {
        self.owners
            .normalize(raw)
            .primary()
            .map(CanonicalId::to_string)
            .unwrap_or_else(|| raw.trim().to_string())
    }

    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    pub fn blocks(&self) -> &BlockManager {
        &self.blocks
    }

    pub fn suspicious(&self) -> &SuspiciousTracker {
        &self.suspicious
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.cooldowns
    }

    pub fn throttle(&self) -> &ConcurrencyThrottle {
        &self.throttle
    }

    pub fn permissions(&self) -> &PermissionChecker {
        &self.permissions
    }

    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    pub fn default_block(&self) -> Duration {
        self.default_block
    }

    pub fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    pub fn track(&self, raw: &str, kind: ActivityKind) -> bool {
        self.track_at(raw, kind, Utc::now())
    }

    /// Log a suspicious event. Returns `true` when it pushed the user over
    /// the threshold and an automatic block was placed.
    pub fn track_at(&self, raw: &str, kind: ActivityKind, now: DateTime<Utc>) -> bool {
        if self.owners.is_owner(raw) {
            return false;
        }
        let key = self.user_key(raw);
        let outcome = self.suspicious.record_at(&key, kind.clone(), now);
        debug!(target: "security", user = %key, event = %kind, recent = outcome.recent, "suspicious activity");
        if !outcome.escalate {
            return false;
        }
        warn!(
            target: "security",
            user = %key,
            recent = outcome.recent,
            "suspicious activity threshold exceeded, auto-blocking"
        );
        self.blocks
            .block_at(raw, self.auto_block, AUTO_BLOCK_REASON, now)
            .is_ok()
    }

    // -- admin hooks --------------------------------------------------------

    pub fn block_for_minutes(
        &self,
        raw: &str,
        mins: Option<u64>,
        reason: &str,
    ) -> Result<BlockReceipt, BlockError> {
        let duration = mins.map(minutes).unwrap_or(self.default_block);
        self.blocks.block(raw, duration, reason)
    }

    pub fn unblock(&self, raw: &str) -> bool {
        self.blocks.unblock(raw)
    }

    pub fn unblock_all(&self) -> usize {
        self.blocks.unblock_all()
    }

    pub fn list_blocked(&self) -> Vec<BlockSummary> {
        self.blocks.list_blocked()
    }

    pub fn allow(&self, raw: &str, granted_by: &str) -> Result<CanonicalId, AllowError> {
        self.registry.allow(raw, granted_by)
    }

    pub fn revoke(&self, raw: &str) -> Result<CanonicalId, RevokeError> {
        self.registry.revoke(raw)
    }

    pub fn list_allowed(&self) -> Vec<AllowlistEntry> {
        self.registry.list_allowed()
    }

    /// Flip a runtime feature. Returns the previous value.
    pub fn toggle_feature(&self, name: &str, on: bool) -> Result<bool, UnknownFeature> {
        let previous = self.features.toggle(name, on)?;
        warn!(target: "security", feature = name, on, previous, "feature toggled");
        Ok(previous)
    }

    pub fn stats(&self) -> SecurityStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> SecurityStats {
        let mut blocks = self.blocks.list_blocked_at(now);
        let blocked = blocks.len();
        blocks.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        blocks.truncate(RECENT_BLOCKS_SHOWN);
        SecurityStats {
            blocked,
            allowed: self.registry.allowed_count(),
            registered: self.registry.registered_count(),
            suspicious_tracked: self.suspicious.tracked_users(),
            recent_blocks: blocks,
        }
    }

    // -- maintenance --------------------------------------------------------

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now(), Instant::now())
    }

    /// Drop expired state. Admission correctness never depends on this;
    /// every lookup re-checks expiry.
    pub fn sweep_at(&self, now: DateTime<Utc>, mono: Instant) -> SweepReport {
        SweepReport {
            expired_blocks: self.blocks.purge_expired_at(now),
            suspicious_events: self.suspicious.purge_at(now),
            rate_windows: self.rate_limiter.sweep_at(mono),
            cooldowns: self.cooldowns.purge_expired_at(now),
        }
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}
