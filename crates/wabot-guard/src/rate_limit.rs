//! Per-user sliding-window rate limiting.
//!
//! [`RateLimiter`] keeps a [`VecDeque`] of request timestamps per user over
//! monotonic [`Instant`]s. It knows nothing about blocks or the allow-list;
//! the dispatcher consults it only after those gates so rejected users do
//! not burn budget.
//!
//! Memory is bounded by `max_users`: when a new user would exceed it, idle
//! users (nothing left in their window) are evicted first, up to a tenth of
//! the cap per pass, then the least recently active ones.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Tunables for [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed inside `window`.
    pub max_requests: u32,
    pub window: Duration,
    /// Users tracked before eviction kicks in.
    pub max_users: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            max_users: 10_000,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Time until the oldest request in the window leaves it.
    pub reset_after: Duration,
    /// Whole seconds to wait before retrying. Zero when allowed.
    pub retry_after_secs: u64,
}

/// Sliding-window limiter keyed by user.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Check and, if allowed, record a request at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let window = self.config.window;
        let max = self.config.max_requests;
        let mut windows = self.windows.lock();

        if !windows.contains_key(key) && windows.len() >= self.config.max_users {
            self.evict(&mut windows, now);
        }

        let stamps = windows.entry(key.to_string()).or_default();
        prune(stamps, now, window);

        if stamps.len() as u32 >= max {
            let oldest = stamps.front().copied().unwrap_or(now);
            let reset_after = (oldest + window).saturating_duration_since(now);
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_after,
                retry_after_secs: ceil_secs(reset_after).max(1),
            };
        }

        stamps.push_back(now);
        let oldest = stamps.front().copied().unwrap_or(now);
        RateDecision {
            allowed: true,
            remaining: max.saturating_sub(stamps.len() as u32),
            reset_after: (oldest + window).saturating_duration_since(now),
            retry_after_secs: 0,
        }
    }

    /// Make room for one more user.
    fn evict(&self, windows: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
        let window = self.config.window;
        let budget = (self.config.max_users / 10).max(1);

        let idle: Vec<String> = windows
            .iter()
            .filter(|(_, stamps)| {
                stamps
                    .back()
                    .map_or(true, |&last| now.saturating_duration_since(last) >= window)
            })
            .map(|(k, _)| k.clone())
            .take(budget)
            .collect();
        let mut evicted = idle.len();
        for key in idle {
            windows.remove(&key);
        }

        if windows.len() >= self.config.max_users {
            let mut by_activity: Vec<(String, Instant)> = windows
                .iter()
                .map(|(k, s)| (k.clone(), s.back().copied().unwrap_or(now)))
                .collect();
            by_activity.sort_by_key(|(_, last)| *last);
            let excess = windows.len() + 1 - self.config.max_users;
            for (key, _) in by_activity.into_iter().take(excess) {
                windows.remove(&key);
                evicted += 1;
            }
        }
        debug!(evicted, tracked = windows.len(), "rate limiter evicted users");
    }

    /// Drop every user whose window is entirely stale.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, stamps| {
            prune(stamps, now, window);
            !stamps.is_empty()
        });
        before - windows.len()
    }

    /// Forget a user's history.
    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(key);
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.lock().len()
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while stamps
        .front()
        .is_some_and(|&t| now.saturating_duration_since(t) >= window)
    {
        stamps.pop_front();
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_millis().div_ceil(1000) as u64
}
