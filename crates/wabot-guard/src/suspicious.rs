//! Rolling per-user log of flagged events.
//!
//! The tracker only counts; turning a crossed threshold into a block is the
//! job of [`SecurityManager::track`](crate::SecurityManager::track), which
//! owns both this log and the block list.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Kinds of flagged activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Command text matched an injection pattern.
    MaliciousPattern,
    /// The sender ran into the rate limiter.
    RateLimitExceeded,
    /// A handler failed with a security-relevant error.
    HandlerFault,
    /// Anything else, named by the caller.
    Other(String),
}

impl ActivityKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::MaliciousPattern => "malicious_pattern",
            ActivityKind::RateLimitExceeded => "rate_limit_exceeded",
            ActivityKind::HandlerFault => "handler_fault",
            ActivityKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub kind: ActivityKind,
    pub at: DateTime<Utc>,
}

/// Tunables for [`SuspiciousTracker`].
#[derive(Debug, Clone)]
pub struct SuspiciousConfig {
    /// Events tolerated inside `window`; one more triggers escalation.
    pub threshold: usize,
    pub window: Duration,
    /// Entries older than this are dropped by [`SuspiciousTracker::purge_at`].
    pub retention: Duration,
    /// Entries kept per user, oldest evicted first.
    pub log_cap: usize,
}

impl Default for SuspiciousConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            window: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
            log_cap: 100,
        }
    }
}

/// What [`SuspiciousTracker::record_at`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOutcome {
    /// Events for this user inside the trailing window, including this one.
    pub recent: usize,
    /// Whether `recent` exceeds the threshold.
    pub escalate: bool,
}

/// Bounded activity logs keyed by canonical id.
pub struct SuspiciousTracker {
    config: SuspiciousConfig,
    logs: Mutex<HashMap<String, VecDeque<ActivityRecord>>>,
}

impl SuspiciousTracker {
    pub fn new(config: SuspiciousConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SuspiciousConfig {
        &self.config
    }

    /// Append an event and count the trailing window.
    ///
    /// The log is not cleared when escalation is reported.
    pub fn record_at(&self, key: &str, kind: ActivityKind, now: DateTime<Utc>) -> TrackOutcome {
        let mut logs = self.logs.lock();
        let log = logs.entry(key.to_string()).or_default();
        log.push_back(ActivityRecord { kind, at: now });
        while log.len() > self.config.log_cap {
            log.pop_front();
        }

        let cutoff = cutoff(now, self.config.window);
        let recent = log.iter().filter(|r| r.at > cutoff).count();
        TrackOutcome {
            recent,
            escalate: recent > self.config.threshold,
        }
    }

    /// Events logged for `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<ActivityRecord> {
        self.logs
            .lock()
            .get(key)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop events older than the retention and users with nothing left.
    /// Returns the number of events removed.
    pub fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, self.config.retention);
        let mut removed = 0;
        let mut logs = self.logs.lock();
        logs.retain(|_, log| {
            let before = log.len();
            log.retain(|r| r.at > cutoff);
            removed += before - log.len();
            !log.is_empty()
        });
        removed
    }

    pub fn tracked_users(&self) -> usize {
        self.logs.lock().len()
    }
}

fn cutoff(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(span)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
