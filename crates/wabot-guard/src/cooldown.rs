//! Per-user debounce.
//!
//! While a user's cooldown is active every further command is dropped
//! without a reply. The check and the insert happen under one lock, so two
//! back-to-back commands from the same user cannot both pass.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::expiring::{Expiring, ExpiringMap};

pub struct CooldownGate {
    active: Mutex<ExpiringMap<String, ()>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(ExpiringMap::new()),
        }
    }

    pub fn try_enter(&self, key: &str, cooldown: Duration) -> bool {
        self.try_enter_at(key, cooldown, Utc::now())
    }

    /// Start a cooldown for `key` unless one is active. Returns `false`
    /// when the caller should drop the command.
    pub fn try_enter_at(&self, key: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let mut active = self.active.lock();
        if active.contains_live(key, now) {
            return false;
        }
        active.insert(key.to_string(), Expiring::for_duration((), now, cooldown));
        true
    }

    pub fn is_cooling_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.active.lock().contains_live(key, now)
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.active.lock().purge_expired(now)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn second_attempt_inside_cooldown_dropped() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        let cd = Duration::from_secs(3);
        assert!(gate.try_enter_at("u", cd, t0));
        assert!(!gate.try_enter_at("u", cd, t0 + TimeDelta::seconds(2)));
        assert!(gate.try_enter_at("u", cd, t0 + TimeDelta::seconds(3)));
    }

    #[test]
    fn rejected_attempt_does_not_extend_cooldown() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        let cd = Duration::from_secs(5);
        gate.try_enter_at("u", cd, t0);
        gate.try_enter_at("u", cd, t0 + TimeDelta::seconds(4));
        assert!(!gate.is_cooling_at("u", t0 + TimeDelta::seconds(5)));
    }

    #[test]
    fn users_independent_and_purged() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        assert!(gate.try_enter_at("a", Duration::from_secs(1), t0));
        assert!(gate.try_enter_at("b", Duration::from_secs(10), t0));
        assert_eq!(gate.purge_expired_at(t0 + TimeDelta::seconds(2)), 1);
        assert_eq!(gate.len(), 1);
    }
}
