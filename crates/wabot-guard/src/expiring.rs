//! Values that stop existing at a deadline.
//!
//! Expiry is evaluated lazily on every read: [`ExpiringMap::get_live`]
//! deletes an entry whose deadline has passed and reports it as absent.
//! Periodic purges only bound memory; they are never needed for a
//! correct answer.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// A value paired with the instant it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    pub fn new(value: T, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    /// Expire `ttl` after `now`. Saturates at the maximum representable time.
    pub fn for_duration(value: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::new(value, deadline_after(now, ttl))
    }

    /// The value, or `None` once the deadline has passed.
    pub fn get(&self, now: DateTime<Utc>) -> Option<&T> {
        self.is_live(now).then_some(&self.value)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// The value regardless of expiry.
    pub fn value(&self) -> &T {
        &self.value
    }
}

/// `now + ttl`, clamped instead of overflowing.
pub fn deadline_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A map whose entries disappear at their deadline.
#[derive(Debug)]
pub struct ExpiringMap<K, V> {
    entries: HashMap<K, Expiring<V>>,
}

impl<K: Eq + Hash, V> ExpiringMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, entry: Expiring<V>) -> Option<Expiring<V>> {
        self.entries.insert(key, entry)
    }

    /// Look up a live entry, deleting it if it has expired.
    pub fn get_live<Q>(&mut self, key: &Q, now: DateTime<Utc>) -> Option<&Expiring<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let expired = !self.entries.get(key)?.is_live(now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    pub fn contains_live<Q>(&mut self, key: &Q, now: DateTime<Utc>) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_live(key, now).is_some()
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<Expiring<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key)
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    /// Keep only entries for which `keep` returns true; returns how many
    /// were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &Expiring<V>) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, e| keep(k, e));
        before - self.entries.len()
    }

    /// Iterate live entries without mutating the map.
    pub fn iter_live(&self, now: DateTime<Utc>) -> impl Iterator<Item = (&K, &Expiring<V>)> {
        self.entries.iter().filter(move |(_, e)| e.is_live(now))
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    /// Entries stored, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for ExpiringMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
