// src/cache.rs
//! Two-tier freshness cache.
//!
//! Each entry remembers when it was written and the polling interval of the
//! source it came from. A read classifies it:
//!
//! - `Interval`: younger than the source interval, skip re-fetching entirely,
//! - `Ttl`: older than the interval but inside the process-wide TTL, usable
//!   but due for refresh,
//! - expired: evicted on read, caller sees a miss.
//!
//! `ttl_ms` should be >= every interval passed to `set`; otherwise entries
//! expire before their interval elapses. That is not enforced here.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    Interval,
    Ttl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<V> {
    pub value: V,
    pub status: Freshness,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    updated_at_ms: u64,
    source_interval_ms: u64,
}

/// Process-local keyed cache. Thread-safe; values are cloned out on read.
#[derive(Debug)]
pub struct FreshnessCache<V> {
    ttl_ms: u64,
    inner: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> FreshnessCache<V> {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Insert or overwrite `key`.
    pub fn set(&self, key: impl Into<String>, value: V, source_interval_ms: u64, now_ms: u64) {
        let mut map = self.lock();
        map.insert(
            key.into(),
            Entry {
                value,
                updated_at_ms: now_ms,
                source_interval_ms,
            },
        );
        metrics::gauge!("freshness_cache_entries").set(map.len() as f64);
    }

    pub fn get(&self, key: &str, now_ms: u64) -> Option<CacheHit<V>> {
        let mut map = self.lock();
        let entry = map.get(key)?;

        if let Some(status) = self.classify(entry, now_ms) {
            return Some(CacheHit {
                value: entry.value.clone(),
                status,
            });
        }

        map.remove(key);
        metrics::gauge!("freshness_cache_entries").set(map.len() as f64);
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|e| e.value)
    }

    /// Drop every entry `get` would treat as a miss. Returns how many were evicted.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| self.classify(e, now_ms).is_some());
        metrics::gauge!("freshness_cache_entries").set(map.len() as f64);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn classify(&self, entry: &Entry<V>, now_ms: u64) -> Option<Freshness> {
        let age = now_ms.saturating_sub(entry.updated_at_ms);
        if age <= entry.source_interval_ms {
            Some(Freshness::Interval)
        } else if age <= self.ttl_ms {
            Some(Freshness::Ttl)
        } else {
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

/// Wall clock in unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
