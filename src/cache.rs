//! Bounded, time-to-live policy cache keyed by `(client_id, agent_id ∨ "")` (spec §4.4).
//!
//! Reads and single-key writes go through a [`dashmap::DashMap`] (matches the teacher's use of
//! `dashmap` throughout `runtime`); a separate insertion-order queue behind a `parking_lot::Mutex`
//! tracks eviction order, so "remove oldest" is a single `pop_front` per spec §9's "linked hash
//! map" design note.

use crate::types::Policy;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

pub type CacheKey = (String, String);

/// Policy cache configuration (spec §4.4 defaults: enabled, 60s TTL, 1000 entries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_ttl_ms() -> u64 {
    60_000
}
fn default_max_size() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: default_ttl_ms(),
            max_size: default_max_size(),
        }
    }
}

/// A cached policy plus its freshness bookkeeping (spec §3 "Cache Entry").
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub policy: Policy,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Bounded TTL map of tenant policies.
pub struct PolicyCache {
    config: CacheConfig,
    entries: DashMap<CacheKey, CacheEntry>,
    order: Mutex<VecDeque<CacheKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PolicyCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached policy for `key`, or `None` on a miss or an expired entry (invariant
    /// 6: "the cache never returns a stale entry past its expiresAt"). Expired entries are
    /// lazily purged.
    pub fn get(&self, key: &CacheKey) -> Option<Policy> {
        if !self.config.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = Utc::now();
        let hit = self.entries.get_mut(key).and_then(|mut entry| {
            if entry.expires_at <= now {
                None
            } else {
                entry.hit_count += 1;
                Some(entry.policy.clone())
            }
        });

        match hit {
            Some(policy) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(policy)
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Writes one entry per policy, keyed by `Policy::cache_key`.
    pub fn put_all(&self, policies: &[Policy]) {
        if !self.config.enabled {
            return;
        }
        let now = Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(self.config.ttl_ms as i64);
        for policy in policies {
            let key = policy.cache_key();
            let is_new = !self.entries.contains_key(&key);
            self.entries.insert(
                key.clone(),
                CacheEntry {
                    policy: policy.clone(),
                    cached_at: now,
                    expires_at,
                    hit_count: 0,
                },
            );
            if is_new {
                self.order.lock().push_back(key);
            }
        }
        self.evict_if_needed();
    }

    /// Removes oldest insertion-ordered entries until `size() <= max_size`.
    fn evict_if_needed(&self) {
        let mut order = self.order.lock();
        while self.entries.len() > self.config.max_size {
            match order.pop_front() {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Removes all entries whose stored policy's `client_id` equals `client_id`.
    pub fn invalidate(&self, client_id: &str) {
        self.entries
            .retain(|_, entry| entry.policy.client_id.as_deref() != Some(client_id));
        self.order
            .lock()
            .retain(|key| self.entries.contains_key(key));
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count() as f64;
        let total = hits + self.miss_count() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}
