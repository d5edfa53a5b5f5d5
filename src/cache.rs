// src/cache.rs
// =============================================================================
// TTL-bounded cache of fetched documents.
//
// - get: a hit only while `now - cached_at < ttl`. Older entries stay on
//   disk but read as misses
// - put: always overwrites; there is no history
// - sweep: the only thing that deletes expired entries
//
// The cache is best-effort. I/O and parse failures are logged and read as a
// miss; they never reach the crawl.
// =============================================================================

use crate::store::{sha256_hex, JsonStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One cached document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub content: String,
    pub headers: BTreeMap<String, String>,
    pub cached_at: DateTime<Utc>,
    pub content_hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

pub struct CacheStore {
    store: JsonStore<CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

// Fresh while the entry's age is under the TTL. A cached_at in the future
// (clock skew) counts as age zero.
fn is_fresh(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = (now - entry.cached_at).to_std().unwrap_or(Duration::ZERO);
    age < ttl
}

impl CacheStore {
    pub fn open(dir: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonStore::open(dir)?,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        self.get_at(url, Utc::now()).await
    }

    // Lookup as of `now`.
    pub async fn get_at(&self, url: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = match self.store.load(url).await {
            Ok(entry) => entry.filter(|e| is_fresh(e, self.ttl, now)),
            Err(e) => {
                tracing::warn!(url, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub async fn put(&self, url: &str, content: &str, headers: &BTreeMap<String, String>) {
        self.put_at(url, content, headers, Utc::now()).await
    }

    pub async fn put_at(
        &self,
        url: &str,
        content: &str,
        headers: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            url: url.to_string(),
            content: content.to_string(),
            headers: headers.clone(),
            cached_at: now,
            content_hash: sha256_hex(content),
            size: content.len() as u64,
        };
        match self.store.save(url, &entry).await {
            Ok(()) => tracing::debug!(url, bytes = entry.size, "cached"),
            Err(e) => tracing::warn!(url, error = %e, "cache write failed"),
        }
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    // Deletes every entry that is expired as of `now`; returns how many.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let items = match self.store.entries().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "cache sweep could not list entries");
                return 0;
            }
        };

        let mut evicted = 0;
        for item in items.iter().filter(|i| !is_fresh(&i.value, self.ttl, now)) {
            match self.store.remove_key(&item.key).await {
                Ok(()) => evicted += 1,
                Err(e) => tracing::warn!(url = %item.value.url, error = %e, "cache eviction failed"),
            }
        }
        tracing::info!(evicted, "cache sweep finished");
        evicted
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        match hits + misses {
            0 => 0.0,
            total => hits as f64 / total as f64,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let items = self.store.entries().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache stats could not list entries");
            Vec::new()
        });
        CacheStats {
            total_files: items.len(),
            total_bytes: items.iter().map(|i| i.bytes).sum(),
            expired: items.iter().filter(|i| !is_fresh(&i.value, self.ttl, now)).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}
