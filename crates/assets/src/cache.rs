// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::stats::CacheStats;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tabula_common::{CacheConfig, ContentHash, SyncError};
use tracing::{debug, warn};

/// Descriptive metadata supplied alongside bytes on insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetMetadata {
    pub name: String,
    pub origin_url: Option<String>,
    pub mime_type: String,
}

impl AssetMetadata {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin_url: None,
            mime_type: mime_type.into(),
        }
    }

    pub fn with_origin(mut self, origin_url: impl Into<String>) -> Self {
        self.origin_url = Some(origin_url.into());
        self
    }
}

/// One cached asset. Identity is the content hash: byte-identical inserts collapse to one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    pub id: ContentHash,
    pub name: String,
    pub origin_url: Option<String>,
    pub size_bytes: u64,
    pub mime_type: String,
    pub cached_at: SystemTime,
    pub last_accessed: SystemTime,
}

/// What a successful `put` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// False if the hash was already cached and only its metadata was refreshed.
    pub inserted: bool,
    /// Entries evicted to get back under the size cap.
    pub evicted: Vec<ContentHash>,
}

struct CacheEntry {
    record: AssetRecord,
    bytes: Bytes,
    /// Monotonic access sequence; breaks ties between equal `last_accessed` timestamps.
    access_seq: u64,
}

impl CacheEntry {
    fn lru_key(&self) -> (SystemTime, u64) {
        (self.record.last_accessed, self.access_seq)
    }
}

type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// In-memory content-addressed asset store.
///
/// Eviction is age-based first (`cleanup` drops entries cached longer ago than `max_age`), with
/// a size backstop: whenever total bytes exceed `max_bytes`, least-recently-accessed entries go
/// until the cache fits again. Stats are updated in the same call as the storage change they
/// describe.
pub struct AssetCache {
    config: CacheConfig,
    entries: HashMap<ContentHash, CacheEntry>,
    stats: CacheStats,
    access_seq: u64,
    clock: Clock,
}

impl AssetCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemTime::now)
    }

    /// A cache reading time from `clock` instead of the system clock.
    pub fn with_clock(
        config: CacheConfig,
        clock: impl Fn() -> SystemTime + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            stats: CacheStats::default(),
            access_seq: 0,
            clock: Arc::new(clock),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    pub fn has(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Fetch an asset's bytes, counting the hit or miss and refreshing `last_accessed` on a hit.
    pub fn get(&mut self, hash: &ContentHash) -> Option<Bytes> {
        let now = (self.clock)();
        let seq = self.next_seq();
        match self.entries.get_mut(hash) {
            Some(entry) => {
                entry.record.last_accessed = now;
                entry.access_seq = seq;
                self.stats.hit();
                Some(entry.bytes.clone())
            }
            None => {
                self.stats.miss();
                None
            }
        }
    }

    /// Insert an asset under its claimed content hash.
    ///
    /// The bytes are always re-digested; if they do not match `hash` the insert fails with
    /// `HashMismatch` and only the verification-failure counter moves.
    pub fn put(
        &mut self,
        hash: ContentHash,
        bytes: Bytes,
        metadata: AssetMetadata,
    ) -> Result<PutOutcome, SyncError> {
        let actual = ContentHash::of(&bytes);
        if actual != hash {
            self.stats.verification_failed();
            warn!(claimed = %hash, %actual, name = %metadata.name, "Rejecting asset with mismatched content hash");
            return Err(SyncError::HashMismatch {
                claimed: hash,
                actual,
            });
        }

        let size = bytes.len() as u64;
        if size > self.config.max_bytes {
            return Err(SyncError::TooLarge {
                hash,
                size,
                limit: self.config.max_bytes,
            });
        }

        let now = (self.clock)();
        let seq = self.next_seq();
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.record.name = metadata.name;
            entry.record.mime_type = metadata.mime_type;
            if metadata.origin_url.is_some() {
                entry.record.origin_url = metadata.origin_url;
            }
            entry.record.last_accessed = now;
            entry.access_seq = seq;
            debug!(%hash, "Asset already cached; refreshed metadata");
            return Ok(PutOutcome {
                inserted: false,
                evicted: vec![],
            });
        }

        let record = AssetRecord {
            id: hash,
            name: metadata.name,
            origin_url: metadata.origin_url,
            size_bytes: size,
            mime_type: metadata.mime_type,
            cached_at: now,
            last_accessed: now,
        };
        self.entries.insert(
            hash,
            CacheEntry {
                record,
                bytes,
                access_seq: seq,
            },
        );
        self.stats.add_entry(size);
        debug!(%hash, size, "Cached asset");

        let evicted = self.evict_to_fit(Some(hash));
        Ok(PutOutcome {
            inserted: true,
            evicted,
        })
    }

    pub fn remove(&mut self, hash: &ContentHash) -> bool {
        match self.entries.remove(hash) {
            Some(entry) => {
                self.stats.remove_entry(entry.record.size_bytes);
                true
            }
            None => false,
        }
    }

    /// Drop entries older than the configured max age, then apply the size backstop.
    pub fn cleanup(&mut self) -> Vec<ContentHash> {
        let now = (self.clock)();
        let max_age = self.config.max_age;
        let expired: Vec<ContentHash> = self
            .entries
            .values()
            .filter(|e| age(now, e.record.cached_at) > max_age)
            .map(|e| e.record.id)
            .collect();
        for hash in &expired {
            self.remove(hash);
        }
        let mut evicted = expired;
        evicted.extend(self.evict_to_fit(None));
        self.stats.last_cleanup = Some(now);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Cache cleanup evicted assets");
        }
        evicted
    }

    /// Evict everything. Lookup counters survive; totals go to zero.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.total_assets = 0;
        self.stats.total_bytes = 0;
        count
    }

    /// Evict least-recently-accessed entries until under `max_bytes`, never evicting `keep`.
    fn evict_to_fit(&mut self, keep: Option<ContentHash>) -> Vec<ContentHash> {
        let mut evicted = vec![];
        while self.stats.total_bytes > self.config.max_bytes {
            let victim = self
                .entries
                .values()
                .filter(|e| Some(e.record.id) != keep)
                .min_by_key(|e| e.lru_key())
                .map(|e| e.record.id);
            let Some(victim) = victim else {
                break;
            };
            self.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }

    pub fn record(&self, hash: &ContentHash) -> Option<&AssetRecord> {
        self.entries.get(hash).map(|e| &e.record)
    }

    /// All records, most recently accessed first.
    pub fn records(&self) -> Vec<&AssetRecord> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.lru_key()));
        entries.into_iter().map(|e| &e.record).collect()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Re-derive the stats from the stored entries, keeping the lookup counters.
    pub fn recompute_stats(&self) -> CacheStats {
        CacheStats {
            total_assets: self.entries.len(),
            total_bytes: self.entries.values().map(|e| e.record.size_bytes).sum(),
            ..self.stats.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn age(now: SystemTime, then: SystemTime) -> Duration {
    now.duration_since(then).unwrap_or_default()
}
