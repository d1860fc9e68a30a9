// cache/metrics.rs - Hit, miss, write and invalidation counters for the cache service

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-category counters, keyed by entity type or by `list`, `metadata` and `auth`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EntityStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub writes: u64,
    pub deletes: u64,
}

/// Point-in-time view of [`CacheMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_ratio: f64,
    pub total_writes: u64,
    pub total_deletes: u64,
    pub invalidations: u64,
    pub average_invalidation_ms: f64,
    pub max_invalidation_ms: f64,
    pub total_errors: u64,
    pub entities: BTreeMap<&'static str, EntityStats>,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Totals {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
    invalidation_micros: AtomicU64,
    max_invalidation_micros: AtomicU64,
    errors: AtomicU64,
}

/// Lock-free totals plus a small per-category table.
pub struct CacheMetrics {
    totals: Totals,
    entities: RwLock<BTreeMap<&'static str, EntityStats>>,
    since: RwLock<DateTime<Utc>>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            totals: Totals::default(),
            entities: RwLock::new(BTreeMap::new()),
            since: RwLock::new(Utc::now()),
        }
    }

    pub fn record_hit(&self, category: &'static str) {
        self.totals.hits.fetch_add(1, Ordering::Relaxed);
        self.entities.write().entry(category).or_default().hits += 1;
    }

    pub fn record_miss(&self, category: &'static str) {
        self.totals.misses.fetch_add(1, Ordering::Relaxed);
        self.entities.write().entry(category).or_default().misses += 1;
    }

    pub fn record_write(&self, category: &'static str) {
        self.totals.writes.fetch_add(1, Ordering::Relaxed);
        self.entities.write().entry(category).or_default().writes += 1;
    }

    pub fn record_deletes(&self, category: &'static str, count: u64) {
        self.totals.deletes.fetch_add(count, Ordering::Relaxed);
        self.entities.write().entry(category).or_default().deletes += count;
    }

    pub fn record_invalidation(&self, took: Duration) {
        let micros = took.as_micros().min(u64::MAX as u128) as u64;
        self.totals.invalidations.fetch_add(1, Ordering::Relaxed);
        self.totals.invalidation_micros.fetch_add(micros, Ordering::Relaxed);
        self.totals.max_invalidation_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.totals.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let hits = self.totals.hits.load(Ordering::Relaxed);
        let misses = self.totals.misses.load(Ordering::Relaxed);
        let invalidations = self.totals.invalidations.load(Ordering::Relaxed);
        let invalidation_micros = self.totals.invalidation_micros.load(Ordering::Relaxed);

        let entities = self
            .entities
            .read()
            .iter()
            .map(|(name, stats)| {
                let stats = EntityStats {
                    hit_ratio: ratio(stats.hits, stats.misses),
                    ..*stats
                };
                (*name, stats)
            })
            .collect();

        CacheStats {
            total_hits: hits,
            total_misses: misses,
            hit_ratio: ratio(hits, misses),
            total_writes: self.totals.writes.load(Ordering::Relaxed),
            total_deletes: self.totals.deletes.load(Ordering::Relaxed),
            invalidations,
            average_invalidation_ms: if invalidations == 0 {
                0.0
            } else {
                invalidation_micros as f64 / invalidations as f64 / 1_000.0
            },
            max_invalidation_ms: self.totals.max_invalidation_micros.load(Ordering::Relaxed) as f64 / 1_000.0,
            total_errors: self.totals.errors.load(Ordering::Relaxed),
            entities,
            since: *self.since.read(),
        }
    }

    /// Zero every counter and restart the collection period.
    pub fn reset(&self) {
        for counter in [
            &self.totals.hits,
            &self.totals.misses,
            &self.totals.writes,
            &self.totals.deletes,
            &self.totals.invalidations,
            &self.totals.invalidation_micros,
            &self.totals.max_invalidation_micros,
            &self.totals.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.entities.write().clear();
        *self.since.write() = Utc::now();
        tracing::info!("Cache metrics reset");
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    match hits + misses {
        0 => 0.0,
        total => hits as f64 / total as f64,
    }
}
