// quota/counter.rs - Request counting backends for rate limiting

use async_trait::async_trait;
use deadpool_redis::Pool;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::clock::Clock;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter backend unavailable: {0}")]
    Unavailable(String),

    #[error("counter command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for CounterError {
    fn from(err: redis::RedisError) -> Self {
        CounterError::Command(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CounterError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CounterError::Unavailable(err.to_string())
    }
}

/// Entries still inside a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlidingWindow {
    pub count: u64,
    /// Timestamp of the oldest entry in the window.
    pub oldest: Option<i64>,
}

/// Counting store behind the rate limiters.
///
/// Fixed windows encode their bucket in the key; sliding windows keep one
/// scored entry per event.
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Increment a fixed-window counter, returning the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError>;

    async fn current(&self, key: &str) -> Result<u64, CounterError>;

    /// Drop entries at or before `window_start` and report what remains.
    async fn sliding_count(&self, key: &str, window_start: i64) -> Result<SlidingWindow, CounterError>;

    async fn sliding_record(&self, key: &str, at: i64, ttl: Duration) -> Result<(), CounterError>;
}

#[derive(Debug)]
enum Slot {
    Fixed { count: u64, expires_at: i64 },
    Sliding { entries: Vec<i64>, expires_at: i64 },
}

impl Slot {
    fn expires_at(&self) -> i64 {
        match self {
            Slot::Fixed { expires_at, .. } | Slot::Sliding { expires_at, .. } => *expires_at,
        }
    }
}

/// Bulk expiry runs at most this often, by the counter's clock.
const SWEEP_INTERVAL_SECS: i64 = 60;

struct Slots {
    map: HashMap<String, Slot>,
    last_sweep: i64,
}

/// Process-local counter.
///
/// Each call only checks the expiry of the slot it touches; expired slots of
/// idle principals are dropped by a sweep folded into the first call after
/// each sweep interval.
pub struct MemoryRateCounter {
    slots: Mutex<Slots>,
    clock: Arc<dyn Clock>,
}

impl MemoryRateCounter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now_unix();
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                last_sweep,
            }),
            clock,
        }
    }

    /// Lock the slots with `key` cleared if it has expired.
    fn slots_for(&self, key: &str, now: i64) -> parking_lot::MutexGuard<'_, Slots> {
        let mut slots = self.slots.lock();
        if now - slots.last_sweep >= SWEEP_INTERVAL_SECS {
            let before = slots.map.len();
            slots.map.retain(|_, slot| slot.expires_at() > now);
            slots.last_sweep = now;
            tracing::trace!("Rate counter sweep dropped {} slots", before - slots.map.len());
        } else if slots.map.get(key).is_some_and(|slot| slot.expires_at() <= now) {
            slots.map.remove(key);
        }
        slots
    }

    /// Slots currently held, live or not yet swept.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().map.len()
    }
}

#[async_trait]
impl RateCounter for MemoryRateCounter {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let now = self.clock.now_unix();
        let expires_at = now + ttl.as_secs() as i64;
        let mut slots = self.slots_for(key, now);
        let slot = slots
            .map
            .entry(key.to_string())
            .or_insert(Slot::Fixed { count: 0, expires_at });

        match slot {
            Slot::Fixed { count, expires_at: slot_expiry } => {
                *count += 1;
                *slot_expiry = expires_at;
                Ok(*count)
            }
            Slot::Sliding { .. } => Err(CounterError::Command(format!("{} holds a sliding window", key))),
        }
    }

    async fn current(&self, key: &str) -> Result<u64, CounterError> {
        let now = self.clock.now_unix();
        match self.slots_for(key, now).map.get(key) {
            Some(Slot::Fixed { count, .. }) => Ok(*count),
            Some(Slot::Sliding { entries, .. }) => Ok(entries.len() as u64),
            None => Ok(0),
        }
    }

    async fn sliding_count(&self, key: &str, window_start: i64) -> Result<SlidingWindow, CounterError> {
        let now = self.clock.now_unix();
        let mut slots = self.slots_for(key, now);
        match slots.map.get_mut(key) {
            Some(Slot::Sliding { entries, .. }) => {
                entries.retain(|at| *at > window_start);
                Ok(SlidingWindow {
                    count: entries.len() as u64,
                    oldest: entries.iter().min().copied(),
                })
            }
            Some(Slot::Fixed { .. }) => Err(CounterError::Command(format!("{} holds a fixed window", key))),
            None => Ok(SlidingWindow::default()),
        }
    }

    async fn sliding_record(&self, key: &str, at: i64, ttl: Duration) -> Result<(), CounterError> {
        let now = self.clock.now_unix();
        let expires_at = now + ttl.as_secs() as i64;
        let mut slots = self.slots_for(key, now);
        let slot = slots.map.entry(key.to_string()).or_insert(Slot::Sliding {
            entries: Vec::new(),
            expires_at,
        });

        match slot {
            Slot::Sliding { entries, expires_at: slot_expiry } => {
                entries.push(at);
                *slot_expiry = expires_at;
                Ok(())
            }
            Slot::Fixed { .. } => Err(CounterError::Command(format!("{} holds a fixed window", key))),
        }
    }
}

/// Redis counter: `INCR`/`EXPIRE` for fixed windows, sorted sets for sliding ones.
pub struct RedisRateCounter {
    pool: Pool,
}

impl RedisRateCounter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateCounter for RedisRateCounter {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let mut conn = self.pool.get().await?;
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn current(&self, key: &str) -> Result<u64, CounterError> {
        let mut conn = self.pool.get().await?;
        let count: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(count.unwrap_or(0))
    }

    async fn sliding_count(&self, key: &str, window_start: i64) -> Result<SlidingWindow, CounterError> {
        let mut conn = self.pool.get().await?;
        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(window_start)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        Ok(SlidingWindow {
            count,
            oldest: oldest.first().map(|(_, score)| *score as i64),
        })
    }

    async fn sliding_record(&self, key: &str, at: i64, ttl: Duration) -> Result<(), CounterError> {
        let mut conn = self.pool.get().await?;
        // Members must be unique within the set
        let member = format!("{}-{}", at, Uuid::new_v4().simple());
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(key)
            .arg(at)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
