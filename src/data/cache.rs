//! Time-bounded response cache.
//!
//! `TtlCache` holds values keyed by request shape and expires them after a
//! fixed time-to-live read from an injected `Clock`. `CachedOddsSource`
//! puts one in front of any `OddsSource` so repeated requests inside the
//! freshness window skip the upstream call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{OddsSource, SourceError};
use crate::types::Event;

/// Default freshness window for upstream responses.
pub const DEFAULT_TTL_SECS: i64 = 300;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

struct Entry<V> {
    stored_at: DateTime<Utc>,
    value: V,
}

/// String-keyed cache with a fixed time-to-live. Last write wins.
pub struct TtlCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let entry = entries.get(key)?;
        if now - entry.stored_at < self.ttl {
            return Some(entry.value.clone());
        }
        entries.remove(key);
        None
    }

    /// Store `value` under `key`, replacing anything already there.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let stored_at = self.clock.now();
        self.lock().insert(key.into(), Entry { stored_at, value });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // A poisoned map is still a valid map; staleness is the only risk.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// CachedOddsSource
// ---------------------------------------------------------------------------

/// Caching decorator over an `OddsSource`. Errors are never cached.
pub struct CachedOddsSource {
    inner: Arc<dyn OddsSource>,
    /// Distinguishes request shapes (regions, markets) sharing a sport key.
    shape: String,
    sports: TtlCache<Vec<String>>,
    events: TtlCache<Vec<Event>>,
}

impl CachedOddsSource {
    pub fn new(
        inner: Arc<dyn OddsSource>,
        shape: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            shape: shape.into(),
            sports: TtlCache::new(ttl, Arc::clone(&clock)),
            events: TtlCache::new(ttl, clock),
        }
    }

    fn events_key(&self, sport_key: &str) -> String {
        format!("events:{}:{sport_key}", self.shape)
    }
}

#[async_trait]
impl OddsSource for CachedOddsSource {
    async fn sports(&self) -> Result<Vec<String>, SourceError> {
        const KEY: &str = "sports";
        if let Some(hit) = self.sports.get(KEY) {
            debug!(key = KEY, "Cache hit");
            return Ok(hit);
        }
        let fresh = self.inner.sports().await?;
        self.sports.put(KEY, fresh.clone());
        Ok(fresh)
    }

    async fn events(&self, sport_key: &str) -> Result<Vec<Event>, SourceError> {
        let key = self.events_key(sport_key);
        if let Some(hit) = self.events.get(&key) {
            debug!(key = %key, events = hit.len(), "Cache hit");
            return Ok(hit);
        }
        let fresh = self.inner.events(sport_key).await?;
        debug!(
            key = %key,
            events = fresh.len(),
            ttl_secs = self.events.ttl().num_seconds(),
            "Cache refreshed"
        );
        self.events.put(key, fresh.clone());
        Ok(fresh)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
