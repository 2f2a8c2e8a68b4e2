//! Shared, read-mostly position cache.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::body::{CelestialBody, ReferenceFrame};
use crate::constants::DEFAULT_CACHE_CAPACITY;
use crate::error::ProviderError;
use crate::position::{Position, PositionProvider};

/// Cache key: one position per (body, frame, unix millisecond).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub body: CelestialBody,
    pub frame: ReferenceFrame,
    pub unix_ms: i64,
}

impl PositionKey {
    pub fn new(body: CelestialBody, frame: ReferenceFrame, instant: DateTime<Utc>) -> Self {
        Self {
            body,
            frame,
            unix_ms: instant.timestamp_millis(),
        }
    }
}

/// Snapshot of cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Concurrent position cache holding at most `capacity` positions.
///
/// Reads are lock-free. Writes are idempotent overwrites; a write that adds
/// a new key past capacity evicts the oldest keys first.
#[derive(Debug)]
pub struct PositionCache {
    entries: DashMap<PositionKey, Position>,
    order: Mutex<VecDeque<PositionKey>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &PositionKey) -> Option<Position> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, position: Position) {
        let key = PositionKey::new(position.body, position.frame, position.instant);
        if self.entries.insert(key, position).is_some() {
            return;
        }
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(key);
        while order.len() > self.capacity {
            let Some(oldest) = order.pop_front() else { break };
            self.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.clear();
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Read-through wrapper; failures are never cached.
pub struct CachedProvider<P> {
    inner: P,
    cache: Arc<PositionCache>,
}

impl<P: PositionProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_cache(inner, Arc::new(PositionCache::new()))
    }

    pub fn with_cache(inner: P, cache: Arc<PositionCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<PositionCache> {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: PositionProvider> PositionProvider for CachedProvider<P> {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        let key = PositionKey::new(body, frame, instant);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Position { instant, ..hit });
        }
        let position = self.inner.get_position(body, frame, instant)?;
        self.cache.insert(position);
        Ok(position)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn flush(&self) {
        self.inner.flush()
    }
}
