//! Block cache.
//!
//! Maps a physical block id to a shared, immutable copy of its bytes. The
//! cache holds at most `capacity` blocks and evicts the least recently used
//! one when full. A capacity of 0 disables caching.

use crate::prelude::*;
use core::num::NonZeroUsize;
use lru::LruCache;
use spin::Mutex;

pub struct BlockCache {
    inner: Option<Mutex<LruCache<PBlockId, Arc<[u8]>>>>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Cached bytes of block `id`, refreshing its recency
    pub fn get(&self, id: PBlockId) -> Option<Arc<[u8]>> {
        let hit = self.inner.as_ref()?.lock().get(&id).cloned();
        if hit.is_some() {
            trace!("Block cache hit: {}", id);
        }
        hit
    }

    /// Insert or replace block `id`
    pub fn put(&self, id: PBlockId, data: Arc<[u8]>) {
        if let Some(inner) = &self.inner {
            if let Some((evicted, _)) = inner.lock().push(id, data) {
                if evicted != id {
                    trace!("Block cache evict: {}", evicted);
                }
            }
        }
    }

    pub fn invalidate(&self, id: PBlockId) {
        if let Some(inner) = &self.inner {
            inner.lock().pop(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().cap().get())
    }

    pub fn contains(&self, id: PBlockId) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.lock().contains(&id))
    }
}

impl Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
