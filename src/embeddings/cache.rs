//! Bounded embedding cache: evicts the least-recently-used key once the
//! configured capacity (default 1000 entries) is reached.

use lru::LruCache;
use std::num::NonZeroUsize;

pub struct EmbeddingCache {
    inner: LruCache<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        self.inner.get(key).cloned()
    }

    pub fn put(&mut self, key: String, value: Vec<f32>) {
        self.inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
