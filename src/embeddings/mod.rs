//! Embedding Gateway (C2): turns text or image bytes into L2-normalized,
//! fixed-dimension vectors, behind a bounded cache.
//!
//! Model internals (ONNX runtime, tokenizer loading) are out of scope — this
//! crate only needs the *contract*: a trait, a cache, and an error taxonomy
//! callers can rely on. The default implementation below produces
//! deterministic feature-hash projections, which satisfy the contract
//! (stable, L2-normalized, fixed-D) without shipping a model.

mod cache;

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::CoreError;
pub use cache::EmbeddingCache;

/// Unified embedding gateway, covering both text and image input.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, CoreError>;
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, CoreError>;
    fn dimension(&self) -> usize;
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Deterministic feature-hash projection into `dimension` buckets, with a
/// sign derived from a second hash — a stand-in for a real embedding model
/// that still satisfies "stable vector per input, L2-normalized, fixed D".
fn hash_project(tokens: impl Iterator<Item = u64>, dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimension];
    for token in tokens {
        let bucket = (token % dimension as u64) as usize;
        let sign = if (token / dimension as u64) % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        v[bucket] += sign;
    }
    l2_normalize(v)
}

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn text_tokens(text: &str) -> impl Iterator<Item = u64> + '_ {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| fnv1a(word.as_bytes(), i as u64))
}

/// Default `EmbeddingGateway` backed by deterministic hash projection and a
/// bounded LRU cache (1000 entries by default).
pub struct HashEmbeddingGateway {
    dimension: usize,
    text_cache: Mutex<EmbeddingCache>,
    image_cache: Mutex<EmbeddingCache>,
}

impl HashEmbeddingGateway {
    pub fn new(dimension: usize, cache_size: usize) -> Self {
        Self {
            dimension,
            text_cache: Mutex::new(EmbeddingCache::new(cache_size)),
            image_cache: Mutex::new(EmbeddingCache::new(cache_size)),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for HashEmbeddingGateway {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        if text.trim().is_empty() {
            return Err(CoreError::EmptyInput);
        }

        let key = text.to_string();
        if let Some(cached) = self.text_cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let vector = hash_project(text_tokens(text), self.dimension);
        self.text_cache.lock().unwrap().put(key, vector.clone());
        Ok(vector)
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::EmptyInput);
        }

        let decoded =
            image::load_from_memory(bytes).map_err(|e| CoreError::BadImage(e.to_string()))?;

        let key = format!("{:x}", fnv1a(bytes, 0));
        if let Some(cached) = self.image_cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let rgb = decoded.to_rgb8();
        let pixel_tokens = rgb
            .pixels()
            .enumerate()
            .map(|(i, p)| fnv1a(&p.0, i as u64));
        let vector = hash_project(pixel_tokens, self.dimension);
        self.image_cache.lock().unwrap().put(key, vector.clone());
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
