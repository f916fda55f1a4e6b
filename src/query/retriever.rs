//! Retriever: issues one vector search per paraphrase concurrently,
//! merges/dedups by chunk id, then applies MMR diversity reranking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embeddings::EmbeddingGateway;
use crate::error::CoreError;
use crate::storage::lance_store::VectorStore;
use crate::types::{Modality, SearchHit};

/// Named vector spaces searched for every query, matching the retrieval
/// default of covering text, image, and audio content in one pass.
const SEARCH_MODALITIES: [Modality; 3] = [Modality::Text, Modality::Image, Modality::Audio];

pub struct Retriever {
    embeddings: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    fetch_k: usize,
    mmr_lambda: f32,
    mmr_enabled: bool,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
        fetch_k: usize,
        mmr_lambda: f32,
        mmr_enabled: bool,
    ) -> Self {
        Self {
            embeddings,
            store,
            fetch_k,
            mmr_lambda,
            mmr_enabled,
        }
    }

    #[tracing::instrument(skip(self, paraphrases))]
    pub async fn retrieve(
        &self,
        paraphrases: &[String],
        scope_id: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let futures = paraphrases.iter().map(|p| self.search_one(p, scope_id));
        let per_query_results = futures::future::join_all(futures).await;

        let mut embeddings_by_id: HashMap<String, Vec<f32>> = HashMap::new();
        let mut merged: HashMap<String, SearchHit> = HashMap::new();

        for (result, vector) in per_query_results {
            let hits = result?;
            for hit in hits {
                if let Some(v) = &vector {
                    embeddings_by_id.entry(hit.chunk.id.clone()).or_insert_with(|| v.clone());
                }
                merged
                    .entry(hit.chunk.id.clone())
                    .and_modify(|existing| {
                        if hit.similarity > existing.similarity {
                            existing.similarity = hit.similarity;
                        }
                        for space in &hit.matched_spaces {
                            if !existing.matched_spaces.contains(space) {
                                existing.matched_spaces.push(*space);
                            }
                        }
                    })
                    .or_insert(hit);
            }
        }

        let mut candidates: Vec<SearchHit> = merged.into_values().collect();
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        if !self.mmr_enabled {
            candidates.truncate(top_k);
            return Ok(candidates);
        }

        Ok(self.apply_mmr(candidates, &embeddings_by_id, top_k))
    }

    /// Returns the raw hits plus the query's own embedding (used by MMR's
    /// true-cosine diversity step when a candidate's own embedding is
    /// unavailable some other way).
    async fn search_one(
        &self,
        query: &str,
        scope_id: &str,
    ) -> (Result<Vec<SearchHit>, CoreError>, Option<Vec<f32>>) {
        let vector = match self.embeddings.embed_text(query).await {
            Ok(v) => v,
            Err(e) => return (Err(e), None),
        };

        let spaces: Vec<(Modality, Vec<f32>)> = SEARCH_MODALITIES
            .iter()
            .map(|m| (*m, vector.clone()))
            .collect();
        let result = self.store.search_merged(&spaces, self.fetch_k, scope_id).await;
        (result, Some(vector))
    }

    /// Maximal Marginal Relevance: greedily pick the candidate maximizing
    /// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`,
    /// using true embedding cosine similarity to already-selected items when
    /// available, falling back to a retrieval-similarity proxy otherwise.
    fn apply_mmr(
        &self,
        candidates: Vec<SearchHit>,
        embeddings_by_id: &HashMap<String, Vec<f32>>,
        top_k: usize,
    ) -> Vec<SearchHit> {
        if candidates.is_empty() {
            return candidates;
        }

        let mut remaining = candidates;
        let mut selected: Vec<SearchHit> = Vec::with_capacity(top_k.min(remaining.len()));

        while !remaining.is_empty() && selected.len() < top_k {
            let mut best_index = 0;
            let mut best_score = f32::MIN;

            for (i, candidate) in remaining.iter().enumerate() {
                let max_sim_to_selected = selected
                    .iter()
                    .map(|s| self.similarity_between(candidate, s, embeddings_by_id))
                    .fold(0.0f32, f32::max);

                let score = self.mmr_lambda * candidate.similarity
                    - (1.0 - self.mmr_lambda) * max_sim_to_selected;

                if score > best_score {
                    best_score = score;
                    best_index = i;
                }
            }

            selected.push(remaining.remove(best_index));
        }

        selected
    }

    fn similarity_between(
        &self,
        a: &SearchHit,
        b: &SearchHit,
        embeddings_by_id: &HashMap<String, Vec<f32>>,
    ) -> f32 {
        match (
            embeddings_by_id.get(&a.chunk.id),
            embeddings_by_id.get(&b.chunk.id),
        ) {
            (Some(va), Some(vb)) => cosine_similarity(va, vb),
            // Fallback: a crude proxy from how close their retrieval scores are.
            _ => 1.0 - (a.similarity - b.similarity).abs(),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
