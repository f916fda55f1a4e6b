//! Pipeline configuration: nested per-concern structs, a `validate()` pass,
//! and a `Default` impl with the reference thresholds baked in.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub evidence: EvidenceConfig,
    pub llm: LlmConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub fetch_k: usize,
    pub similarity_threshold: f32,
    pub mmr_lambda: f32,
    pub mmr_enabled: bool,
    pub multi_query_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Per-chunk pass/fail threshold applied to the grader's binary score.
    pub pass_threshold: f32,
    /// Aggregate average-score threshold required in addition to
    /// "at least one chunk passed" for the batch to be deemed sufficient.
    pub sufficiency_threshold: f32,
    pub max_conflict_pairs_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub max_file_size_bytes: u64,
    pub batch_size: usize,
}

impl PipelineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.chunking.chunk_size < 50 {
            return Err("chunking.chunk_size must be >= 50".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.retrieval.default_top_k == 0 {
            return Err("retrieval.default_top_k must be > 0".into());
        }
        if self.retrieval.fetch_k < self.retrieval.default_top_k {
            return Err("retrieval.fetch_k must be >= default_top_k".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err("retrieval.similarity_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err("retrieval.mmr_lambda must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.evidence.pass_threshold) {
            return Err("evidence.pass_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.evidence.sufficiency_threshold) {
            return Err("evidence.sufficiency_threshold must be in [0.0, 1.0]".into());
        }
        if self.llm.timeout_secs == 0 {
            return Err("llm.timeout_secs must be > 0".into());
        }
        if self.ingestion.max_file_size_bytes == 0 {
            return Err("ingestion.max_file_size_bytes must be > 0".into());
        }
        if self.ingestion.batch_size == 0 || self.ingestion.batch_size > 100 {
            return Err("ingestion.batch_size must be in 1..=100".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rag-core");

        Self {
            data_dir,
            embedding: EmbeddingConfig {
                dimension: 512,
                cache_size: 1000,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 150,
                min_chunk_size: 100,
            },
            retrieval: RetrievalConfig {
                default_top_k: 10,
                fetch_k: 20,
                similarity_threshold: 0.35,
                mmr_lambda: 0.7,
                mmr_enabled: true,
                multi_query_count: 3,
            },
            evidence: EvidenceConfig {
                pass_threshold: 0.5,
                sufficiency_threshold: 0.4,
                max_conflict_pairs_chunks: 5,
            },
            llm: LlmConfig {
                timeout_secs: 120,
                temperature: 0.2,
                max_tokens: 512,
            },
            ingestion: IngestionConfig {
                max_file_size_bytes: 50 * 1024 * 1024,
                batch_size: 100,
            },
        }
    }
}
