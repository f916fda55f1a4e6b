//! Evidence Grader: binary per-chunk relevance (YES→0.9, NO→0.0, error→0.5
//! neutral), content truncated to 2000 chars before prompting. Aggregate
//! sufficiency requires at least one passed chunk AND an average score above
//! the sufficiency threshold (see DESIGN.md for the threshold rationale).

use std::sync::Arc;

use crate::llm::{GenerationOptions, LlmGateway};
use crate::types::SearchHit;

const EXCERPT_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct GradedChunk {
    pub hit: SearchHit,
    pub score: f32,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct GradingResult {
    pub graded: Vec<GradedChunk>,
    pub is_sufficient: bool,
    pub avg_score: f32,
}

pub struct EvidenceGrader {
    llm: Arc<LlmGateway>,
    pass_threshold: f32,
    sufficiency_threshold: f32,
}

impl EvidenceGrader {
    pub fn new(llm: Arc<LlmGateway>, pass_threshold: f32, sufficiency_threshold: f32) -> Self {
        Self {
            llm,
            pass_threshold,
            sufficiency_threshold,
        }
    }

    #[tracing::instrument(skip(self, hits))]
    pub async fn grade(&self, query: &str, hits: Vec<SearchHit>) -> GradingResult {
        let futures = hits.into_iter().map(|hit| self.grade_one(query, hit));
        let graded: Vec<GradedChunk> = futures::future::join_all(futures).await;

        let passed_count = graded.iter().filter(|g| g.passed).count();
        let avg_score = if graded.is_empty() {
            0.0
        } else {
            graded.iter().map(|g| g.score).sum::<f32>() / graded.len() as f32
        };

        let is_sufficient = passed_count > 0 && avg_score >= self.sufficiency_threshold;

        GradingResult {
            graded,
            is_sufficient,
            avg_score,
        }
    }

    async fn grade_one(&self, query: &str, hit: SearchHit) -> GradedChunk {
        let excerpt: String = hit.chunk.text.chars().take(EXCERPT_LIMIT).collect();
        let prompt = format!(
            "Task: Is this document relevant to the question?\n\
             Question: {query}\n\
             Document: {excerpt}\n\
             Respond with only 'YES' or 'NO'."
        );

        let score = match self.llm.generate(&prompt, &GenerationOptions::default()).await {
            Ok(response) => {
                let normalized = response.trim().to_uppercase();
                if normalized.contains("YES") {
                    0.9
                } else {
                    0.0
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Evidence grading LLM call failed, using neutral score");
                0.5
            }
        };

        let passed = score >= self.pass_threshold;
        GradedChunk { hit, score, passed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::llm::LlmProvider;
    use crate::types::{Chunk, Citation, Modality, SourceType};
    use async_trait::async_trait;

    struct FakeLlmProvider(Vec<&'static str>, std::sync::Mutex<usize>);

    impl FakeLlmProvider {
        fn sequence(responses: Vec<&'static str>) -> Self {
            Self(responses, std::sync::Mutex::new(0))
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlmProvider {
        async fn generate_raw(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, CoreError> {
            let mut idx = self.1.lock().unwrap();
            let response = self.0[*idx % self.0.len()];
            *idx += 1;
            Ok(response.to_string())
        }
    }

    fn hit(id: &str, text: &str) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: id.to_string(),
                scope_id: "scope-a".to_string(),
                doc_id: "doc-1".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                modality: Modality::Text,
                source_type: SourceType::Txt,
                file_name: "notes.txt".to_string(),
                document_topic: "topic".to_string(),
                document_concepts: Vec::new(),
                citation: Citation::default(),
                created_at: 0,
            },
            similarity: 0.9,
            matched_spaces: vec![Modality::Text],
        }
    }

    #[tokio::test]
    async fn test_all_relevant_chunks_are_sufficient() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider::sequence(vec!["YES"])), 10));
        let grader = EvidenceGrader::new(llm, 0.5, 0.4);
        let result = grader.grade("q", vec![hit("1", "a"), hit("2", "b")]).await;
        assert!(result.is_sufficient);
        assert!(result.graded.iter().all(|g| g.passed));
    }

    #[tokio::test]
    async fn test_no_relevant_chunks_is_insufficient() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider::sequence(vec!["NO"])), 10));
        let grader = EvidenceGrader::new(llm, 0.5, 0.4);
        let result = grader.grade("q", vec![hit("1", "a")]).await;
        assert!(!result.is_sufficient);
    }

    #[tokio::test]
    async fn test_single_pass_below_average_threshold_is_insufficient() {
        // One YES (0.9) among four NOs (0.0) -> avg 0.225 < 0.4 sufficiency threshold.
        let llm = Arc::new(LlmGateway::new(
            Arc::new(FakeLlmProvider::sequence(vec!["YES", "NO", "NO", "NO"])),
            10,
        ));
        let grader = EvidenceGrader::new(llm, 0.5, 0.4);
        let hits = vec![hit("1", "a"), hit("2", "b"), hit("3", "c"), hit("4", "d")];
        let result = grader.grade("q", hits).await;
        assert!(result.graded.iter().filter(|g| g.passed).count() >= 1);
        assert!(!result.is_sufficient);
    }
}
