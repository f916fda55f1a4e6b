//! Conflict Detector: pairwise contradiction check over the first 5 passed
//! chunks from differing source files, content truncated to 1500 chars,
//! strict "Conflict: YES|NO\nDescription: ..." output format. Never causes a
//! refusal — it only switches the Generator into conflict-aware mode.

use std::sync::Arc;

use crate::llm::{GenerationOptions, LlmGateway};
use crate::query::grader::GradedChunk;

const EXCERPT_LIMIT: usize = 1500;
const MAX_CHUNKS_CONSIDERED: usize = 5;

#[derive(Debug, Clone)]
pub struct ConflictFinding {
    pub file_a: String,
    pub file_b: String,
    pub description: String,
}

pub struct ConflictDetector {
    llm: Arc<LlmGateway>,
}

impl ConflictDetector {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    #[tracing::instrument(skip(self, passed_chunks))]
    pub async fn detect(&self, passed_chunks: &[GradedChunk]) -> Option<ConflictFinding> {
        if passed_chunks.len() < 2 {
            return None;
        }

        let limited = &passed_chunks[..passed_chunks.len().min(MAX_CHUNKS_CONSIDERED)];

        for i in 0..limited.len() {
            for j in (i + 1)..limited.len() {
                let a = &limited[i];
                let b = &limited[j];
                if a.hit.chunk.file_name == b.hit.chunk.file_name {
                    continue;
                }

                if let Some(finding) = self.check_pair(a, b).await {
                    return Some(finding);
                }
            }
        }

        None
    }

    async fn check_pair(&self, a: &GradedChunk, b: &GradedChunk) -> Option<ConflictFinding> {
        let excerpt_a: String = a.hit.chunk.text.chars().take(EXCERPT_LIMIT).collect();
        let excerpt_b: String = b.hit.chunk.text.chars().take(EXCERPT_LIMIT).collect();

        let prompt = format!(
            "Compare these two document excerpts for factual contradictions.\n\n\
             Document A ({}):\n{excerpt_a}\n\n\
             Document B ({}):\n{excerpt_b}\n\n\
             Respond in exactly this format:\n\
             Conflict: [yes/no]\n\
             Description: [one sentence, or 'No conflict' if none]",
            a.hit.chunk.file_name, b.hit.chunk.file_name,
        );

        let response = match self.llm.generate(&prompt, &GenerationOptions::default()).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Conflict check LLM call failed, assuming no conflict");
                return None;
            }
        };

        parse_conflict_response(&response).map(|description| ConflictFinding {
            file_a: a.hit.chunk.file_name.clone(),
            file_b: b.hit.chunk.file_name.clone(),
            description,
        })
    }
}

/// Parses the "Conflict: yes/no\nDescription: ..." format. Returns `Some`
/// only when the model says YES *and* the description itself doesn't say
/// there's no conflict (guards against contradictory LLM output).
fn parse_conflict_response(response: &str) -> Option<String> {
    let mut has_conflict = false;
    let mut description = String::new();

    for line in response.lines() {
        let lower = line.to_lowercase();
        if let Some(rest) = lower.strip_prefix("conflict:") {
            has_conflict = rest.trim().contains("yes");
        } else if lower.starts_with("description:") {
            description = line[("description:".len())..].trim().to_string();
        }
    }

    if !has_conflict {
        return None;
    }
    if description.to_lowercase().contains("no conflict") {
        return None;
    }
    if description.is_empty() {
        return None;
    }

    Some(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::llm::LlmProvider;
    use crate::types::{Chunk, Citation, Modality, SearchHit, SourceType};
    use async_trait::async_trait;

    struct FakeLlmProvider(&'static str);

    #[async_trait]
    impl LlmProvider for FakeLlmProvider {
        async fn generate_raw(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }
    }

    fn graded(file_name: &str, text: &str) -> GradedChunk {
        GradedChunk {
            hit: SearchHit {
                chunk: Chunk {
                    id: format!("{file_name}-chunk"),
                    scope_id: "scope-a".to_string(),
                    doc_id: "doc".to_string(),
                    chunk_index: 0,
                    text: text.to_string(),
                    modality: Modality::Text,
                    source_type: SourceType::Txt,
                    file_name: file_name.to_string(),
                    document_topic: "topic".to_string(),
                    document_concepts: Vec::new(),
                    citation: Citation::default(),
                    created_at: 0,
                },
                similarity: 0.9,
                matched_spaces: vec![Modality::Text],
            },
            score: 0.9,
            passed: true,
        }
    }

    #[tokio::test]
    async fn test_no_conflict_when_fewer_than_two_chunks() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider("Conflict: yes\nDescription: x")), 10));
        let detector = ConflictDetector::new(llm);
        let result = detector.detect(&[graded("a.txt", "text")]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_same_source_file_pair_is_skipped() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider("Conflict: yes\nDescription: x")), 10));
        let detector = ConflictDetector::new(llm);
        let result = detector.detect(&[graded("a.txt", "text 1"), graded("a.txt", "text 2")]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_detects_genuine_conflict() {
        let llm = Arc::new(LlmGateway::new(
            Arc::new(FakeLlmProvider(
                "Conflict: YES\nDescription: Document A says X, Document B says Y",
            )),
            10,
        ));
        let detector = ConflictDetector::new(llm);
        let result = detector
            .detect(&[graded("a.txt", "text 1"), graded("b.txt", "text 2")])
            .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_description_saying_no_conflict_is_guarded_against() {
        let llm = Arc::new(LlmGateway::new(
            Arc::new(FakeLlmProvider("Conflict: yes\nDescription: No conflict found between these")),
            10,
        ));
        let detector = ConflictDetector::new(llm);
        let result = detector
            .detect(&[graded("a.txt", "text 1"), graded("b.txt", "text 2")])
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_conflict_response_no_case() {
        assert!(parse_conflict_response("Conflict: no\nDescription: No conflict").is_none());
    }
}
