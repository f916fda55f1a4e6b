//! Compatibility Gate: ordered rule evaluation (concept overlap, concept-in-
//! topic substring, fuzzy topic match, semantic LLM fallback) that decides
//! whether a query is in scope for a knowledge base before any retrieval is
//! attempted. Fails closed on any internal error.

use std::sync::Arc;

use crate::ingestion::topic;
use crate::llm::{GenerationOptions, LlmGateway};
use crate::types::ScopeCatalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny { reason: String },
}

const FUZZY_TOPIC_THRESHOLD: f32 = 0.6;
const CONCEPT_OVERLAP_THRESHOLD: f32 = 0.01;

pub struct CompatibilityGate {
    llm: Arc<LlmGateway>,
}

impl CompatibilityGate {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    #[tracing::instrument(skip(self, catalog))]
    pub async fn check(
        &self,
        query_topic: &str,
        query_concepts: &[String],
        catalog: &ScopeCatalog,
    ) -> GateDecision {
        if catalog.is_empty() {
            return GateDecision::Deny {
                reason: "empty_knowledge_base".to_string(),
            };
        }

        // Rule 1: concept overlap — any query concept equals, is a substring
        // of, or is a superstring of any catalog concept.
        if topic::concepts_match(query_concepts, &catalog.concepts, CONCEPT_OVERLAP_THRESHOLD) {
            return GateDecision::Allow;
        }

        // Rule 1b: any query concept appears as a substring within a catalog topic.
        if query_concepts
            .iter()
            .any(|qc| catalog.topics.iter().any(|t| t.contains(qc.as_str())))
        {
            return GateDecision::Allow;
        }

        // Rule 2: fuzzy topic match (substring or Jaccard >= 0.6).
        if catalog
            .topics
            .iter()
            .any(|t| topic::topics_match(query_topic, t, FUZZY_TOPIC_THRESHOLD))
        {
            return GateDecision::Allow;
        }

        // Rule 3: semantic LLM fallback.
        match self.check_semantic_relationship(query_topic, catalog).await {
            Ok(true) => GateDecision::Allow,
            Ok(false) => GateDecision::Deny {
                reason: format!("no_match: '{query_topic}' does not relate to this scope's documents"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Compatibility gate semantic check failed");
                GateDecision::Deny {
                    reason: "compatibility_check_failed".to_string(),
                }
            }
        }
    }

    async fn check_semantic_relationship(
        &self,
        query_topic: &str,
        catalog: &ScopeCatalog,
    ) -> Result<bool, crate::error::CoreError> {
        let topics = catalog.topics.join(", ");
        let prompt = format!(
            "Is '{query_topic}' related to or a sub-topic of the following Knowledge \
             Base topics: {topics}? Respond with exactly YES or NO."
        );
        let response = self.llm.generate(&prompt, &GenerationOptions::default()).await?;
        Ok(response.trim().to_uppercase().contains("YES"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use async_trait::async_trait;
    use crate::error::CoreError;

    struct FakeLlmProvider(Result<&'static str, ()>);

    #[async_trait]
    impl LlmProvider for FakeLlmProvider {
        async fn generate_raw(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, CoreError> {
            self.0
                .map(|s| s.to_string())
                .map_err(|_| CoreError::LLMUnavailable("boom".to_string()))
        }
    }

    fn catalog() -> ScopeCatalog {
        ScopeCatalog {
            scope_id: "scope-a".to_string(),
            document_count: 2,
            topics: vec!["machine learning".to_string()],
            concepts: vec!["neural network".to_string(), "gradient".to_string()],
            file_names: vec!["notes.txt".to_string()],
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_denies_with_empty_knowledge_base() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider(Ok("YES"))), 10));
        let gate = CompatibilityGate::new(llm);
        let decision = gate.check("anything", &[], &ScopeCatalog::default()).await;
        assert_eq!(
            decision,
            GateDecision::Deny {
                reason: "empty_knowledge_base".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concept_overlap_allows_without_llm_call() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider(Err(()))), 10));
        let gate = CompatibilityGate::new(llm);
        let decision = gate
            .check("deep learning", &["neural".to_string()], &catalog())
            .await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn test_fuzzy_topic_match_allows() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider(Err(()))), 10));
        let gate = CompatibilityGate::new(llm);
        let decision = gate
            .check("machine learning basics", &["unrelated".to_string()], &catalog())
            .await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn test_semantic_fallback_denies_on_no() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider(Ok("NO"))), 10));
        let gate = CompatibilityGate::new(llm);
        let decision = gate
            .check("cooking recipes", &["pasta".to_string()], &catalog())
            .await;
        assert!(matches!(decision, GateDecision::Deny { .. }));
    }

    #[tokio::test]
    async fn test_llm_failure_fails_closed() {
        let llm = Arc::new(LlmGateway::new(Arc::new(FakeLlmProvider(Err(()))), 10));
        let gate = CompatibilityGate::new(llm);
        let decision = gate
            .check("cooking recipes", &["pasta".to_string()], &catalog())
            .await;
        assert_eq!(
            decision,
            GateDecision::Deny {
                reason: "compatibility_check_failed".to_string()
            }
        );
    }
}
