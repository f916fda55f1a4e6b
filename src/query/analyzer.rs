//! Query Analyzer (C6): derives a query's topic/concepts and a small set of
//! paraphrases for multi-query retrieval. Short-circuits on an empty
//! knowledge base before ever calling the LLM, falls back to a deterministic
//! topic/concept extraction on LLM failure, and always prepends the original
//! query to its paraphrase list, capped at three total.

use std::sync::Arc;

use crate::ingestion::topic;
use crate::llm::{GenerationOptions, LlmGateway};
use crate::types::ScopeCatalog;

#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub query_topic: String,
    pub query_concepts: Vec<String>,
    pub paraphrases: Vec<String>,
}

pub struct QueryAnalyzer {
    llm: Arc<LlmGateway>,
    multi_query_count: usize,
}

impl QueryAnalyzer {
    pub fn new(llm: Arc<LlmGateway>, multi_query_count: usize) -> Self {
        Self {
            llm,
            multi_query_count,
        }
    }

    #[tracing::instrument(skip(self, catalog))]
    pub async fn analyze(&self, query: &str, catalog: &ScopeCatalog) -> QueryAnalysis {
        // Step 0: an empty knowledge base skips the LLM entirely.
        if catalog.topics.is_empty() && catalog.concepts.is_empty() {
            return self.deterministic_analysis(query);
        }

        let prompt = format!(
            "Analyze the following question and identify its main topic and key \
             concepts.\n\nQuestion: {query}\n\n\
             Respond in exactly this format:\n\
             Topic: [topic name] | Concepts: [concept1, concept2, concept3]"
        );

        let (query_topic, query_concepts) =
            match self.llm.generate(&prompt, &GenerationOptions::default()).await {
                Ok(response) => topic::parse_topic_response(&response)
                    .unwrap_or_else(|| topic::fallback_topic_and_concepts(query)),
                Err(e) => {
                    tracing::warn!(error = %e, "Query topic derivation failed, using fallback");
                    topic::fallback_topic_and_concepts(query)
                }
            };

        let paraphrases = self.generate_paraphrases(query).await;

        QueryAnalysis {
            query_topic,
            query_concepts,
            paraphrases,
        }
    }

    fn deterministic_analysis(&self, query: &str) -> QueryAnalysis {
        let words: Vec<&str> = query.split_whitespace().collect();
        let query_topic = words
            .iter()
            .take(2)
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let query_concepts = topic::extract_concepts_from_text(query, 3);

        QueryAnalysis {
            query_topic,
            query_concepts,
            paraphrases: vec![query.to_string()],
        }
    }

    async fn generate_paraphrases(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "Generate 2 alternative phrasings of the following question, one per \
             line, without numbering or commentary:\n\n{query}"
        );

        let alternatives = match self.llm.generate(&prompt, &GenerationOptions::default()).await {
            Ok(response) => parse_alternative_lines(&response),
            Err(e) => {
                tracing::warn!(error = %e, "Paraphrase generation failed, using original query only");
                Vec::new()
            }
        };

        let mut all = vec![query.to_string()];
        all.extend(alternatives.into_iter());
        all.truncate(self.multi_query_count.max(1));
        all
    }
}

fn parse_alternative_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches('.')
                .trim_start_matches(')')
                .trim()
        })
        .filter(|line| line.len() > 10)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use async_trait::async_trait;
    use crate::error::CoreError;

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

    #[tokio::test]
    async fn test_empty_catalog_skips_llm_and_uses_deterministic_fallback() {
        let llm = Arc::new(LlmGateway::new(
            Arc::new(FakeLlmProvider("should not be used")),
            10,
        ));
        let analyzer = QueryAnalyzer::new(llm, 3);
        let catalog = ScopeCatalog::default();
        let analysis = analyzer.analyze("what is photosynthesis", &catalog).await;
        assert_eq!(analysis.query_topic, "What Is");
        assert!(analysis.paraphrases.contains(&"what is photosynthesis".to_string()));
    }

    #[tokio::test]
    async fn test_paraphrases_always_include_original_query_first() {
        let llm = Arc::new(LlmGateway::new(
            Arc::new(FakeLlmProvider("How does light become chemical energy?\nWhat converts sunlight into food for plants?")),
            10,
        ));
        let analyzer = QueryAnalyzer::new(llm, 3);
        let catalog = ScopeCatalog {
            topics: vec!["biology".to_string()],
            ..Default::default()
        };
        let analysis = analyzer.analyze("how does photosynthesis work", &catalog).await;
        assert_eq!(analysis.paraphrases[0], "how does photosynthesis work");
        assert!(analysis.paraphrases.len() <= 3);
    }

    #[test]
    fn test_parse_alternative_lines_filters_short_lines() {
        let lines = parse_alternative_lines("1. A proper alternative phrasing here\nok\n2) Another decent one right here");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "A proper alternative phrasing here");
    }
}
