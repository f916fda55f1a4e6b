//! Query pipeline orchestration: Analyzer -> Catalog + Gate ->
//! [refuse | Retriever] -> Grader -> [refuse | ConflictDetector] ->
//! Generator -> answer or typed refusal.

pub mod analyzer;
pub mod catalog;
pub mod conflict;
pub mod gate;
pub mod generator;
pub mod grader;
pub mod refusal;
pub mod retriever;

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::embeddings::EmbeddingGateway;
use crate::llm::LlmGateway;
use crate::storage::lance_store::VectorStore;
use crate::types::{QueryRequest, QueryResponse};

use analyzer::QueryAnalyzer;
use catalog::ScopeCatalogReader;
use conflict::ConflictDetector;
use gate::{CompatibilityGate, GateDecision};
use generator::Generator;
use grader::EvidenceGrader;
use retriever::Retriever;

pub struct QueryPipeline {
    catalog_reader: ScopeCatalogReader,
    analyzer: QueryAnalyzer,
    gate: CompatibilityGate,
    retriever: Retriever,
    grader: EvidenceGrader,
    conflict_detector: ConflictDetector,
    generator: Generator,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<dyn EmbeddingGateway>,
        llm: Arc<LlmGateway>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            catalog_reader: ScopeCatalogReader::new(store.clone()),
            analyzer: QueryAnalyzer::new(llm.clone(), config.retrieval.multi_query_count),
            gate: CompatibilityGate::new(llm.clone()),
            retriever: Retriever::new(
                embeddings,
                store,
                config.retrieval.fetch_k,
                config.retrieval.mmr_lambda,
                config.retrieval.mmr_enabled,
            ),
            grader: EvidenceGrader::new(
                llm.clone(),
                config.evidence.pass_threshold,
                config.evidence.sufficiency_threshold,
            ),
            conflict_detector: ConflictDetector::new(llm.clone()),
            generator: Generator::new(llm),
            top_k: config.retrieval.default_top_k,
        }
    }

    #[tracing::instrument(skip(self, request), fields(scope_id = %request.scope_id))]
    pub async fn answer(&self, request: QueryRequest) -> QueryResponse {
        let catalog = match self.catalog_reader.load(&request.scope_id).await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load scope catalog");
                return refused(refusal::generation_failed());
            }
        };

        let analysis = self.analyzer.analyze(&request.query, &catalog).await;

        let gate_decision = self
            .gate
            .check(&analysis.query_topic, &analysis.query_concepts, &catalog)
            .await;
        if let GateDecision::Deny { .. } = &gate_decision {
            return refused(refusal::from_gate_denial(&gate_decision));
        }

        let hits = match self
            .retriever
            .retrieve(&analysis.paraphrases, &request.scope_id, self.top_k)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed");
                return refused(refusal::no_retrieved_documents());
            }
        };
        if hits.is_empty() {
            return refused(refusal::no_retrieved_documents());
        }

        let grading = self.grader.grade(&request.query, hits).await;
        let passed_count = grading.graded.iter().filter(|g| g.passed).count();
        if !grading.is_sufficient {
            if passed_count > 0 {
                tracing::info!(avg_score = grading.avg_score, "Evidence grading found passed chunks but average score is below the sufficiency threshold");
                return refused(refusal::topic_drift());
            }
            return refused(refusal::insufficient_evidence());
        }

        let passed_chunks: Vec<_> = grading.graded.into_iter().filter(|g| g.passed).collect();
        let conflict = self.conflict_detector.detect(&passed_chunks).await;

        match self
            .generator
            .generate(&request.query, &passed_chunks, conflict.as_ref())
            .await
        {
            Ok(generated) => QueryResponse::Answered {
                answer: generated.answer,
                citations: generated.citations,
                conflict_detected: conflict.is_some(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed");
                refused(refusal::generation_failed())
            }
        }
    }
}

fn refused(reason: crate::error::RefusalReason) -> QueryResponse {
    let message = reason.user_message();
    QueryResponse::Refused { reason, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::llm::{GenerationOptions, LlmProvider};
    use crate::types::{Modality, ScopeCatalog, SearchHit, VectorPoint};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeEmbeddingGateway;

    #[async_trait]
    impl EmbeddingGateway for FakeEmbeddingGateway {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        async fn embed_image(&self, _bytes: &[u8]) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    struct ScriptedLlmProvider(Mutex<Vec<&'static str>>);

    impl ScriptedLlmProvider {
        fn new(responses: Vec<&'static str>) -> Self {
            Self(Mutex::new(responses))
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlmProvider {
        async fn generate_raw(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, CoreError> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                return Ok("YES".to_string());
            }
            Ok(queue.remove(0).to_string())
        }
    }

    struct FakeStore {
        catalog: ScopeCatalog,
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn upsert(&self, _points: Vec<VectorPoint>) -> Result<(), CoreError> {
            Ok(())
        }
        async fn delete_by_scope(&self, _scope_id: &str) -> Result<usize, CoreError> {
            Ok(0)
        }
        async fn search_single(
            &self,
            _modality: Modality,
            _query: &[f32],
            _k: usize,
            _scope_id: &str,
        ) -> Result<Vec<SearchHit>, CoreError> {
            Ok(self.hits.clone())
        }
        async fn search_merged(
            &self,
            _spaces: &[(Modality, Vec<f32>)],
            _k: usize,
            _scope_id: &str,
        ) -> Result<Vec<SearchHit>, CoreError> {
            Ok(self.hits.clone())
        }
        async fn get_catalog(&self, _scope_id: &str) -> Result<ScopeCatalog, CoreError> {
            Ok(self.catalog.clone())
        }
    }

    fn sample_hit(id: &str, file_name: &str) -> SearchHit {
        use crate::types::{Chunk, Citation, SourceType};
        SearchHit {
            chunk: Chunk {
                id: id.to_string(),
                scope_id: "scope-a".to_string(),
                doc_id: "doc-1".to_string(),
                chunk_index: 0,
                text: "Photosynthesis converts light into chemical energy.".to_string(),
                modality: Modality::Text,
                source_type: SourceType::Txt,
                file_name: file_name.to_string(),
                document_topic: "biology".to_string(),
                document_concepts: vec!["photosynthesis".to_string()],
                citation: Citation {
                    file_name: file_name.to_string(),
                    page_number: None,
                },
                created_at: 0,
            },
            similarity: 0.9,
            matched_spaces: vec![Modality::Text],
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_refuses_with_empty_knowledge_base() {
        let store = Arc::new(FakeStore {
            catalog: ScopeCatalog::default(),
            hits: Vec::new(),
        });
        let llm = Arc::new(LlmGateway::new(
            Arc::new(ScriptedLlmProvider::new(vec!["YES"])),
            10,
        ));
        let pipeline = QueryPipeline::new(store, Arc::new(FakeEmbeddingGateway), llm, &PipelineConfig::default());
        let response = pipeline
            .answer(QueryRequest {
                scope_id: "scope-a".to_string(),
                query: "what is photosynthesis".to_string(),
            })
            .await;
        match response {
            QueryResponse::Refused { reason, .. } => {
                assert_eq!(reason, crate::error::RefusalReason::EmptyKnowledgeBase);
            }
            QueryResponse::Answered { .. } => panic!("expected a refusal"),
        }
    }

    #[tokio::test]
    async fn test_full_pipeline_answers_when_evidence_is_sufficient() {
        let catalog = ScopeCatalog {
            scope_id: "scope-a".to_string(),
            document_count: 1,
            topics: vec!["biology".to_string()],
            concepts: vec!["photosynthesis".to_string()],
            file_names: vec!["notes.txt".to_string()],
        };
        let store = Arc::new(FakeStore {
            catalog,
            hits: vec![sample_hit("1", "notes.txt")],
        });
        // Responses consumed in order: topic/concept analysis, paraphrases,
        // gate concept overlap short-circuits before any LLM call, grading
        // (YES), generation.
        let llm = Arc::new(LlmGateway::new(
            Arc::new(ScriptedLlmProvider::new(vec![
                "Topic: Biology | Concepts: photosynthesis",
                "How do plants convert sunlight into energy?",
                "YES",
                "Plants convert sunlight into chemical energy through photosynthesis.",
            ])),
            10,
        ));
        let pipeline = QueryPipeline::new(store, Arc::new(FakeEmbeddingGateway), llm, &PipelineConfig::default());
        let response = pipeline
            .answer(QueryRequest {
                scope_id: "scope-a".to_string(),
                query: "how does photosynthesis work".to_string(),
            })
            .await;
        match response {
            QueryResponse::Answered { answer, .. } => {
                assert!(!answer.is_empty());
            }
            QueryResponse::Refused { reason, message } => {
                panic!("expected an answer, got refusal: {reason:?} ({message})")
            }
        }
    }

    #[tokio::test]
    async fn test_passed_chunks_below_average_threshold_refuses_with_topic_drift() {
        let catalog = ScopeCatalog {
            scope_id: "scope-a".to_string(),
            document_count: 1,
            topics: vec!["biology".to_string()],
            concepts: vec!["photosynthesis".to_string()],
            file_names: vec!["notes.txt".to_string(), "other.txt".to_string()],
        };
        let store = Arc::new(FakeStore {
            catalog,
            hits: vec![
                sample_hit("1", "notes.txt"),
                sample_hit("2", "other.txt"),
                sample_hit("3", "other.txt"),
            ],
        });
        // One YES (0.9) among three hits -> avg 0.3 < 0.4 sufficiency threshold,
        // but at least one chunk passed, so this is topic drift, not plain
        // insufficient evidence.
        let llm = Arc::new(LlmGateway::new(
            Arc::new(ScriptedLlmProvider::new(vec![
                "Topic: Biology | Concepts: photosynthesis",
                "How do plants convert sunlight into energy?",
                "YES",
                "NO",
                "NO",
            ])),
            10,
        ));
        let pipeline = QueryPipeline::new(store, Arc::new(FakeEmbeddingGateway), llm, &PipelineConfig::default());
        let response = pipeline
            .answer(QueryRequest {
                scope_id: "scope-a".to_string(),
                query: "how does photosynthesis work".to_string(),
            })
            .await;
        match response {
            QueryResponse::Refused { reason, .. } => {
                assert_eq!(reason, crate::error::RefusalReason::TopicDrift);
            }
            QueryResponse::Answered { .. } => panic!("expected a refusal"),
        }
    }

    #[tokio::test]
    async fn test_no_hits_refuses_with_no_retrieved_documents() {
        let catalog = ScopeCatalog {
            scope_id: "scope-a".to_string(),
            document_count: 1,
            topics: vec!["biology".to_string()],
            concepts: vec!["photosynthesis".to_string()],
            file_names: vec!["notes.txt".to_string()],
        };
        let store = Arc::new(FakeStore {
            catalog,
            hits: Vec::new(),
        });
        let llm = Arc::new(LlmGateway::new(
            Arc::new(ScriptedLlmProvider::new(vec![
                "Topic: Biology | Concepts: photosynthesis",
                "How do plants make energy?",
            ])),
            10,
        ));
        let pipeline = QueryPipeline::new(store, Arc::new(FakeEmbeddingGateway), llm, &PipelineConfig::default());
        let response = pipeline
            .answer(QueryRequest {
                scope_id: "scope-a".to_string(),
                query: "how does photosynthesis work".to_string(),
            })
            .await;
        match response {
            QueryResponse::Refused { reason, .. } => {
                assert_eq!(reason, crate::error::RefusalReason::NoRetrievedDocuments);
            }
            QueryResponse::Answered { .. } => panic!("expected a refusal"),
        }
    }
}
