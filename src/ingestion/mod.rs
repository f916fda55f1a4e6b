//! Ingestion Pipeline (C5): dispatches chunk production by file extension,
//! derives per-document topic/concepts, embeds each chunk, and performs a
//! batched idempotent upsert into the vector store.

pub mod text_producer;
pub mod topic;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::embeddings::EmbeddingGateway;
use crate::error::CoreError;
use crate::llm::{GenerationOptions, LlmGateway};
use crate::storage::lance_store::VectorStore;
use crate::types::{Chunk, Citation, IngestRequest, IngestResponse, Modality, SourceType, VectorPoint};

pub use text_producer::TextChunkProducer;

/// One chunk of content produced from a document's raw bytes, before
/// embedding. Text producers leave `raw_bytes` unset; an image producer sets
/// `raw_bytes` to the bytes to embed via C2's image path.
#[derive(Debug, Clone)]
pub struct ProducedChunk {
    pub modality: Modality,
    pub content: String,
    pub raw_bytes: Option<Vec<u8>>,
}

impl ProducedChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            modality: Modality::Text,
            content: content.into(),
            raw_bytes: None,
        }
    }
}

/// C4: produces modality-tagged chunks from a document's raw bytes. PDF/
/// image/audio producers are supplied by the caller; only the plain-text
/// producer ships by default (parsing binary formats is out of scope for
/// this crate).
pub trait ChunkProducer: Send + Sync {
    fn produce(&self, bytes: &[u8]) -> Result<Vec<ProducedChunk>, CoreError>;
}

/// Extension-keyed dispatch table for chunk producers, matching SPEC_FULL's
/// supported-extension list and the "reject unknown extensions" rule.
pub struct ChunkProducerRegistry {
    producers: HashMap<String, Arc<dyn ChunkProducer>>,
}

impl ChunkProducerRegistry {
    pub fn with_default_text_producer(config: &PipelineConfig) -> Self {
        let text_producer: Arc<dyn ChunkProducer> =
            Arc::new(TextChunkProducer::new(&config.chunking));

        let mut producers: HashMap<String, Arc<dyn ChunkProducer>> = HashMap::new();
        for ext in ["txt", "md", "markdown", "html", "htm", "json", "xml", "csv"] {
            producers.insert(ext.to_string(), text_producer.clone());
        }

        Self { producers }
    }

    pub fn register(&mut self, extension: impl Into<String>, producer: Arc<dyn ChunkProducer>) {
        self.producers.insert(extension.into(), producer);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn ChunkProducer>> {
        self.producers.get(&extension.to_lowercase())
    }
}

pub struct IngestionPipeline {
    registry: ChunkProducerRegistry,
    embeddings: Arc<dyn EmbeddingGateway>,
    llm: Arc<LlmGateway>,
    store: Arc<dyn VectorStore>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        registry: ChunkProducerRegistry,
        embeddings: Arc<dyn EmbeddingGateway>,
        llm: Arc<LlmGateway>,
        store: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            embeddings,
            llm,
            store,
            config,
        }
    }

    fn extension_of(file_name: &str) -> Option<String> {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
    }

    async fn derive_topic_and_concepts(&self, text: &str) -> (String, Vec<String>) {
        let excerpt: String = text.chars().take(2000).collect();
        let prompt = topic::topic_derivation_prompt(&excerpt);

        match self.llm.generate(&prompt, &GenerationOptions::default()).await {
            Ok(response) => topic::parse_topic_response(&response)
                .unwrap_or_else(|| topic::fallback_topic_and_concepts(text)),
            Err(e) => {
                tracing::warn!(error = %e, "Topic derivation LLM call failed, using fallback");
                topic::fallback_topic_and_concepts(text)
            }
        }
    }

    /// Up to the first 5 non-trivial (>= 30 char) chunk contents, concatenated
    /// and capped at ~1500 chars, used as the topic-derivation sample.
    fn text_excerpt(produced: &[ProducedChunk]) -> String {
        let mut excerpt = String::new();
        for chunk in produced.iter().filter(|c| c.content.trim().len() >= 30).take(5) {
            if !excerpt.is_empty() {
                excerpt.push(' ');
            }
            excerpt.push_str(chunk.content.trim());
        }
        excerpt.chars().take(1500).collect()
    }

    #[tracing::instrument(skip(self, request), fields(file_name = %request.file_name))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, CoreError> {
        if request.bytes.len() as u64 > self.config.ingestion.max_file_size_bytes {
            return Err(CoreError::FileTooLarge {
                size: request.bytes.len() as u64,
                limit: self.config.ingestion.max_file_size_bytes,
            });
        }

        let extension = Self::extension_of(&request.file_name)
            .ok_or_else(|| CoreError::UnsupportedType(request.file_name.clone()))?;
        let source_type = SourceType::from_extension(&extension)
            .ok_or_else(|| CoreError::UnsupportedType(extension.clone()))?;
        let producer = self
            .registry
            .get(&extension)
            .ok_or_else(|| CoreError::UnsupportedType(extension.clone()))?;

        let produced = producer.produce(&request.bytes)?;
        if produced.is_empty() {
            return Err(CoreError::EmptyInput);
        }

        let excerpt = Self::text_excerpt(&produced);
        let (topic, concepts) = if excerpt.trim().is_empty() {
            topic::fallback_topic_and_concepts(&request.file_name)
        } else {
            self.derive_topic_and_concepts(&excerpt).await
        };
        let normalized_topic = topic::normalize_topic(&topic);
        let normalized_concepts: Vec<String> =
            concepts.iter().map(|c| topic::normalize_concept(c)).collect();

        let doc_id = crate::types::new_id();
        let created_at = 0i64; // stamped by the caller; this crate has no wall-clock dependency

        let mut points = Vec::with_capacity(produced.len());
        for (index, produced_chunk) in produced.into_iter().enumerate() {
            let mut text_vector = None;
            let mut image_vector = None;
            let mut audio_vector = None;

            if !produced_chunk.content.trim().is_empty() {
                match produced_chunk.modality {
                    // No dedicated audio embedding model ships with this
                    // crate; the transcript content is embedded into the
                    // audio space so cross-space search still finds it.
                    Modality::Audio => {
                        audio_vector = Some(self.embeddings.embed_text(&produced_chunk.content).await?);
                    }
                    Modality::Text | Modality::Image => {
                        text_vector = Some(self.embeddings.embed_text(&produced_chunk.content).await?);
                    }
                }
            }
            if produced_chunk.modality == Modality::Image {
                if let Some(bytes) = &produced_chunk.raw_bytes {
                    image_vector = Some(self.embeddings.embed_image(bytes).await?);
                }
            }

            if text_vector.is_none() && image_vector.is_none() && audio_vector.is_none() {
                tracing::warn!(chunk_index = index, "Skipping chunk with no producible embedding");
                continue;
            }

            let chunk = Chunk {
                id: crate::types::new_id(),
                scope_id: request.scope_id.clone(),
                doc_id: doc_id.clone(),
                chunk_index: index as u32,
                text: produced_chunk.content,
                modality: produced_chunk.modality,
                source_type,
                file_name: request.file_name.clone(),
                document_topic: normalized_topic.clone(),
                document_concepts: normalized_concepts.clone(),
                citation: Citation {
                    file_name: request.file_name.clone(),
                    page_number: None,
                },
                created_at,
            };
            points.push(VectorPoint {
                chunk,
                text_vector,
                image_vector,
                audio_vector,
            });
        }

        if points.is_empty() {
            return Err(CoreError::EmptyInput);
        }

        let chunks_ingested = points.len();
        self.store.upsert(points).await?;

        tracing::info!(
            doc_id = %doc_id,
            chunks = chunks_ingested,
            topic = %normalized_topic,
            "Ingested document"
        );

        Ok(IngestResponse {
            doc_id,
            chunks_ingested,
            document_topic: normalized_topic,
            document_concepts: normalized_concepts,
        })
    }
}
