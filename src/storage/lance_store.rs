//! LanceDB-backed implementation of the multi-named-vector store (C1).
//!
//! Three independent, nullable vector columns — `text_vector`,
//! `image_vector`, `audio_vector` — live in one table so a chunk can carry
//! whichever modalities it has without union tables or per-modality stores.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CoreError;
use crate::types::{Chunk, Citation, Modality, ScopeCatalog, SearchHit, SourceType, VectorPoint};

const TABLE_NAME: &str = "chunks";
const MAX_BATCH: usize = 100;

fn modality_str(m: Modality) -> &'static str {
    match m {
        Modality::Text => "text",
        Modality::Image => "image",
        Modality::Audio => "audio",
    }
}

fn source_type_str(s: SourceType) -> &'static str {
    match s {
        SourceType::Txt => "txt",
        SourceType::Markdown => "markdown",
        SourceType::Html => "html",
        SourceType::Json => "json",
        SourceType::Xml => "xml",
        SourceType::Csv => "csv",
        SourceType::Pdf => "pdf",
        SourceType::Image => "image",
        SourceType::Audio => "audio",
    }
}

fn parse_modality(s: &str) -> Modality {
    match s {
        "image" => Modality::Image,
        "audio" => Modality::Audio,
        _ => Modality::Text,
    }
}

fn parse_source_type(s: &str) -> SourceType {
    match s {
        "markdown" => SourceType::Markdown,
        "html" => SourceType::Html,
        "json" => SourceType::Json,
        "xml" => SourceType::Xml,
        "csv" => SourceType::Csv,
        "pdf" => SourceType::Pdf,
        "image" => SourceType::Image,
        "audio" => SourceType::Audio,
        _ => SourceType::Txt,
    }
}

/// The C1 contract: a single collection supporting parallel named vector
/// spaces, payload filtering, and merged cross-space search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), CoreError>;

    async fn delete_by_scope(&self, scope_id: &str) -> Result<usize, CoreError>;

    async fn search_single(
        &self,
        modality: Modality,
        query: &[f32],
        k: usize,
        scope_id: &str,
    ) -> Result<Vec<SearchHit>, CoreError>;

    /// Search every given named vector space in parallel and merge by chunk
    /// id, keeping the maximum similarity and the set of spaces that matched.
    async fn search_merged(
        &self,
        spaces: &[(Modality, Vec<f32>)],
        k: usize,
        scope_id: &str,
    ) -> Result<Vec<SearchHit>, CoreError>;

    async fn get_catalog(&self, scope_id: &str) -> Result<ScopeCatalog, CoreError>;
}

pub struct LanceVectorStore {
    db: lancedb::Connection,
    dimension: usize,
}

impl LanceVectorStore {
    pub async fn new(path: &str, dimension: usize) -> Result<Self, CoreError> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let store = Self { db, dimension };
        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        let vector_field = |name: &str| {
            Field::new(
                name,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            )
        };

        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("scope_id", DataType::Utf8, false),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("modality", DataType::Utf8, false),
            Field::new("source_type", DataType::Utf8, false),
            Field::new("file_name", DataType::Utf8, false),
            Field::new("document_topic", DataType::Utf8, false),
            Field::new("document_concepts", DataType::Utf8, false),
            Field::new("citation_page", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
            vector_field("text_vector"),
            vector_field("image_vector"),
            vector_field("audio_vector"),
        ]))
    }

    async fn ensure_table(&self) -> Result<(), CoreError> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        if names.contains(&TABLE_NAME.to_string()) {
            return Ok(());
        }

        let schema = self.schema();
        let empty_str = |n: usize| Arc::new(StringArray::from(vec![""; n])) as Arc<dyn Array>;
        let empty_vec = |dim: usize| {
            let values = Float32Array::from(vec![0.0f32; dim]);
            let field = Field::new("item", DataType::Float32, true);
            Arc::new(FixedSizeListArray::new(
                Arc::new(field),
                dim as i32,
                Arc::new(values) as Arc<dyn Array>,
                None,
            )) as Arc<dyn Array>
        };

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                empty_str(1),
                empty_str(1),
                Arc::new(UInt32Array::from(vec![0u32])),
                empty_str(1),
                empty_str(1),
                empty_str(1),
                empty_str(1),
                empty_str(1),
                empty_str(1),
                empty_str(1),
                Arc::new(Int64Array::from(vec![0i64])),
                empty_vec(self.dimension),
                empty_vec(self.dimension),
                empty_vec(self.dimension),
            ],
        )
        .map_err(|e| CoreError::SchemaError(e.to_string()))?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        table.delete("id = '__seed__'").await.ok();
        Ok(())
    }

    fn vector_array(&self, vectors: &[Option<Vec<f32>>]) -> Arc<dyn Array> {
        let dim = self.dimension;
        let mut flat = Vec::with_capacity(vectors.len() * dim);
        let mut validity = Vec::with_capacity(vectors.len());
        for v in vectors {
            match v {
                Some(vec) => {
                    flat.extend_from_slice(vec);
                    validity.push(true);
                }
                None => {
                    flat.extend(std::iter::repeat(0.0f32).take(dim));
                    validity.push(false);
                }
            }
        }
        let values = Float32Array::from(flat);
        let field = Field::new("item", DataType::Float32, true);
        Arc::new(FixedSizeListArray::new(
            Arc::new(field),
            dim as i32,
            Arc::new(values) as Arc<dyn Array>,
            Some(validity.into()),
        )) as Arc<dyn Array>
    }

    fn batch_from_points(&self, points: &[VectorPoint]) -> Result<RecordBatch, CoreError> {
        let schema = self.schema();
        let ids: Vec<&str> = points.iter().map(|p| p.chunk.id.as_str()).collect();
        let scope_ids: Vec<&str> = points.iter().map(|p| p.chunk.scope_id.as_str()).collect();
        let doc_ids: Vec<&str> = points.iter().map(|p| p.chunk.doc_id.as_str()).collect();
        let chunk_indices: Vec<u32> = points.iter().map(|p| p.chunk.chunk_index).collect();
        let texts: Vec<&str> = points.iter().map(|p| p.chunk.text.as_str()).collect();
        let modalities: Vec<&str> = points
            .iter()
            .map(|p| modality_str(p.chunk.modality))
            .collect();
        let source_types: Vec<&str> = points
            .iter()
            .map(|p| source_type_str(p.chunk.source_type))
            .collect();
        let file_names: Vec<&str> = points.iter().map(|p| p.chunk.file_name.as_str()).collect();
        let topics: Vec<&str> = points
            .iter()
            .map(|p| p.chunk.document_topic.as_str())
            .collect();
        let concepts: Vec<String> = points
            .iter()
            .map(|p| p.chunk.document_concepts.join("|"))
            .collect();
        let concepts_ref: Vec<&str> = concepts.iter().map(|s| s.as_str()).collect();
        let citation_pages: Vec<String> = points
            .iter()
            .map(|p| {
                p.chunk
                    .citation
                    .page_number
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            })
            .collect();
        let citation_pages_ref: Vec<&str> = citation_pages.iter().map(|s| s.as_str()).collect();
        let created_ats: Vec<i64> = points.iter().map(|p| p.chunk.created_at).collect();

        let text_vecs: Vec<Option<Vec<f32>>> =
            points.iter().map(|p| p.text_vector.clone()).collect();
        let image_vecs: Vec<Option<Vec<f32>>> =
            points.iter().map(|p| p.image_vector.clone()).collect();
        let audio_vecs: Vec<Option<Vec<f32>>> =
            points.iter().map(|p| p.audio_vector.clone()).collect();

        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(scope_ids)),
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(modalities)),
                Arc::new(StringArray::from(source_types)),
                Arc::new(StringArray::from(file_names)),
                Arc::new(StringArray::from(topics)),
                Arc::new(StringArray::from(concepts_ref)),
                Arc::new(StringArray::from(citation_pages_ref)),
                Arc::new(Int64Array::from(created_ats)),
                self.vector_array(&text_vecs),
                self.vector_array(&image_vecs),
                self.vector_array(&audio_vecs),
            ],
        )
        .map_err(|e| CoreError::SchemaError(e.to_string()))
    }

    fn row_to_hit(
        ids: &StringArray,
        i: usize,
        scope_ids: Option<&StringArray>,
        doc_ids: Option<&StringArray>,
        chunk_indices: Option<&UInt32Array>,
        texts: Option<&StringArray>,
        modalities: Option<&StringArray>,
        source_types: Option<&StringArray>,
        file_names: Option<&StringArray>,
        topics: Option<&StringArray>,
        concepts: Option<&StringArray>,
        citation_pages: Option<&StringArray>,
        created_ats: Option<&Int64Array>,
        similarity: f32,
    ) -> SearchHit {
        let page = citation_pages
            .map(|c| c.value(i))
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<u32>().ok());

        let chunk = Chunk {
            id: ids.value(i).to_string(),
            scope_id: scope_ids.map(|c| c.value(i).to_string()).unwrap_or_default(),
            doc_id: doc_ids.map(|c| c.value(i).to_string()).unwrap_or_default(),
            chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
            text: texts.map(|c| c.value(i).to_string()).unwrap_or_default(),
            modality: modalities
                .map(|c| parse_modality(c.value(i)))
                .unwrap_or(Modality::Text),
            source_type: source_types
                .map(|c| parse_source_type(c.value(i)))
                .unwrap_or(SourceType::Txt),
            file_name: file_names.map(|c| c.value(i).to_string()).unwrap_or_default(),
            document_topic: topics.map(|c| c.value(i).to_string()).unwrap_or_default(),
            document_concepts: concepts
                .map(|c| {
                    c.value(i)
                        .split('|')
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            citation: Citation {
                file_name: file_names.map(|c| c.value(i).to_string()).unwrap_or_default(),
                page_number: page,
            },
            created_at: created_ats.map(|c| c.value(i)).unwrap_or(0),
        };

        SearchHit {
            chunk,
            similarity,
            matched_spaces: Vec::new(),
        }
    }

    fn extract_hits(batches: &[RecordBatch]) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for batch in batches {
            let col = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            };
            let ids = match col("id") {
                Some(ids) => ids,
                None => continue,
            };
            let scope_ids = col("scope_id");
            let doc_ids = col("doc_id");
            let texts = col("text");
            let modalities = col("modality");
            let source_types = col("source_type");
            let file_names = col("file_name");
            let topics = col("document_topic");
            let concepts = col("document_concepts");
            let citation_pages = col("citation_page");
            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
            let created_ats = batch
                .column_by_name("created_at")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                if ids.value(i) == "__seed__" {
                    continue;
                }
                let similarity = distances.map(|d| (1.0 - d.value(i)).max(0.0)).unwrap_or(0.0);
                hits.push(Self::row_to_hit(
                    ids,
                    i,
                    scope_ids,
                    doc_ids,
                    chunk_indices,
                    texts,
                    modalities,
                    source_types,
                    file_names,
                    topics,
                    concepts,
                    citation_pages,
                    created_ats,
                    similarity,
                ));
            }
        }
        hits
    }

    async fn upsert_once(&self, points: &[VectorPoint]) -> Result<(), CoreError> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        // Idempotent: delete any existing rows with the same ids before insert.
        let id_list: Vec<String> = points
            .iter()
            .map(|p| format!("'{}'", p.chunk.id.replace('\'', "''")))
            .collect();
        if !id_list.is_empty() {
            let predicate = format!("id IN ({})", id_list.join(", "));
            table.delete(&predicate).await.ok();
        }

        let schema = self.schema();
        let batch = self.batch_from_points(points)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), CoreError> {
        if points.is_empty() {
            return Err(CoreError::EmptyInput);
        }

        for batch in points.chunks(MAX_BATCH) {
            match self.upsert_once(batch).await {
                Ok(()) => {}
                Err(_) => {
                    // Lazy creation + retry once: the table may have been
                    // dropped out from under us.
                    self.ensure_table().await?;
                    self.upsert_once(batch).await?;
                }
            }
        }
        tracing::info!(count = points.len(), "Upserted chunks into vector store");
        Ok(())
    }

    async fn delete_by_scope(&self, scope_id: &str) -> Result<usize, CoreError> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("scope_id = '{}'", scope_id.replace('\'', "''"));
        table
            .delete(&predicate)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let after = table.count_rows(None).await.unwrap_or(0);
        Ok(before.saturating_sub(after))
    }

    async fn search_single(
        &self,
        modality: Modality,
        query: &[f32],
        k: usize,
        scope_id: &str,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let predicate = format!("scope_id = '{}'", scope_id.replace('\'', "''"));
        let mut query_builder = table
            .query()
            .nearest_to(query)
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?
            .column(modality.column_name())
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(predicate)
            .limit(k);

        let results = query_builder
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let mut hits = Self::extract_hits(&batches);
        for hit in &mut hits {
            hit.matched_spaces = vec![modality];
        }
        Ok(hits)
    }

    async fn search_merged(
        &self,
        spaces: &[(Modality, Vec<f32>)],
        k: usize,
        scope_id: &str,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let futures = spaces
            .iter()
            .map(|(modality, vector)| self.search_single(*modality, vector, k, scope_id));
        let per_space_results = futures::future::join_all(futures).await;

        let mut merged: HashMap<String, SearchHit> = HashMap::new();
        for result in per_space_results {
            let hits = result?;
            for hit in hits {
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

        let mut merged: Vec<SearchHit> = merged.into_values().collect();
        merged.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        merged.truncate(k);
        Ok(merged)
    }

    async fn get_catalog(&self, scope_id: &str) -> Result<ScopeCatalog, CoreError> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let predicate = format!("scope_id = '{}'", scope_id.replace('\'', "''"));
        let results = table
            .query()
            .only_if(predicate)
            .execute()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let hits = Self::extract_hits(&batches);

        let mut doc_ids = std::collections::HashSet::new();
        let mut topics = std::collections::HashSet::new();
        let mut concepts = std::collections::HashSet::new();
        let mut file_names = std::collections::HashSet::new();

        for hit in &hits {
            doc_ids.insert(hit.chunk.doc_id.clone());
            if !hit.chunk.document_topic.is_empty() {
                topics.insert(hit.chunk.document_topic.clone());
            }
            concepts.extend(hit.chunk.document_concepts.iter().cloned());
            file_names.insert(hit.chunk.file_name.clone());
        }

        Ok(ScopeCatalog {
            scope_id: scope_id.to_string(),
            document_count: doc_ids.len(),
            topics: topics.into_iter().collect(),
            concepts: concepts.into_iter().collect(),
            file_names: file_names.into_iter().collect(),
        })
    }
}
