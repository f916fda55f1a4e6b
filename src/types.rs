//! Core data model: scopes, chunks, vector points, and the query/answer
//! shapes that cross the crate boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The named vector space a chunk's embedding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Modality {
    pub fn column_name(self) -> &'static str {
        match self {
            Modality::Text => "text_vector",
            Modality::Image => "image_vector",
            Modality::Audio => "audio_vector",
        }
    }
}

/// Where a chunk's content physically came from, independent of `Modality`
/// (a PDF can yield both text and image chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Txt,
    Markdown,
    Html,
    Json,
    Xml,
    Csv,
    Pdf,
    Image,
    Audio,
}

impl SourceType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "webp" | "bmp" => Some(Self::Image),
            "wav" | "mp3" | "flac" | "ogg" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Provenance attached to a chunk, carried through retrieval into citations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Citation {
    pub file_name: String,
    pub page_number: Option<u32>,
}

/// A scope is the unit of isolation: ingestion and retrieval are always
/// scoped to exactly one `scope_id`. There is no independent persistence —
/// the catalog is derived entirely from chunk payloads already in the store.
pub type ScopeId = String;

/// One unit of ingested, embedded content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub scope_id: ScopeId,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub modality: Modality,
    pub source_type: SourceType,
    pub file_name: String,
    pub document_topic: String,
    pub document_concepts: Vec<String>,
    pub citation: Citation,
    pub created_at: i64,
}

/// A chunk plus the embedding(s) that will be written to the vector store.
/// At least one of `text_vector`/`image_vector`/`audio_vector` must be `Some`.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk: Chunk,
    pub text_vector: Option<Vec<f32>>,
    pub image_vector: Option<Vec<f32>>,
    pub audio_vector: Option<Vec<f32>>,
}

impl VectorPoint {
    pub fn vector_for(&self, modality: Modality) -> Option<&[f32]> {
        match modality {
            Modality::Text => self.text_vector.as_deref(),
            Modality::Image => self.image_vector.as_deref(),
            Modality::Audio => self.audio_vector.as_deref(),
        }
    }
}

/// A single scored hit out of the vector store, before grading/MMR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub similarity: f32,
    pub matched_spaces: Vec<Modality>,
}

/// Summary of everything known about one scope, derived from its chunk
/// payloads rather than stored independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeCatalog {
    pub scope_id: ScopeId,
    pub document_count: usize,
    pub topics: Vec<String>,
    pub concepts: Vec<String>,
    pub file_names: Vec<String>,
}

impl ScopeCatalog {
    pub fn is_empty(&self) -> bool {
        self.document_count == 0
    }
}

/// Filter applied when scanning the vector store, built from a scope plus
/// optional narrowing fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataFilter {
    pub scope_id: Option<ScopeId>,
    pub file_name: Option<String>,
    pub doc_id: Option<String>,
}

impl MetadataFilter {
    pub fn scoped(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: Some(scope_id.into()),
            ..Default::default()
        }
    }

    /// Build a SQL-ish predicate string for LanceDB's scan-with-predicate,
    /// standing in for a payload index lookup.
    pub fn to_predicate(&self) -> Option<String> {
        let mut predicates = Vec::new();

        if let Some(ref scope_id) = self.scope_id {
            predicates.push(format!("scope_id = '{}'", scope_id.replace('\'', "''")));
        }
        if let Some(ref file_name) = self.file_name {
            predicates.push(format!("file_name = '{}'", file_name.replace('\'', "''")));
        }
        if let Some(ref doc_id) = self.doc_id {
            predicates.push(format!("doc_id = '{}'", doc_id.replace('\'', "''")));
        }

        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }
}

/// Incoming ingestion request for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub scope_id: ScopeId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub doc_id: String,
    pub chunks_ingested: usize,
    pub document_topic: String,
    pub document_concepts: Vec<String>,
}

/// Incoming query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub scope_id: ScopeId,
    pub query: String,
}

/// Outcome of a query: either a grounded answer, or a typed refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Answered {
        answer: String,
        citations: Vec<Citation>,
        conflict_detected: bool,
    },
    Refused {
        reason: crate::error::RefusalReason,
        message: String,
    },
}

/// Used internally to give each ingested/retrieved item a stable identity
/// when building `HashMap`-keyed dedup structures.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub type MetadataMap = HashMap<String, String>;
