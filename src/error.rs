//! Error taxonomy for the core pipeline.
//!
//! Two distinct shapes travel through this crate: `CoreError`, a `thiserror`
//! enum for genuine failures (bad input, unavailable dependencies), and
//! `RefusalReason`, a plain tagged enum for the pipeline's deliberate
//! "can't answer from evidence" outcome. Refusals are not errors — they are
//! a normal, expected value returned from `QueryPipeline::answer` and must
//! never be round-tripped through `Result::Err`.

use thiserror::Error;

/// Failures that abort an ingestion or query operation outright.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("empty input")]
    EmptyInput,

    #[error("could not decode image: {0}")]
    BadImage(String),

    #[error("vector store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("LLM call timed out after {0}s")]
    LLMTimeout(u64),

    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),

    #[error("generated answer is not grounded in the provided evidence")]
    Ungrounded,
}

/// Why the pipeline declined to answer. A value, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "reason", content = "detail")]
pub enum RefusalReason {
    /// The scope has no ingested chunks at all.
    EmptyKnowledgeBase,
    /// The Compatibility Gate denied the query against the scope's catalog.
    NoMatch { gate_reason: String },
    /// Retrieval ran but nothing passed evidence grading.
    InsufficientEvidence,
    /// The query's topic does not drift-match anything retrievable.
    TopicDrift,
    /// Retrieval returned no candidates at all.
    NoRetrievedDocuments,
    /// The Generator failed to produce a grounded answer.
    GenerationFailed,
    /// The Compatibility Gate itself failed (fail-closed).
    CompatibilityCheckFailed,
}

impl RefusalReason {
    /// Fixed user-facing template, matching the reference implementation's
    /// per-reason copy.
    pub fn user_message(&self) -> String {
        match self {
            RefusalReason::EmptyKnowledgeBase => {
                "No documents are uploaded in this scope yet.".to_string()
            }
            RefusalReason::NoMatch { .. } => {
                "This question does not match the topics or concepts covered by the \
                 documents in this scope.".to_string()
            }
            RefusalReason::InsufficientEvidence => {
                "The retrieved evidence was too weak or insufficient to answer with \
                 confidence.".to_string()
            }
            RefusalReason::TopicDrift => {
                "This question does not match the topics or concepts covered by the \
                 documents in this scope.".to_string()
            }
            RefusalReason::NoRetrievedDocuments => {
                "No relevant information was found for this question.".to_string()
            }
            RefusalReason::GenerationFailed => {
                "An answer could not be generated from the available evidence.".to_string()
            }
            RefusalReason::CompatibilityCheckFailed => {
                "Could not verify whether this question matches the scope's documents."
                    .to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
