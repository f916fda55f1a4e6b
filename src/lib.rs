pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod query;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{CoreError, RefusalReason};
pub use ingestion::IngestionPipeline;
pub use query::QueryPipeline;
pub use types::{
    Chunk, Citation, IngestRequest, IngestResponse, QueryRequest, QueryResponse, ScopeCatalog,
};
