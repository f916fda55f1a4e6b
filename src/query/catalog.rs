//! Scope Catalog (C7): derived entirely from chunk payloads already in the
//! vector store — no independent persistence layer of its own.

use std::sync::Arc;

use crate::error::CoreError;
use crate::storage::lance_store::VectorStore;
use crate::types::ScopeCatalog;

pub struct ScopeCatalogReader {
    store: Arc<dyn VectorStore>,
}

impl ScopeCatalogReader {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, scope_id: &str) -> Result<ScopeCatalog, CoreError> {
        self.store.get_catalog(scope_id).await
    }
}
