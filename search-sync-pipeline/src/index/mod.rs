//! Serialized access to the search index.
//!
//! Background sync cycles and direct callers share one [`IndexWriter`] per
//! factory. The writer holds a lock for the whole list of work it applies,
//! so a delete and a re-insert of the same id can never interleave with
//! another writer's work.

mod transaction;

pub use transaction::IndexTransaction;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use search_sync_repository::{SearchError, SearchIndexProvider};
use search_sync_shared::{EntityDocument, EntityId, SearchQuery, SearchResponse};

/// One mutation of the search index.
#[derive(Debug, Clone)]
pub enum IndexWork {
    Index(Vec<EntityDocument>),
    /// Replace documents by id, adding missing ones.
    Update(Vec<EntityDocument>),
    Delete {
        entity_type: String,
        ids: Vec<EntityId>,
    },
    DeleteByQuery(SearchQuery),
    PurgeAll {
        entity_type: String,
    },
}

impl IndexWork {
    fn kind(&self) -> &'static str {
        match self {
            IndexWork::Index(_) => "index",
            IndexWork::Update(_) => "update",
            IndexWork::Delete { .. } => "delete",
            IndexWork::DeleteByQuery(_) => "delete_by_query",
            IndexWork::PurgeAll { .. } => "purge_all",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            IndexWork::Index(docs) | IndexWork::Update(docs) => docs.is_empty(),
            IndexWork::Delete { ids, .. } => ids.is_empty(),
            IndexWork::DeleteByQuery(_) | IndexWork::PurgeAll { .. } => false,
        }
    }
}

/// Applies index work one list at a time.
#[derive(Clone)]
pub struct IndexWriter {
    provider: Arc<dyn SearchIndexProvider>,
    lock: Arc<Mutex<()>>,
}

impl IndexWriter {
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self {
            provider,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn provider(&self) -> &Arc<dyn SearchIndexProvider> {
        &self.provider
    }

    /// Start a transaction whose work is applied on commit.
    pub fn begin(&self) -> IndexTransaction {
        IndexTransaction::new(self.clone())
    }

    /// Apply a list of work in order while holding the writer lock.
    ///
    /// Stops at the first failure; earlier work stays applied.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of documents written or removed
    /// * `Err(SearchError)` - The first failure
    #[instrument(skip(self, works), fields(count = works.len()))]
    pub async fn apply(&self, works: Vec<IndexWork>) -> Result<usize, SearchError> {
        let _guard = self.lock.lock().await;

        let mut affected = 0;
        for work in works {
            if work.is_empty() {
                continue;
            }
            let kind = work.kind();
            let count = self.apply_unlocked(work).await?;
            debug!(kind, count, "Applied index work");
            affected += count;
        }
        Ok(affected)
    }

    /// Apply a single piece of work.
    pub async fn apply_one(&self, work: IndexWork) -> Result<usize, SearchError> {
        self.apply(vec![work]).await
    }

    async fn apply_unlocked(&self, work: IndexWork) -> Result<usize, SearchError> {
        match work {
            IndexWork::Index(docs) => {
                self.provider.index_documents(&docs).await?;
                Ok(docs.len())
            }
            IndexWork::Update(docs) => {
                self.provider.update_documents(&docs).await?;
                Ok(docs.len())
            }
            IndexWork::Delete { entity_type, ids } => {
                self.provider.delete_documents(&entity_type, &ids).await?;
                Ok(ids.len())
            }
            IndexWork::DeleteByQuery(query) => self.provider.delete_by_query(&query).await,
            IndexWork::PurgeAll { entity_type } => self.provider.purge_all(&entity_type).await,
        }
    }

    /// Run a query. Reads do not take the writer lock.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        self.provider.search(query).await
    }
}
