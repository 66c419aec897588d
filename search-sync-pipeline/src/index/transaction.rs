//! Scoped index transactions.

use tracing::{debug, warn};
use uuid::Uuid;

use super::{IndexWork, IndexWriter};
use crate::errors::PipelineError;
use search_sync_shared::{EntityDocument, EntityId, SearchQuery};

/// Index work queued under one handle and applied together.
///
/// Nothing reaches the index until [`commit`](Self::commit). The whole work
/// list is applied while holding the writer lock. A transaction dropped
/// without commit or rollback discards its work and logs a warning.
///
/// # Example
///
/// ```ignore
/// let mut tx = factory.begin();
/// tx.index(vec![place]).delete("Sorcerer", vec![EntityId::single(3)]);
/// tx.commit().await?;
/// ```
pub struct IndexTransaction {
    id: Uuid,
    writer: IndexWriter,
    works: Vec<IndexWork>,
    finished: bool,
}

impl IndexTransaction {
    pub(crate) fn new(writer: IndexWriter) -> Self {
        Self {
            id: Uuid::new_v4(),
            writer,
            works: Vec::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of queued work items.
    pub fn pending(&self) -> usize {
        self.works.len()
    }

    pub fn push(&mut self, work: IndexWork) -> &mut Self {
        self.works.push(work);
        self
    }

    pub fn index(&mut self, documents: Vec<EntityDocument>) -> &mut Self {
        self.push(IndexWork::Index(documents))
    }

    pub fn update(&mut self, documents: Vec<EntityDocument>) -> &mut Self {
        self.push(IndexWork::Update(documents))
    }

    pub fn delete(&mut self, entity_type: impl Into<String>, ids: Vec<EntityId>) -> &mut Self {
        self.push(IndexWork::Delete {
            entity_type: entity_type.into(),
            ids,
        })
    }

    pub fn delete_by_query(&mut self, query: SearchQuery) -> &mut Self {
        self.push(IndexWork::DeleteByQuery(query))
    }

    pub fn purge_all(&mut self, entity_type: impl Into<String>) -> &mut Self {
        self.push(IndexWork::PurgeAll {
            entity_type: entity_type.into(),
        })
    }

    /// Apply the queued work.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of documents written or removed
    /// * `Err(PipelineError::TransactionError)` - If the index rejected the work
    pub async fn commit(mut self) -> Result<usize, PipelineError> {
        self.finished = true;
        let works = std::mem::take(&mut self.works);
        let count = works.len();

        let affected = self.writer.apply(works).await.map_err(|e| {
            PipelineError::transaction(format!("Index transaction {} failed: {}", self.id, e))
        })?;

        debug!(transaction = %self.id, works = count, affected, "Index transaction committed");
        Ok(affected)
    }

    /// Discard the queued work.
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(
            transaction = %self.id,
            works = self.works.len(),
            "Index transaction rolled back"
        );
        self.works.clear();
    }
}

impl Drop for IndexTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.works.is_empty() {
            warn!(
                transaction = %self.id,
                works = self.works.len(),
                "Index transaction dropped without commit, discarding work"
            );
        }
    }
}
