//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;

use crate::errors::SearchError;
use search_sync_shared::{EntityDocument, EntityId, SearchQuery, SearchResponse};

/// Abstracts the underlying search index implementation.
///
/// Documents are addressed by entity type and id. Writes must be visible to
/// `search` once the call returns.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Callers that need ordering
/// between concurrent writers serialize access themselves.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Add documents to the index.
    ///
    /// # Arguments
    ///
    /// * `documents` - The documents to add
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every document was indexed
    /// * `Err(SearchError)` - If indexing fails
    async fn index_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError>;

    /// Replace the stored documents with the given ones, adding any that do
    /// not exist yet.
    ///
    /// # Arguments
    ///
    /// * `documents` - The new state of the documents
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every document was replaced or added
    /// * `Err(SearchError)` - If the operation fails
    async fn update_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError>;

    /// Delete documents by id. Ids that are not indexed are ignored.
    ///
    /// # Arguments
    ///
    /// * `entity_type` - The entity type of the documents
    /// * `ids` - The ids to remove
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the documents were deleted (or didn't exist)
    /// * `Err(SearchError)` - If the deletion fails
    async fn delete_documents(&self, entity_type: &str, ids: &[EntityId]) -> Result<(), SearchError>;

    /// Delete every document matched by the query, ignoring its limit.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - The number of deleted documents
    /// * `Err(SearchError)` - If the deletion fails
    async fn delete_by_query(&self, query: &SearchQuery) -> Result<usize, SearchError>;

    /// Delete every document of an entity type.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - The number of deleted documents
    /// * `Err(SearchError)` - If the deletion fails
    async fn purge_all(&self, entity_type: &str) -> Result<usize, SearchError>;

    /// Execute a query against the index.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let response = index.search(&SearchQuery::all("Book")).await?;
    /// println!("Found {} books", response.total);
    /// ```
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError>;

    /// Ensure the index exists with proper mappings.
    ///
    /// This should be called before the first write.
    async fn ensure_index_exists(&self) -> Result<(), SearchError>;

    /// Check if the search engine is healthy and reachable.
    async fn health_check(&self) -> Result<bool, SearchError>;
}
