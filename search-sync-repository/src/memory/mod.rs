//! In-memory implementation of the search index.
//!
//! Used for embedded deployments and tests. Documents are kept per entity
//! type, ordered by id, so query results are deterministic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::SearchError;
use crate::interfaces::SearchIndexProvider;
use search_sync_shared::{EntityDocument, EntityId, QueryFilter, SearchQuery, SearchResponse};

type TypeIndex = BTreeMap<EntityId, EntityDocument>;

/// Search index held in process memory.
#[derive(Default)]
pub struct InMemorySearchIndex {
    documents: RwLock<HashMap<String, TypeIndex>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents across all entity types.
    pub async fn len(&self) -> usize {
        self.documents.read().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn put(&self, documents: &[EntityDocument]) {
        let mut index = self.documents.write().await;
        for doc in documents {
            index
                .entry(doc.entity_type.clone())
                .or_default()
                .insert(doc.id.clone(), doc.clone());
        }
    }

    async fn remove_matching(&self, query: &SearchQuery) -> usize {
        let mut index = self.documents.write().await;
        let Some(docs) = index.get_mut(&query.entity_type) else {
            return 0;
        };
        let before = docs.len();
        docs.retain(|_, doc| !matches_filter(doc, &query.filter));
        before - docs.len()
    }
}

/// Render a field value the way an exact-match query compares it.
fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filter(doc: &EntityDocument, filter: &QueryFilter) -> bool {
    match filter {
        QueryFilter::All => true,
        QueryFilter::Term { field, value } => {
            if field == "id" {
                return doc.id.to_string() == *value;
            }
            doc.field(field)
                .map(|v| value_as_text(v) == *value)
                .unwrap_or(false)
        }
        QueryFilter::Text { query } => {
            let needle = query.to_lowercase();
            doc.fields.values().any(|v| match v {
                Value::String(s) => s.to_lowercase().contains(&needle),
                _ => false,
            })
        }
    }
}

#[async_trait]
impl SearchIndexProvider for InMemorySearchIndex {
    async fn index_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
        self.put(documents).await;
        debug!(count = documents.len(), "Indexed documents in memory");
        Ok(())
    }

    async fn update_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
        self.put(documents).await;
        debug!(count = documents.len(), "Updated documents in memory");
        Ok(())
    }

    async fn delete_documents(&self, entity_type: &str, ids: &[EntityId]) -> Result<(), SearchError> {
        let mut index = self.documents.write().await;
        if let Some(docs) = index.get_mut(entity_type) {
            for id in ids {
                docs.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_by_query(&self, query: &SearchQuery) -> Result<usize, SearchError> {
        Ok(self.remove_matching(query).await)
    }

    async fn purge_all(&self, entity_type: &str) -> Result<usize, SearchError> {
        let mut index = self.documents.write().await;
        Ok(index.remove(entity_type).map(|docs| docs.len()).unwrap_or(0))
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        let index = self.documents.read().await;
        let Some(docs) = index.get(&query.entity_type) else {
            return Ok(SearchResponse::empty());
        };

        let matching: Vec<&EntityDocument> = docs
            .values()
            .filter(|doc| matches_filter(doc, &query.filter))
            .collect();
        let total = matching.len();
        let limit = query.limit.unwrap_or(total);

        Ok(SearchResponse {
            total,
            hits: matching.into_iter().take(limit).cloned().collect(),
        })
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}
