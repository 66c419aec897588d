//! Query and response types for reading from the search index.

use serde::{Deserialize, Serialize};

use crate::document::EntityDocument;

/// Which documents of an entity type a query selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Every document of the entity type.
    All,
    /// Documents whose field equals the given value exactly.
    /// The field `id` matches the document's entity id.
    Term { field: String, value: String },
    /// Documents with a text field containing the query (case insensitive).
    Text { query: String },
}

/// A query against the documents of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub entity_type: String,
    pub filter: QueryFilter,
    /// Maximum number of hits to return. `None` returns every match.
    pub limit: Option<usize>,
}

impl SearchQuery {
    /// Match all documents of the entity type.
    pub fn all(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: QueryFilter::All,
            limit: None,
        }
    }

    /// Match documents with an exact field value.
    pub fn term(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: QueryFilter::Term {
                field: field.into(),
                value: value.into(),
            },
            limit: None,
        }
    }

    /// Match documents containing the given text.
    pub fn text(entity_type: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: QueryFilter::Text {
                query: query.into(),
            },
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Total number of matching documents, independent of the limit.
    pub total: usize,
    /// The returned documents.
    pub hits: Vec<EntityDocument>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}
