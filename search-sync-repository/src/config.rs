//! Configuration types for search index backends.

/// Default name of the search index.
pub const DEFAULT_INDEX_NAME: &str = "entities";

/// Configuration for a remote search index.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Name of the index all entity types are stored in.
    pub index_name: String,
    /// Maximum number of documents sent in a single bulk request, at least
    /// one. Larger writes are split into several requests.
    max_batch_size: usize,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            max_batch_size: 1000,
        }
    }
}

impl SearchIndexConfig {
    /// Create a config for the given index name.
    pub fn with_index_name(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            ..Self::default()
        }
    }

    /// Set a custom bulk request size. Zero is treated as one.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Documents per bulk request.
    pub fn bulk_size(&self) -> usize {
        self.max_batch_size
    }
}
