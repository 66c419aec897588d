//! # Search Sync Repository
//!
//! This crate defines the collaborators the sync pipeline talks to and
//! provides implementations for them:
//!
//! - [`SearchIndexProvider`]: the search index. Implemented in memory and for OpenSearch.
//! - [`EntityProvider`]: loads the current state of entities. Implemented for SQLite.
//! - [`UpdateStore`]: reads and deletes trigger-written shadow rows. Implemented for SQLite.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod sqlite;

pub use config::SearchIndexConfig;
pub use errors::{SearchError, StoreError};
pub use interfaces::{EntityProvider, SearchIndexProvider, UpdateDeletion, UpdateStore};
pub use memory::InMemorySearchIndex;
pub use opensearch::OpenSearchIndex;
pub use sqlite::{EntityTable, SqliteDatabase, SqliteEntityProvider, SqliteUpdateStore};
