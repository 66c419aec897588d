//! Interface definitions for the collaborators of the sync pipeline.
//!
//! The traits allow dependency injection and swappable backends, so the
//! pipeline can be tested against in-memory or mock implementations.

mod entity_provider;
mod search_index_provider;
mod update_store;

pub use entity_provider::EntityProvider;
pub use search_index_provider::SearchIndexProvider;
pub use update_store::{UpdateDeletion, UpdateStore};
