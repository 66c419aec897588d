//! OpenSearch implementation of the search index provider.
//!
//! All entity types share one index; documents are keyed by
//! `{entity_type}:{entity_id}`.

mod client;
mod index_config;
mod queries;

pub use client::OpenSearchIndex;
pub use index_config::get_index_settings;
