//! # Search Sync Shared
//!
//! Shared types for the search sync system: the documents that live in the
//! search index, the queries run against it, the raw rows captured by the
//! database triggers and the typed update events derived from them.

pub mod descriptor;
pub mod document;
pub mod events;
pub mod query;

pub use descriptor::{ColumnType, DescriptorError, EntityUpdateDescriptor, IdMapping};
pub use document::{document_key, EntityDocument, EntityId, IdValue};
pub use events::{ColumnValue, EventCase, RawUpdateRow, UnknownEventCase, UpdateEvent};
pub use query::{QueryFilter, SearchQuery, SearchResponse};
