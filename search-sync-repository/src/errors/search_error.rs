//! Errors raised by search index backends.

use thiserror::Error;

/// Failure of a search index operation.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    /// The search engine could not be reached.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    /// A bulk index, update or delete request was rejected, fully or for
    /// some of its items.
    #[error("Bulk write error: {0}")]
    BulkWriteError(String),

    /// A delete-by-query request failed.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// The index could not be created or checked.
    #[error("Index setup error: {0}")]
    IndexSetupError(String),

    /// The engine answered with a body that could not be read.
    #[error("Response error: {0}")]
    ResponseError(String),
}

impl SearchError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    pub fn bulk_write(msg: impl Into<String>) -> Self {
        Self::BulkWriteError(msg.into())
    }

    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    pub fn index_setup(msg: impl Into<String>) -> Self {
        Self::IndexSetupError(msg.into())
    }

    pub fn response(msg: impl Into<String>) -> Self {
        Self::ResponseError(msg.into())
    }
}
