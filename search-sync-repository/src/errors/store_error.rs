//! Relational store error types.

use thiserror::Error;

/// Errors raised while reading entities or shadow rows from the database.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// A statement failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Beginning, committing or rolling back a transaction failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Rows could not be mapped to the requested shape (unknown entity type,
    /// id of the wrong arity, unexpected column type).
    #[error("Mapping error: {0}")]
    MappingError(String),

    /// The blocking task running the statement did not complete.
    #[error("Task error: {0}")]
    TaskError(String),
}

impl StoreError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::TransactionError(msg.into())
    }

    /// Create a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::MappingError(msg.into())
    }

    /// Create a task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Self::TaskError(msg.into())
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::TransactionError(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}
