use thiserror::Error;

use domain::UnknownTag;

/// Errors that can occur when interacting with the market store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated, typically by a concurrent writer.
    #[error("Unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// A stored row carries a value the domain model rejects.
    #[error("Corrupt row: {0}")]
    Corrupt(#[from] UnknownTag),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
