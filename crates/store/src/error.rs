use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. a duplicate username).
    #[error("Unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// A row references a parent that does not exist.
    #[error("Missing referenced {entity} with id {id}")]
    MissingReference { entity: &'static str, id: i64 },

    /// A delete was rejected because other rows still depend on the target.
    #[error("{entity} {id} still has {dependents} dependent row(s)")]
    HasDependents {
        entity: &'static str,
        id: i64,
        dependents: u64,
    },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt stored value: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
