use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Datastore IO or schema failure. Always surfaced; the caller's write
/// transaction has been rolled back by the time this is returned.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cold-tier archival error: {0}")]
    ColdTier(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integrity error: cached call identifier points to nothing: {0}")]
    Integrity(String),
}
