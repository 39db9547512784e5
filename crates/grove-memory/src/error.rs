/// Failures of the corpus database and the vector stores behind it.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("corpus database: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("corpus database schema: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    VectorStore(#[from] crate::vector_store::VectorStoreError),

    #[error("corpus snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document count does not fit the snapshot table: {0}")]
    DocumentCount(#[from] std::num::TryFromIntError),
}
