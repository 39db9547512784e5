mod corpus;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::MemoryError;

pub use corpus::CorpusRow;

const IN_MEMORY: &str = ":memory:";

/// Durable corpus snapshots, one row per repository.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database at `path` and bring its schema up to date.
    /// `":memory:"` gives a private database that lives as long as the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let (options, connections) = if path == IN_MEMORY {
            // Every in-memory connection is a separate database.
            (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
        } else {
            let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            (options, 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        tracing::debug!(path, "corpus database ready");
        Ok(Self { pool })
    }

    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub async fn in_memory() -> Result<Self, MemoryError> {
        Self::new(IN_MEMORY).await
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
