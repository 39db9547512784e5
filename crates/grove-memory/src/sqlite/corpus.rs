use super::SqliteStore;
use crate::error::MemoryError;

/// Summary of one stored corpus snapshot.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CorpusRow {
    pub repo_key: String,
    pub document_count: i64,
    pub updated_at: String,
}

impl SqliteStore {
    /// Replace the serialized corpus stored under `repo_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn save_corpus(
        &self,
        repo_key: &str,
        payload: &str,
        document_count: usize,
    ) -> Result<(), MemoryError> {
        let count = i64::try_from(document_count)?;
        sqlx::query(
            "INSERT INTO corpus_snapshots (repo_key, payload, document_count) VALUES (?, ?, ?) \
             ON CONFLICT(repo_key) DO UPDATE SET payload = excluded.payload, \
             document_count = excluded.document_count, updated_at = datetime('now')",
        )
        .bind(repo_key)
        .bind(payload)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the serialized corpus for `repo_key`, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_corpus(&self, repo_key: &str) -> Result<Option<String>, MemoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM corpus_snapshots WHERE repo_key = ?")
                .bind(repo_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Delete the snapshot for `repo_key`. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_corpus(&self, repo_key: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM corpus_snapshots WHERE repo_key = ?")
            .bind(repo_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_corpora(&self) -> Result<Vec<CorpusRow>, MemoryError> {
        let rows = sqlx::query_as::<_, CorpusRow>(
            "SELECT repo_key, document_count, updated_at FROM corpus_snapshots ORDER BY repo_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
