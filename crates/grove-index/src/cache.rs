//! Durable corpus snapshots keyed by repository.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use grove_memory::SqliteStore;

use crate::BoxFuture;
use crate::document::Document;
use crate::error::Result;

/// Where built corpora are kept between runs.
///
/// A `None` from [`CorpusCache::load`] and an empty corpus are treated the same by
/// callers: both mean "build it".
pub trait CorpusCache: Send + Sync {
    fn load(&self, repo_key: &str) -> BoxFuture<'_, Result<Option<Vec<Document>>>>;

    fn store(&self, repo_key: &str, documents: Vec<Document>) -> BoxFuture<'_, Result<()>>;

    /// Returns `true` if a snapshot was removed.
    fn remove(&self, repo_key: &str) -> BoxFuture<'_, Result<bool>>;
}

/// JSON snapshots in the `corpus_snapshots` table.
#[derive(Debug, Clone)]
pub struct SqliteCorpusCache {
    store: SqliteStore,
}

impl SqliteCorpusCache {
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

impl CorpusCache for SqliteCorpusCache {
    fn load(&self, repo_key: &str) -> BoxFuture<'_, Result<Option<Vec<Document>>>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let Some(payload) = self.store.load_corpus(&repo_key).await? else {
                return Ok(None);
            };
            let documents: Vec<Document> = serde_json::from_str(&payload)?;
            tracing::debug!(repo = %repo_key, count = documents.len(), "loaded cached corpus");
            Ok(Some(documents))
        })
    }

    fn store(&self, repo_key: &str, documents: Vec<Document>) -> BoxFuture<'_, Result<()>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let payload = serde_json::to_string(&documents)?;
            self.store
                .save_corpus(&repo_key, &payload, documents.len())
                .await?;
            Ok(())
        })
    }

    fn remove(&self, repo_key: &str) -> BoxFuture<'_, Result<bool>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move { Ok(self.store.delete_corpus(&repo_key).await?) })
    }
}

/// Process-local cache for tests and one-shot runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCorpusCache {
    corpora: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl InMemoryCorpusCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.corpora.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CorpusCache for InMemoryCorpusCache {
    fn load(&self, repo_key: &str) -> BoxFuture<'_, Result<Option<Vec<Document>>>> {
        let found = self
            .corpora
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repo_key)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn store(&self, repo_key: &str, documents: Vec<Document>) -> BoxFuture<'_, Result<()>> {
        self.corpora
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repo_key.to_owned(), documents);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, repo_key: &str) -> BoxFuture<'_, Result<bool>> {
        let removed = self
            .corpora
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(repo_key)
            .is_some();
        Box::pin(async move { Ok(removed) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, Importance};

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "README.md",
                "# Title",
                DocumentMetadata::new("README.md").with_importance(Importance::High),
            ),
            Document::new("src/a.rs", "fn a() {}", DocumentMetadata::new("src/a.rs"))
                .with_embedding(vec![0.5, 0.5]),
        ]
    }

    #[tokio::test]
    async fn sqlite_cache_round_trip() {
        let cache = SqliteCorpusCache::new(SqliteStore::new(":memory:").await.unwrap());
        assert!(cache.load("repo").await.unwrap().is_none());

        cache.store("repo", corpus()).await.unwrap();
        assert_eq!(cache.load("repo").await.unwrap().unwrap(), corpus());

        assert!(cache.remove("repo").await.unwrap());
        assert!(cache.load("repo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_cache_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.db");
        let path = path.to_str().unwrap();

        SqliteCorpusCache::new(SqliteStore::new(path).await.unwrap())
            .store("repo", corpus())
            .await
            .unwrap();

        let reopened = SqliteCorpusCache::new(SqliteStore::new(path).await.unwrap());
        assert_eq!(reopened.load("repo").await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_cache_round_trip() {
        let cache = InMemoryCorpusCache::new();
        cache.store("repo", corpus()).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.load("repo").await.unwrap().unwrap()[0].title(), "README.md");
        assert!(cache.remove("repo").await.unwrap());
        assert!(!cache.remove("repo").await.unwrap());
        assert!(cache.is_empty());
    }
}
