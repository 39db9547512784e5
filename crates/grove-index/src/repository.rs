//! Per-repository corpora: build once, cache, serve, edit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{OwnedMutexGuard, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::cache::CorpusCache;
use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::indexer::{IndexReport, IndexerConfig, build_corpus};
use crate::scorer::Scorer;

pub type Corpus = Arc<Vec<Document>>;

/// Normalize a repository URL or path into a storage key.
///
/// `https://github.com/acme/app.git` → `github.com_acme_app`.
#[must_use]
pub fn repo_key(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_slash = without_scheme.trim_end_matches('/');
    let without_git = without_slash.strip_suffix(".git").unwrap_or(without_slash);
    without_git.replace(['/', '\\'], "_")
}

/// Repository key → corpus, backed by a [`CorpusCache`] and kept in step with a [`Scorer`].
///
/// At most one build per key runs at a time; concurrent callers wait for it and reuse
/// the result.
pub struct RepositoryIndex {
    cache: Arc<dyn CorpusCache>,
    scorer: Arc<dyn Scorer>,
    config: IndexerConfig,
    corpora: RwLock<HashMap<String, Corpus>>,
    /// Only keys with a holder or a waiter have an entry.
    leases: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive right to build or edit one repository's corpus.
struct Lease<'a> {
    leases: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if leases
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            leases.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for RepositoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryIndex")
            .field("scorer", &self.scorer.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RepositoryIndex {
    #[must_use]
    pub fn new(
        cache: Arc<dyn CorpusCache>,
        scorer: Arc<dyn Scorer>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            cache,
            scorer,
            config,
            corpora: RwLock::new(HashMap::new()),
            leases: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn scorer(&self) -> &Arc<dyn Scorer> {
        &self.scorer
    }

    /// The in-memory corpus for `repo_key`, if one was built or loaded.
    #[must_use]
    pub fn corpus(&self, repo_key: &str) -> Option<Corpus> {
        self.corpora
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repo_key)
            .cloned()
    }

    fn non_empty_corpus(&self, repo_key: &str) -> Option<Corpus> {
        self.corpus(repo_key).filter(|c| !c.is_empty())
    }

    fn publish(&self, repo_key: &str, corpus: Corpus) {
        self.corpora
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repo_key.to_owned(), corpus);
    }

    async fn lease(&self, repo_key: &str) -> Lease<'_> {
        let lock = {
            let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(leases.entry(repo_key.to_owned()).or_default())
        };
        Lease {
            leases: &self.leases,
            key: repo_key.to_owned(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Return the corpus for `repo_key`, building it from `root` if neither memory nor
    /// the cache holds a non-empty one.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Cancelled`] if `cancel` fires before the build finishes (the
    /// cache is left untouched), or an IO/scorer error.
    pub async fn ensure(
        &self,
        repo_key: &str,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Corpus, IndexReport)> {
        let cached_report = |corpus: &Corpus| IndexReport {
            files_indexed: corpus.len(),
            cache_hit: true,
            ..IndexReport::default()
        };

        if let Some(corpus) = self.non_empty_corpus(repo_key) {
            return Ok((Arc::clone(&corpus), cached_report(&corpus)));
        }

        let _lease = self.lease(repo_key).await;

        if let Some(corpus) = self.non_empty_corpus(repo_key) {
            return Ok((Arc::clone(&corpus), cached_report(&corpus)));
        }

        match self.cache.load(repo_key).await {
            Ok(Some(documents)) if !documents.is_empty() => {
                if !self.scorer.is_prepared(repo_key).await? {
                    self.scorer.prepare(repo_key, &documents).await?;
                }
                let corpus = Arc::new(documents);
                self.publish(repo_key, Arc::clone(&corpus));
                tracing::info!(repo = repo_key, count = corpus.len(), "using cached corpus");
                return Ok((Arc::clone(&corpus), cached_report(&corpus)));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(repo = repo_key, error = %e, "corpus cache unreadable, rebuilding"),
        }

        let root: PathBuf = root.to_path_buf();
        let config = self.config.clone();
        let build_cancel = cancel.clone();
        let (documents, report) =
            tokio::task::spawn_blocking(move || build_corpus(&root, &config, &build_cancel))
                .await
                .map_err(|e| IndexError::Other(format!("index task failed: {e}")))??;

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        self.scorer.prepare(repo_key, &documents).await?;
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        if !documents.is_empty()
            && let Err(e) = self.cache.store(repo_key, documents.clone()).await
        {
            tracing::warn!(repo = repo_key, error = %e, "failed to cache corpus");
        }

        let corpus = Arc::new(documents);
        self.publish(repo_key, Arc::clone(&corpus));
        Ok((corpus, report))
    }

    /// Drop every trace of `repo_key` (memory, cache, scorer index).
    /// Returns `true` if anything was held in memory or the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or scorer index cannot be cleared.
    pub async fn invalidate(&self, repo_key: &str) -> Result<bool> {
        let _lease = self.lease(repo_key).await;

        let in_memory = self
            .corpora
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(repo_key)
            .is_some();
        let in_cache = self.cache.remove(repo_key).await?;
        self.scorer.drop_index(repo_key).await?;
        tracing::info!(repo = repo_key, "corpus invalidated");
        Ok(in_memory || in_cache)
    }

    /// Discard the existing corpus and build a fresh one.
    ///
    /// # Errors
    ///
    /// See [`RepositoryIndex::ensure`].
    pub async fn rebuild(
        &self,
        repo_key: &str,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Corpus, IndexReport)> {
        self.invalidate(repo_key).await?;
        self.ensure(repo_key, root, cancel).await
    }

    /// Run [`RepositoryIndex::ensure`] on a background task.
    ///
    /// The build stops without touching the cache if the job is cancelled or dropped first.
    #[must_use]
    pub fn spawn_build(self: &Arc<Self>, repo_key: &str, root: &Path) -> BuildJob {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let index = Arc::clone(self);
        let key = repo_key.to_owned();
        let root = root.to_path_buf();
        let token = cancel.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(IndexError::Cancelled),
                r = index.ensure(&key, &root, &token) => r,
            };
            if let Err(IndexError::Cancelled) = &result {
                tracing::info!(repo = %key, "index build cancelled");
            }
            let _ = tx.send(result);
        });

        BuildJob {
            cancel: cancel.clone(),
            rx,
            _guard: cancel.drop_guard(),
        }
    }

    /// The corpus edits apply to. Only a repository that was built (or whose built corpus
    /// is cached) has one; editing never creates a corpus, so it cannot stand in for a walk.
    async fn current(&self, repo_key: &str) -> Result<Corpus> {
        if let Some(corpus) = self.corpus(repo_key) {
            return Ok(corpus);
        }
        match self.cache.load(repo_key).await? {
            Some(documents) => {
                if !self.scorer.is_prepared(repo_key).await? {
                    self.scorer.prepare(repo_key, &documents).await?;
                }
                Ok(Arc::new(documents))
            }
            None => Err(IndexError::NotFound {
                what: "repository",
                id: repo_key.to_owned(),
            }),
        }
    }

    async fn commit(&self, repo_key: &str, documents: Vec<Document>) -> Result<()> {
        self.cache.store(repo_key, documents.clone()).await?;
        self.publish(repo_key, Arc::new(documents));
        Ok(())
    }

    /// Insert `document` into a built corpus, replacing any document with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if `repo_key` was never built, or an error if the
    /// scorer index or the cache cannot be updated.
    pub async fn upsert_document(&self, repo_key: &str, document: Document) -> Result<()> {
        let _lease = self.lease(repo_key).await;

        let mut documents = (*self.current(repo_key).await?).clone();
        match documents.iter_mut().find(|d| d.id() == document.id()) {
            Some(existing) => *existing = document.clone(),
            None => documents.push(document.clone()),
        }
        self.scorer
            .prepare(repo_key, std::slice::from_ref(&document))
            .await?;
        self.commit(repo_key, documents).await?;
        tracing::debug!(repo = repo_key, id = document.id(), "document upserted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if the repository was never built or no document
    /// has `id`.
    pub async fn get_document(&self, repo_key: &str, id: &str) -> Result<Document> {
        self.current(repo_key)
            .await?
            .iter()
            .find(|d| d.id() == id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound {
                what: "document",
                id: id.to_owned(),
            })
    }

    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if no document has `id`, or a cache/scorer error.
    pub async fn delete_document(&self, repo_key: &str, id: &str) -> Result<()> {
        let _lease = self.lease(repo_key).await;

        let current = self.current(repo_key).await?;
        if !current.iter().any(|d| d.id() == id) {
            return Err(IndexError::NotFound {
                what: "document",
                id: id.to_owned(),
            });
        }
        let documents: Vec<Document> = current.iter().filter(|d| d.id() != id).cloned().collect();
        self.scorer.remove(repo_key, &[id.to_owned()]).await?;
        self.commit(repo_key, documents).await?;
        tracing::debug!(repo = repo_key, id, "document deleted");
        Ok(())
    }
}

/// Handle to a background build started by [`RepositoryIndex::spawn_build`].
///
/// Dropping the handle cancels the build.
pub struct BuildJob {
    cancel: CancellationToken,
    rx: oneshot::Receiver<Result<(Corpus, IndexReport)>>,
    _guard: DropGuard,
}

impl std::fmt::Debug for BuildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildJob")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BuildJob {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the build to finish.
    ///
    /// # Errors
    ///
    /// Returns the build's error, or [`IndexError::Cancelled`] if the task went away.
    pub async fn wait(self) -> Result<(Corpus, IndexReport)> {
        let Self { rx, _guard, .. } = self;
        rx.await.unwrap_or(Err(IndexError::Cancelled))
    }

    /// Wait for the build, giving up when `cancel` fires. Giving up drops the job, which
    /// stops the build.
    ///
    /// # Errors
    ///
    /// Same as [`BuildJob::wait`].
    pub async fn wait_or_cancel(self, cancel: &CancellationToken) -> Result<(Corpus, IndexReport)> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(IndexError::Cancelled),
            result = self.wait() => result,
        }
    }
}
