//! The built-in provider: a local repository index plus an LLM backend.

use std::sync::Arc;
use std::time::Duration;

use grove_index::{Document, RepositoryIndex, RetrievalCandidate, RetrievalEngine, repo_key};
use grove_llm::any::AnyProvider;
use grove_llm::{ChatStream, LlmProvider, Message};
use tokio_util::sync::CancellationToken;

use crate::config::TimeoutConfig;
use crate::error::{RagError, Result};
use crate::materializer::{LocalPathMaterializer, Materializer};
use crate::provider::{
    BoxFuture, DocumentStore, Generator, Lifecycle, PreparedRepository, RagProvider, RepoRef,
    Retriever,
};

const DEFAULT_TOP_K: usize = 20;

async fn with_timeout<T>(
    operation: &'static str,
    seconds: u64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(seconds), fut)
        .await
        .map_err(|_| RagError::Timeout { operation, seconds })?
}

/// Retrieval over [`RepositoryIndex`], generation through [`AnyProvider`].
///
/// Without an LLM the provider is retrieval-only and exposes no [`Generator`].
pub struct RepositoryRagProvider {
    name: String,
    llm: Option<Arc<AnyProvider>>,
    index: Arc<RepositoryIndex>,
    engine: RetrievalEngine,
    materializer: Arc<dyn Materializer>,
    top_k: usize,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for RepositoryRagProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRagProvider")
            .field("name", &self.name)
            .field("llm", &self.llm.as_ref().map(|llm| llm.name().to_owned()))
            .field("scorer", &self.index.scorer().name())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl RepositoryRagProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, index: Arc<RepositoryIndex>) -> Self {
        let engine = RetrievalEngine::new(Arc::clone(index.scorer()));
        Self {
            name: name.into(),
            llm: None,
            index,
            engine,
            materializer: Arc::new(LocalPathMaterializer),
            top_k: DEFAULT_TOP_K,
            timeouts: TimeoutConfig::default(),
        }
    }

    #[must_use]
    pub fn with_llm(mut self, llm: Arc<AnyProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializer = materializer;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn index(&self) -> &Arc<RepositoryIndex> {
        &self.index
    }
}

impl Lifecycle for RepositoryRagProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let embeds = self.llm.as_ref().is_some_and(|llm| llm.supports_embeddings());
            if self.index.scorer().name() == "vector" && !embeds {
                return Err(RagError::Configuration(
                    "vector retrieval needs an LLM backend with embeddings".into(),
                ));
            }
            tracing::info!(
                provider = %self.name,
                llm = self.llm.as_ref().map_or("none", |llm| llm.name()),
                scorer = self.index.scorer().name(),
                "provider initialized"
            );
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tracing::debug!(provider = %self.name, "provider closed");
            Ok(())
        })
    }
}

impl Retriever for RepositoryRagProvider {
    fn prepare_retriever<'a>(
        &'a self,
        repo: &'a RepoRef,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<PreparedRepository>> {
        Box::pin(with_timeout(
            "repository preparation",
            self.timeouts.prepare_seconds,
            async move {
                let key = repo_key(&repo.identifier);
                let root = self.materializer.materialize(repo).await?;
                let (_, report) = self
                    .index
                    .spawn_build(&key, &root)
                    .wait_or_cancel(cancel)
                    .await?;
                Ok(PreparedRepository { key, root, report })
            },
        ))
    }

    fn refresh_retriever<'a>(
        &'a self,
        repo: &'a RepoRef,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<PreparedRepository>> {
        Box::pin(with_timeout(
            "repository refresh",
            self.timeouts.prepare_seconds,
            async move {
                let key = repo_key(&repo.identifier);
                let root = self.materializer.materialize(repo).await?;
                let (_, report) = self.index.rebuild(&key, &root, cancel).await?;
                tracing::info!(repo = %key, files = report.files_indexed, "corpus rebuilt");
                Ok(PreparedRepository { key, root, report })
            },
        ))
    }

    fn forget<'a>(&'a self, repo_key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.index.invalidate(repo_key).await?) })
    }

    fn retrieve_documents<'a>(
        &'a self,
        repo_key: &'a str,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<RetrievalCandidate>>> {
        Box::pin(with_timeout(
            "retrieval",
            self.timeouts.retrieval_seconds,
            async move {
                let corpus = self.index.corpus(repo_key).unwrap_or_default();
                Ok(self
                    .engine
                    .retrieve(repo_key, query, &corpus, self.top_k)
                    .await?)
            },
        ))
    }
}

impl Generator for RepositoryRagProvider {
    fn generate_stream<'a>(&'a self, messages: &'a [Message]) -> BoxFuture<'a, Result<ChatStream>> {
        Box::pin(async move {
            let llm = self.llm.as_ref().ok_or_else(|| RagError::Unsupported {
                provider: self.name.clone(),
                capability: "generation",
            })?;
            Ok(llm.chat_stream(messages).await?)
        })
    }
}

impl DocumentStore for RepositoryRagProvider {
    fn index_document<'a>(
        &'a self,
        repo_key: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Ok(self.index.upsert_document(repo_key, document).await?) })
    }

    fn get_document<'a>(&'a self, repo_key: &'a str, id: &'a str) -> BoxFuture<'a, Result<Document>> {
        Box::pin(async move { Ok(self.index.get_document(repo_key, id).await?) })
    }

    fn delete_document<'a>(&'a self, repo_key: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Ok(self.index.delete_document(repo_key, id).await?) })
    }
}

impl RagProvider for RepositoryRagProvider {
    fn retriever(&self) -> Option<&dyn Retriever> {
        Some(self)
    }

    fn generator(&self) -> Option<&dyn Generator> {
        if self.llm.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn documents(&self) -> Option<&dyn DocumentStore> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use futures::StreamExt;
    use grove_index::{
        DocumentMetadata, IndexerConfig, InMemoryCorpusCache, LexicalScorer, VectorScorer,
    };
    use grove_llm::mock::MockProvider;
    use grove_memory::InMemoryVectorStore;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn lexical_provider(mock: MockProvider) -> RepositoryRagProvider {
        let index = RepositoryIndex::new(
            Arc::new(InMemoryCorpusCache::new()),
            Arc::new(LexicalScorer::default()),
            IndexerConfig::default(),
        );
        RepositoryRagProvider::new("local", Arc::new(index))
            .with_llm(Arc::new(AnyProvider::Mock(mock)))
    }

    #[tokio::test]
    async fn prepare_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "auth.go", "auth handler");
        write(dir.path(), "util.go", "unrelated util");

        let provider = lexical_provider(MockProvider::default());
        let repo = RepoRef::new(dir.path().to_string_lossy());
        let prepared = provider
            .prepare_retriever(&repo, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(prepared.report.files_indexed, 2);

        let hits = provider
            .retrieve_documents(&prepared.key, "auth")
            .await
            .unwrap();
        assert_eq!(hits[0].document.title(), "auth.go");
    }

    #[tokio::test]
    async fn retrieve_unprepared_repo_is_empty_corpus() {
        let provider = lexical_provider(MockProvider::default());
        let err = provider.retrieve_documents("nothing", "x").await.unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
    }

    #[tokio::test]
    async fn top_k_limits_results() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("f{i}.md"), "shared term");
        }
        let provider = lexical_provider(MockProvider::default()).with_top_k(2);
        let repo = RepoRef::new(dir.path().to_string_lossy());
        let prepared = provider
            .prepare_retriever(&repo, &CancellationToken::new())
            .await
            .unwrap();
        let hits = provider.retrieve_documents(&prepared.key, "shared").await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn generator_streams_from_llm() {
        let provider = lexical_provider(MockProvider::with_fragments(["a", "b"]));
        let stream = provider.generate_stream(&[Message::user("q")]).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn document_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = lexical_provider(MockProvider::default());
        let repo = RepoRef::new(dir.path().to_string_lossy());
        let key = provider
            .prepare_retriever(&repo, &CancellationToken::new())
            .await
            .unwrap()
            .key;

        let doc = Document::new("notes.md", "hello", DocumentMetadata::new("notes.md"));
        let id = doc.id().to_owned();
        provider.index_document(&key, doc.clone()).await.unwrap();
        assert_eq!(provider.get_document(&key, &id).await.unwrap(), doc);
        provider.delete_document(&key, &id).await.unwrap();
        assert!(matches!(
            provider.get_document(&key, &id).await.unwrap_err(),
            RagError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn documents_need_a_prepared_repository() {
        let provider = lexical_provider(MockProvider::default());
        let doc = Document::new("notes.md", "hello", DocumentMetadata::new("notes.md"));
        assert!(matches!(
            provider.index_document("unprepared", doc).await.unwrap_err(),
            RagError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn refresh_sees_new_files_and_forget_drops_the_corpus() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "auth.go", "auth handler");
        let provider = lexical_provider(MockProvider::default());
        let repo = RepoRef::new(dir.path().to_string_lossy());
        let cancel = CancellationToken::new();
        provider.prepare_retriever(&repo, &cancel).await.unwrap();

        write(dir.path(), "billing.go", "invoice totals");
        let cached = provider.prepare_retriever(&repo, &cancel).await.unwrap();
        assert!(cached.report.cache_hit);
        assert_eq!(cached.report.files_indexed, 1);

        let refreshed = provider.refresh_retriever(&repo, &cancel).await.unwrap();
        assert!(!refreshed.report.cache_hit);
        assert_eq!(refreshed.report.files_indexed, 2);
        let hits = provider
            .retrieve_documents(&refreshed.key, "invoice")
            .await
            .unwrap();
        assert_eq!(hits[0].document.title(), "billing.go");

        assert!(provider.forget(&refreshed.key).await.unwrap());
        assert!(provider.index().corpus(&refreshed.key).is_none());
        assert!(!provider.forget(&refreshed.key).await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_preparation_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "auth.go", "auth handler");
        let provider = lexical_provider(MockProvider::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider
            .prepare_retriever(&RepoRef::new(dir.path().to_string_lossy()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
    }

    #[tokio::test]
    async fn vector_mode_requires_embeddings() {
        let llm = Arc::new(AnyProvider::Mock(MockProvider::default()));
        let scorer = VectorScorer::new(Arc::clone(&llm), Arc::new(InMemoryVectorStore::new()));
        let index = RepositoryIndex::new(
            Arc::new(InMemoryCorpusCache::new()),
            Arc::new(scorer),
            IndexerConfig::default(),
        );
        let provider = RepositoryRagProvider::new("vec", Arc::new(index)).with_llm(llm);
        assert!(matches!(
            provider.initialize().await.unwrap_err(),
            RagError::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn without_llm_the_provider_is_retrieval_only() {
        let index = RepositoryIndex::new(
            Arc::new(InMemoryCorpusCache::new()),
            Arc::new(LexicalScorer::default()),
            IndexerConfig::default(),
        );
        let provider = RepositoryRagProvider::new("search", Arc::new(index));
        provider.initialize().await.unwrap();
        assert!(provider.retriever().is_some());
        assert!(provider.generator().is_none());
        assert!(matches!(
            provider.generate_stream(&[]).await.err().unwrap(),
            RagError::Unsupported { .. }
        ));
    }

    #[tokio::test]
    async fn capabilities_are_all_present() {
        let provider = lexical_provider(MockProvider::default());
        assert!(provider.retriever().is_some());
        assert!(provider.generator().is_some());
        assert!(provider.documents().is_some());
        provider.initialize().await.unwrap();
        provider.close().await.unwrap();
    }
}
