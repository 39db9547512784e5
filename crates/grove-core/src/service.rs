//! Request handling: retrieve, re-rank against session memory, prompt, stream.

use std::path::{Component, Path};
use std::sync::Arc;

use grove_index::{RetrievalCandidate, ScoringWeights, repo_key, rerank_with_context};
use grove_memory::{ConversationMemory, SessionStore};
use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};
use crate::pipeline::{GenerationPipeline, GenerationRequest, ResponseStream};
use crate::prompt::{FileContent, PromptInput, build_prompt, build_reduced_prompt};
use crate::provider::{PreparedRepository, RepoRef, Retriever, require_retriever};
use crate::registry::ProviderRegistry;

/// One user question about a repository.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub repo: RepoRef,
    pub query: String,
    /// Path relative to the repository root of a file to include verbatim.
    pub file_path: Option<String>,
    /// Conversation to continue; `None` answers without memory.
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(repo: RepoRef, query: impl Into<String>) -> Self {
        Self {
            repo,
            query: query.into(),
            file_path: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

pub struct RagService {
    registry: Arc<ProviderRegistry>,
    sessions: SessionStore,
    pipeline: GenerationPipeline,
    weights: ScoringWeights,
}

impl std::fmt::Debug for RagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("sessions", &self.sessions.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl RagService {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        sessions: SessionStore,
        pipeline: GenerationPipeline,
        weights: ScoringWeights,
    ) -> Self {
        Self {
            registry,
            sessions,
            pipeline,
            weights,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Prepare `repo` with the active provider without asking anything.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NoActiveProvider`], [`RagError::Unsupported`] for a provider
    /// without retrieval, or the preparation error.
    pub async fn prepare(
        &self,
        repo: &RepoRef,
        cancel: &CancellationToken,
    ) -> Result<PreparedRepository> {
        let provider = self.registry.active().await?;
        require_retriever(provider.as_ref())?
            .prepare_retriever(repo, cancel)
            .await
    }

    /// Walk `repo` again with the active provider, replacing whatever corpus was cached.
    ///
    /// # Errors
    ///
    /// Same as [`Self::prepare`].
    pub async fn rebuild(
        &self,
        repo: &RepoRef,
        cancel: &CancellationToken,
    ) -> Result<PreparedRepository> {
        let provider = self.registry.active().await?;
        require_retriever(provider.as_ref())?
            .refresh_retriever(repo, cancel)
            .await
    }

    /// Drop the corpus the active provider holds for `repo`. Returns `true` if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NoActiveProvider`], [`RagError::Unsupported`] for a provider
    /// without retrieval, or a cache error.
    pub async fn forget(&self, repo: &RepoRef) -> Result<bool> {
        let provider = self.registry.active().await?;
        let key = repo_key(&repo.identifier);
        let dropped = require_retriever(provider.as_ref())?.forget(&key).await?;
        tracing::info!(repo = %key, dropped, "corpus forgotten");
        Ok(dropped)
    }

    /// Ranked documents for `query`, re-ranked against the session's recent turns.
    ///
    /// # Errors
    ///
    /// Same as [`Self::prepare`], plus [`RagError::EmptyCorpus`] when the repository
    /// yields no documents.
    pub async fn search(
        &self,
        repo: &RepoRef,
        query: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalCandidate>> {
        let provider = self.registry.active().await?;
        let retriever = require_retriever(provider.as_ref())?;
        let prepared = retriever.prepare_retriever(repo, cancel).await?;
        let memory = session_id.map(|id| self.sessions.get_or_create(id));
        self.rank(retriever, &prepared, query, memory.as_deref())
            .await
    }

    /// Answer `request` as a stream of fragments.
    ///
    /// Retrieval happens before this returns; generation runs in the background. An
    /// empty corpus is not fatal here: the answer is generated without context.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NoActiveProvider`], [`RagError::Unsupported`] if the active
    /// provider cannot retrieve, [`RagError::Configuration`] for a file path that leaves
    /// the repository, or a preparation/retrieval error.
    pub async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream> {
        let provider = self.registry.active().await?;
        let memory = request
            .session_id
            .as_deref()
            .map(|id| self.sessions.get_or_create(id));

        let retriever = require_retriever(provider.as_ref())?;
        let prepared = retriever.prepare_retriever(&request.repo, cancel).await?;
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }
        let context = match self
            .rank(retriever, &prepared, &request.query, memory.as_deref())
            .await
        {
            Ok(found) => found,
            Err(RagError::EmptyCorpus) => {
                tracing::warn!(repo = %prepared.key, "empty corpus, answering without context");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let file = match request.file_path.as_deref() {
            Some(path) => read_repo_file(&prepared.root, path).await?,
            None => None,
        };

        let history = memory
            .as_ref()
            .map(|m| m.formatted_history())
            .unwrap_or_default();
        let messages = build_prompt(&PromptInput {
            history: &history,
            file: file.as_ref(),
            context: &context,
            query: &request.query,
        });
        tracing::debug!(
            repo = %prepared.key,
            documents = context.len(),
            with_file = file.is_some(),
            "prompt built"
        );

        let generation = GenerationRequest {
            messages,
            reduced: build_reduced_prompt(&request.query),
            record: memory.map(|m| (m, request.query.clone())),
        };
        Ok(self.pipeline.start(provider, generation, cancel))
    }

    async fn rank(
        &self,
        retriever: &dyn Retriever,
        prepared: &PreparedRepository,
        query: &str,
        memory: Option<&ConversationMemory>,
    ) -> Result<Vec<RetrievalCandidate>> {
        let candidates = retriever.retrieve_documents(&prepared.key, query).await?;
        let context = memory
            .map(|m| m.relevant_context(query))
            .unwrap_or_default();
        Ok(rerank_with_context(candidates, &context, &self.weights))
    }
}

/// Read `rel` under `root`. Paths escaping the root are rejected; unreadable files are
/// skipped with a warning.
async fn read_repo_file(root: &Path, rel: &str) -> Result<Option<FileContent>> {
    let rel_path = Path::new(rel);
    let escapes = rel_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(RagError::Configuration(format!(
            "file path must be relative to the repository: {rel}"
        )));
    }

    match tokio::fs::read_to_string(root.join(rel_path)).await {
        Ok(content) => Ok(Some(FileContent {
            path: rel.to_owned(),
            content,
        })),
        Err(e) => {
            tracing::warn!(path = rel, error = %e, "current file unreadable, leaving it out");
            Ok(None)
        }
    }
}
