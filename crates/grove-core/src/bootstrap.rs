//! Wiring a [`RagService`] from [`Config`].

use std::sync::Arc;
use std::time::Duration;

use grove_index::{LexicalScorer, RepositoryIndex, Scorer, SqliteCorpusCache, VectorScorer};
use grove_llm::any::AnyProvider;
use grove_llm::claude::ClaudeProvider;
use grove_llm::gemini::{self, GeminiProvider};
use grove_llm::openai::{self, OpenAiProvider};
use grove_memory::{InMemoryVectorStore, QdrantOps, SessionStore, SqliteStore, VectorStore};

use crate::config::{Config, ProviderKind, VectorBackend};
use crate::error::{RagError, Result};
use crate::pipeline::GenerationPipeline;
use crate::rag::RepositoryRagProvider;
use crate::registry::ProviderRegistry;
use crate::service::RagService;

/// Name the built-in provider is registered under.
pub const LOCAL_PROVIDER: &str = "local";

/// # Errors
///
/// Returns [`RagError::Configuration`] if no API key is set for the configured backend.
pub fn create_llm(config: &Config) -> Result<AnyProvider> {
    let kind = config.llm.provider;
    let api_key = config
        .secrets
        .api_key(kind)
        .ok_or_else(|| {
            RagError::Configuration(format!(
                "no API key for {kind}; set GROVE_{}_API_KEY",
                kind.as_str().to_uppercase()
            ))
        })?
        .expose()
        .to_owned();
    let model = config.llm.model();
    let params = config.llm.params();
    let embedding_model = config.llm.embedding_model.clone();

    let base_url = |default: &str| {
        config
            .llm
            .base_url
            .clone()
            .unwrap_or_else(|| default.to_owned())
    };
    let provider: AnyProvider = match kind {
        ProviderKind::OpenAi => OpenAiProvider::new(
            api_key,
            base_url(openai::DEFAULT_BASE_URL),
            model,
            params,
            embedding_model,
        )
        .into(),
        ProviderKind::Claude => ClaudeProvider::new(api_key, model, params).into(),
        ProviderKind::Gemini => GeminiProvider::new(
            api_key,
            base_url(gemini::DEFAULT_BASE_URL),
            model,
            params,
            embedding_model,
        )
        .into(),
    };
    tracing::debug!(provider = %kind, model = %config.llm.model(), "llm backend created");
    Ok(provider)
}

/// Lexical scoring unless a vector backend is configured.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] if vector scoring is selected without an LLM, or
/// [`RagError::ExternalService`] if the Qdrant client cannot be built.
pub fn create_scorer(config: &Config, llm: Option<&Arc<AnyProvider>>) -> Result<Arc<dyn Scorer>> {
    let store: Arc<dyn VectorStore> = match config.retrieval.vector_backend {
        VectorBackend::None => return Ok(Arc::new(LexicalScorer::new(config.scoring))),
        VectorBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        VectorBackend::Qdrant => Arc::new(
            QdrantOps::new(&config.retrieval.qdrant_url)
                .map_err(|e| RagError::ExternalService(format!("qdrant: {e}")))?,
        ),
    };
    let llm = llm.ok_or_else(|| {
        RagError::Configuration("vector retrieval needs an LLM backend for embeddings".into())
    })?;
    Ok(Arc::new(VectorScorer::new(Arc::clone(llm), store)))
}

/// # Errors
///
/// Returns [`RagError::ExternalService`] if the corpus cache database cannot be opened,
/// or a [`create_scorer`] error.
pub async fn create_index(
    config: &Config,
    llm: Option<&Arc<AnyProvider>>,
) -> Result<Arc<RepositoryIndex>> {
    let store = SqliteStore::new(&config.index.sqlite_path)
        .await
        .map_err(|e| RagError::ExternalService(format!("corpus cache: {e}")))?;
    let scorer = create_scorer(config, llm)?;
    Ok(Arc::new(RepositoryIndex::new(
        Arc::new(SqliteCorpusCache::new(store)),
        scorer,
        config.index.indexer(),
    )))
}

/// Build a service with the built-in provider registered and active.
///
/// With `require_generation` unset, a missing API key yields a retrieval-only provider
/// (lexical mode only).
///
/// # Errors
///
/// Returns a validation, backend or registration error.
pub async fn build_service(config: &Config, require_generation: bool) -> Result<RagService> {
    config.validate()?;

    let needs_llm = require_generation || config.retrieval.vector_backend != VectorBackend::None;
    let llm = if needs_llm {
        Some(Arc::new(create_llm(config)?))
    } else {
        create_llm(config).ok().map(Arc::new)
    };

    let index = create_index(config, llm.as_ref()).await?;
    let mut provider = RepositoryRagProvider::new(LOCAL_PROVIDER, index)
        .with_top_k(config.retrieval.top_k)
        .with_timeouts(config.timeouts);
    if let Some(llm) = llm {
        provider = provider.with_llm(llm);
    }

    let registry = Arc::new(ProviderRegistry::new());
    registry.register(Arc::new(provider)).await?;

    Ok(RagService::new(
        registry,
        SessionStore::new(config.memory.recall()),
        GenerationPipeline::new(Duration::from_secs(config.timeouts.generation_seconds)),
        config.scoring,
    ))
}
