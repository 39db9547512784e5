use grove_index::{IndexerConfig, ScoringWeights};
use grove_llm::GenerationParams;
use grove_memory::RecallConfig;
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Generation backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Claude,
    Gemini,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Claude => "claude-sonnet-4-5",
            Self::Gemini => "gemini-2.5-pro",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Falls back to [`ProviderKind::default_model`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Required for vector retrieval. Claude has no embedding endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            embedding_model: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_owned())
    }

    #[must_use]
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
        }
    }
}

/// Where document embeddings live. `None` selects lexical scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    None,
    Memory,
    Qdrant,
}

fn default_retrieval_top_k() -> usize {
    20
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub vector_backend: VectorBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            vector_backend: VectorBackend::default(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

fn default_recall_window() -> usize {
    RecallConfig::default().window
}

fn default_recall_threshold() -> f64 {
    RecallConfig::default().threshold
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default = "default_recall_window")]
    pub recall_window: usize,
    #[serde(default = "default_recall_threshold")]
    pub recall_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_window: default_recall_window(),
            recall_threshold: default_recall_threshold(),
        }
    }
}

impl MemoryConfig {
    #[must_use]
    pub fn recall(&self) -> RecallConfig {
        RecallConfig {
            window: self.recall_window,
            threshold: self.recall_threshold,
        }
    }
}

fn default_sqlite_path() -> String {
    "grove.db".into()
}

fn default_excluded_dirs() -> Vec<String> {
    IndexerConfig::default().excluded_dirs
}

fn default_excluded_files() -> Vec<String> {
    IndexerConfig::default().excluded_files
}

fn default_max_document_tokens() -> usize {
    IndexerConfig::default().max_tokens
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Corpus cache database; `":memory:"` keeps nothing between runs.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    #[serde(default = "default_excluded_files")]
    pub excluded_files: Vec<String>,
    #[serde(default = "default_max_document_tokens")]
    pub max_document_tokens: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            excluded_dirs: default_excluded_dirs(),
            excluded_files: default_excluded_files(),
            max_document_tokens: default_max_document_tokens(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn indexer(&self) -> IndexerConfig {
        IndexerConfig {
            excluded_dirs: self.excluded_dirs.clone(),
            excluded_files: self.excluded_files.clone(),
            max_tokens: self.max_document_tokens,
        }
    }
}

fn default_retrieval_timeout() -> u64 {
    30
}

fn default_prepare_timeout() -> u64 {
    600
}

fn default_generation_timeout() -> u64 {
    120
}

/// Upper bounds, in seconds, on the slow steps of a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_seconds: u64,
    /// Covers materialization plus the first build of a repository corpus.
    #[serde(default = "default_prepare_timeout")]
    pub prepare_seconds: u64,
    /// Time allowed for the generation backend to start streaming.
    #[serde(default = "default_generation_timeout")]
    pub generation_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retrieval_seconds: default_retrieval_timeout(),
            prepare_seconds: default_prepare_timeout(),
            generation_seconds: default_generation_timeout(),
        }
    }
}

/// API keys resolved from the environment, never read from or written to the file.
#[derive(Debug, Default, Clone)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
    pub claude_api_key: Option<Secret>,
    pub gemini_api_key: Option<Secret>,
}

impl ResolvedSecrets {
    #[must_use]
    pub fn api_key(&self, kind: ProviderKind) -> Option<&Secret> {
        match kind {
            ProviderKind::OpenAi => self.openai_api_key.as_ref(),
            ProviderKind::Claude => self.claude_api_key.as_ref(),
            ProviderKind::Gemini => self.gemini_api_key.as_ref(),
        }
    }
}
