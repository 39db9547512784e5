mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::Context;

use crate::error::RagError;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values that would make retrieval or generation meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RagError> {
        let invalid = |msg: &str| Err(RagError::Configuration(msg.to_owned()));

        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.memory.recall_threshold) {
            return invalid("memory.recall_threshold must be within [0, 1]");
        }
        if self.memory.recall_window == 0 {
            return invalid("memory.recall_window must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid("llm.temperature must be within [0, 2]");
        }
        if !(self.llm.top_p > 0.0 && self.llm.top_p <= 1.0) {
            return invalid("llm.top_p must be within (0, 1]");
        }
        if self.llm.max_tokens == 0 {
            return invalid("llm.max_tokens must be at least 1");
        }
        if self.index.max_document_tokens == 0 {
            return invalid("index.max_document_tokens must be at least 1");
        }
        if self.timeouts.retrieval_seconds == 0
            || self.timeouts.prepare_seconds == 0
            || self.timeouts.generation_seconds == 0
        {
            return invalid("timeouts must be at least 1 second");
        }
        if self.retrieval.vector_backend != VectorBackend::None {
            if self.llm.provider == ProviderKind::Claude {
                return invalid("vector retrieval needs an embedding provider; claude has none");
            }
            if self.llm.embedding_model.is_none() {
                return invalid("vector retrieval needs llm.embedding_model");
            }
        }
        Ok(())
    }
}
