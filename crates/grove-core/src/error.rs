use grove_index::IndexError;
use grove_llm::LlmError;

/// Errors surfaced to callers of the RAG engine.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("corpus is empty")]
    EmptyCorpus,

    /// An embedding, vector, generation or storage backend failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The caller went away. Not a failure; streams end silently on it.
    #[error("cancelled")]
    Cancelled,

    #[error("provider already registered: {0}")]
    AlreadyRegistered(String),

    #[error("no active provider")]
    NoActiveProvider,

    #[error("provider {provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

impl From<IndexError> for RagError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::EmptyCorpus => Self::EmptyCorpus,
            IndexError::Cancelled => Self::Cancelled,
            IndexError::NotFound { what, id } => Self::NotFound { what, name: id },
            IndexError::Io(e) => Self::ExternalService(format!("io: {e}")),
            other => Self::ExternalService(other.to_string()),
        }
    }
}

impl From<LlmError> for RagError {
    fn from(e: LlmError) -> Self {
        Self::ExternalService(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_errors_map_to_taxonomy() {
        assert!(matches!(RagError::from(IndexError::EmptyCorpus), RagError::EmptyCorpus));
        assert!(matches!(RagError::from(IndexError::Cancelled), RagError::Cancelled));
        let nf = RagError::from(IndexError::NotFound {
            what: "document",
            id: "abc".into(),
        });
        assert_eq!(nf.to_string(), "document not found: abc");
        assert!(matches!(
            RagError::from(IndexError::Other("boom".into())),
            RagError::ExternalService(_)
        ));
    }

    #[test]
    fn llm_errors_are_external() {
        let e = RagError::from(LlmError::NoContent { provider: "openai" });
        assert!(matches!(e, RagError::ExternalService(ref m) if m == "openai returned no text"));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            RagError::AlreadyRegistered("local".into()).to_string(),
            "provider already registered: local"
        );
        assert_eq!(
            RagError::Timeout {
                operation: "retrieval",
                seconds: 5
            }
            .to_string(),
            "retrieval timed out after 5s"
        );
    }
}
