use grove_llm::LlmError;
use grove_memory::{MemoryError, VectorStoreError};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Walking or reading the repository tree failed.
    #[error("repository read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corpus cache failed: {0}")]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    /// Embedding a query or document failed.
    #[error("embedding failed: {0}")]
    Llm(#[from] LlmError),

    #[error("corpus snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corpus is empty")]
    EmptyCorpus,

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("indexing cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
