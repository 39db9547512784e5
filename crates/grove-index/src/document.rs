//! The unit of retrieval: a file's content plus metadata.

use serde::{Deserialize, Serialize};

/// Coarse relevance tier applied as a scoring multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    #[default]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_path: String,
    pub content_type: String,
    pub is_code: bool,
    pub is_implementation: bool,
    pub importance: Importance,
    pub token_count: usize,
}

impl DocumentMetadata {
    /// Metadata for a plain, non-code document at `file_path`.
    #[must_use]
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content_type: "text".into(),
            is_code: false,
            is_implementation: false,
            importance: Importance::Normal,
            token_count: 0,
        }
    }

    #[must_use]
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }
}

/// Immutable once built; edits produce a new `Document` with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    title: String,
    text: String,
    metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

impl Document {
    /// Build a document. The id is derived from `metadata.file_path`, so re-indexing the
    /// same path yields the same id.
    #[must_use]
    pub fn new(title: impl Into<String>, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: document_id(&metadata.file_path),
            title: title.into(),
            text: text.into(),
            metadata,
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn importance(&self) -> Importance {
        self.metadata.importance
    }

    #[must_use]
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Copy without the embedding, for payloads that carry the vector separately.
    #[must_use]
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

/// Stable document id for a repository-relative path.
#[must_use]
pub fn document_id(file_path: &str) -> String {
    let hash = blake3::hash(file_path.as_bytes());
    hash.to_hex()[..16].to_owned()
}

/// UUID form of a document id, for vector stores that only accept UUID point ids.
#[must_use]
pub fn point_id(document_id: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
}
