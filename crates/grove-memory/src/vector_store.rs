use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Failure of a [`VectorStore`] operation, tagged with the collection involved.
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector collection {0} does not exist")]
    MissingCollection(String),

    #[error("vector backend could not {op} in {collection}: {message}")]
    Backend {
        op: &'static str,
        collection: String,
        message: String,
    },

    #[error("payload of point {id} cannot be stored: {message}")]
    Payload { id: String, message: String },
}

impl VectorStoreError {
    pub(crate) fn backend(op: &'static str, collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            collection: collection.to_owned(),
            message: err.to_string(),
        }
    }
}

/// A vector plus its flat payload. Payload values are JSON scalars.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Nearest-neighbour index over named collections, one collection per corpus.
pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Return up to `limit` points ordered by descending similarity.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;
}
