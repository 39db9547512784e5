use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};

/// Points kept in insertion order so equal scores come back in a stable order.
type Collection = Vec<VectorPoint>;

/// Brute-force cosine search, for tests and runs without a Qdrant server.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in `collection`, or `None` if it does not exist.
    #[must_use]
    pub fn len(&self, collection: &str) -> Option<usize> {
        self.read().get(collection).map(Vec::len)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("collections", &self.read().len())
            .finish()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut aa, mut bb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa == 0.0 || bb == 0.0 {
        0.0
    } else {
        dot / (aa.sqrt() * bb.sqrt())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.write().entry(collection.to_owned()).or_default();
        Box::pin(async { Ok(()) })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let exists = self.read().contains_key(collection);
        Box::pin(async move { Ok(exists) })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        self.write().remove(collection);
        Box::pin(async { Ok(()) })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let result = match self.write().get_mut(collection) {
            Some(stored) => {
                for point in points {
                    match stored.iter_mut().find(|p| p.id == point.id) {
                        Some(existing) => *existing = point,
                        None => stored.push(point),
                    }
                }
                Ok(())
            }
            None => Err(VectorStoreError::MissingCollection(collection.to_owned())),
        };
        Box::pin(async move { result })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let result = self
            .read()
            .get(collection)
            .map(|stored| {
                let mut hits: Vec<ScoredVectorPoint> = stored
                    .iter()
                    .map(|p| ScoredVectorPoint {
                        id: p.id.clone(),
                        score: cosine(&vector, &p.vector),
                        payload: p.payload.clone(),
                    })
                    .collect();
                hits.sort_by(|a, b| b.score.total_cmp(&a.score));
                hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                hits
            })
            .ok_or_else(|| VectorStoreError::MissingCollection(collection.to_owned()));
        Box::pin(async move { result })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        if let Some(stored) = self.write().get_mut(collection) {
            stored.retain(|p| !ids.contains(&p.id));
        }
        Box::pin(async { Ok(()) })
    }
}
