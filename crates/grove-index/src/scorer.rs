//! Query scoring: lexical TF-IDF or nearest-neighbour over embeddings.
//!
//! One [`Scorer`] is picked at startup depending on whether an embedding backend is
//! configured. Ranking code never branches on the mode.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use grove_llm::any::AnyProvider;
use grove_llm::provider::LlmProvider;
use grove_memory::tokens::{tokenize, words};
use grove_memory::{VectorPoint, VectorStore};
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::document::{Document, Importance, point_id};
use crate::error::{IndexError, Result};
use crate::retriever::RetrievalCandidate;

/// Tunable constants for lexical scoring and context re-ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Multiplier on `occurrences(term, title) / len(title)`.
    pub title: f64,
    /// Flat bonus when the whole query appears in the text.
    pub text_phrase: f64,
    /// Flat bonus when the whole query appears in the title.
    pub title_phrase: f64,
    pub high: f64,
    pub medium: f64,
    /// Re-rank bonus per context keyword found in the text.
    pub context_text: f64,
    /// Re-rank bonus per context keyword found in the title.
    pub context_title: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            title: 2.0,
            text_phrase: 5.0,
            title_phrase: 10.0,
            high: 1.5,
            medium: 1.2,
            context_text: 1.0,
            context_title: 2.0,
        }
    }
}

impl ScoringWeights {
    #[must_use]
    pub fn importance_factor(&self, importance: Importance) -> f64 {
        match importance {
            Importance::High => self.high,
            Importance::Medium => self.medium,
            Importance::Normal => 1.0,
        }
    }
}

/// Ranks a corpus against a query.
///
/// `collection` names the corpus (a repository key); scorers that keep an external index
/// use it to find theirs.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether an index for `collection` already exists and [`Scorer::prepare`] can be skipped.
    fn is_prepared<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Build or refresh whatever index the scorer needs for `corpus`.
    fn prepare<'a>(
        &'a self,
        collection: &'a str,
        corpus: &'a [Document],
    ) -> BoxFuture<'a, Result<()>>;

    /// Drop entries for the given document ids.
    fn remove<'a>(&'a self, collection: &'a str, ids: &'a [String]) -> BoxFuture<'a, Result<()>>;

    fn drop_index<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Up to `limit` scored candidates, in no particular order.
    fn score<'a>(
        &'a self,
        collection: &'a str,
        query: &'a str,
        corpus: &'a [Document],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalCandidate>>>;
}

/// TF-IDF with title and phrase bonuses, computed on the fly from the corpus.
#[derive(Debug, Clone, Default)]
pub struct LexicalScorer {
    weights: ScoringWeights,
}

struct TermCounts {
    text: HashMap<String, usize>,
    title: HashMap<String, usize>,
}

fn count_words(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for word in words(text) {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

impl LexicalScorer {
    #[must_use]
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score every document in `corpus`, keeping scan order and dropping scores `<= 0`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn score_corpus(&self, query: &str, corpus: &[Document]) -> Vec<RetrievalCandidate> {
        let counts: Vec<TermCounts> = corpus
            .iter()
            .map(|doc| TermCounts {
                text: count_words(doc.text()),
                title: count_words(doc.title()),
            })
            .collect();

        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .filter(|t| {
                counts
                    .iter()
                    .any(|c| c.text.contains_key(t) || c.title.contains_key(t))
            })
            .collect();

        let total = corpus.len() as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|t| {
                let df = counts.iter().filter(|c| c.text.contains_key(t)).count();
                if df == 0 {
                    0.0
                } else {
                    (total / df as f64).ln()
                }
            })
            .collect();

        let phrase = query.trim().to_lowercase();

        corpus
            .iter()
            .zip(&counts)
            .filter_map(|(doc, c)| {
                let text_len = doc.text().chars().count() as f64;
                let title_len = doc.title().chars().count() as f64;
                let mut score = 0.0;

                for (term, idf) in terms.iter().zip(&idf) {
                    if text_len > 0.0 {
                        let tf = *c.text.get(term).unwrap_or(&0) as f64 / text_len;
                        score += tf * idf;
                    }
                    if title_len > 0.0 {
                        let in_title = *c.title.get(term).unwrap_or(&0) as f64;
                        score += self.weights.title * in_title / title_len;
                    }
                }

                if !phrase.is_empty() {
                    if doc.text().to_lowercase().contains(&phrase) {
                        score += self.weights.text_phrase;
                    }
                    if doc.title().to_lowercase().contains(&phrase) {
                        score += self.weights.title_phrase;
                    }
                }

                score *= self.weights.importance_factor(doc.importance());
                (score > 0.0).then(|| RetrievalCandidate {
                    document: doc.clone(),
                    score,
                })
            })
            .collect()
    }
}

impl Scorer for LexicalScorer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn is_prepared<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn prepare<'a>(
        &'a self,
        _collection: &'a str,
        _corpus: &'a [Document],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, _collection: &'a str, _ids: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn drop_index<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn score<'a>(
        &'a self,
        _collection: &'a str,
        query: &'a str,
        corpus: &'a [Document],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalCandidate>>> {
        Box::pin(async move {
            let mut scored = self.score_corpus(query, corpus);
            if scored.len() > limit {
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));
                scored.truncate(limit);
            }
            Ok(scored)
        })
    }
}

/// Embeds documents into a [`VectorStore`] and ranks by similarity to the query embedding.
pub struct VectorScorer {
    provider: Arc<AnyProvider>,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for VectorScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorScorer")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

/// Vector collection name for a repository key.
#[must_use]
pub fn collection_name(repo_key: &str) -> String {
    let hash = blake3::hash(repo_key.as_bytes());
    format!("grove_{}", &hash.to_hex()[..16])
}

fn embedding_input(doc: &Document) -> String {
    format!("{}\n{}", doc.title(), doc.text())
}

impl VectorScorer {
    #[must_use]
    pub fn new(provider: Arc<AnyProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { provider, store }
    }

    async fn embed_document(&self, doc: &Document) -> Result<Vec<f32>> {
        if let Some(existing) = doc.embedding() {
            return Ok(existing.to_vec());
        }
        Ok(self.provider.embed(&embedding_input(doc)).await?)
    }

    fn to_point(doc: &Document, vector: Vec<f32>) -> Result<VectorPoint> {
        let document = serde_json::to_string(&doc.without_embedding())?;
        Ok(VectorPoint {
            id: point_id(doc.id()),
            vector,
            payload: HashMap::from([
                ("doc_id".to_owned(), serde_json::Value::from(doc.id())),
                ("document".to_owned(), serde_json::Value::from(document)),
            ]),
        })
    }
}

impl Scorer for VectorScorer {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn is_prepared<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            Ok(self
                .store
                .collection_exists(&collection_name(collection))
                .await?)
        })
    }

    fn prepare<'a>(
        &'a self,
        collection: &'a str,
        corpus: &'a [Document],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if corpus.is_empty() {
                return Ok(());
            }
            let name = collection_name(collection);
            let mut points = Vec::with_capacity(corpus.len());
            for doc in corpus {
                let vector = self.embed_document(doc).await?;
                points.push(Self::to_point(doc, vector)?);
            }
            let size = points.first().map_or(0, |p| p.vector.len());
            let size = u64::try_from(size).map_err(|e| IndexError::Other(e.to_string()))?;
            self.store.ensure_collection(&name, size).await?;
            let count = points.len();
            self.store.upsert(&name, points).await?;
            tracing::info!(repo = collection, count, "embedded corpus into vector index");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, collection: &'a str, ids: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let point_ids = ids.iter().map(|id| point_id(id)).collect();
            self.store
                .delete_by_ids(&collection_name(collection), point_ids)
                .await?;
            Ok(())
        })
    }

    fn drop_index<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let name = collection_name(collection);
            if self.store.collection_exists(&name).await? {
                self.store.delete_collection(&name).await?;
            }
            Ok(())
        })
    }

    fn score<'a>(
        &'a self,
        collection: &'a str,
        query: &'a str,
        _corpus: &'a [Document],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalCandidate>>> {
        Box::pin(async move {
            let vector = self.provider.embed(query).await?;
            let limit = u64::try_from(limit).unwrap_or(u64::MAX);
            let hits = self
                .store
                .search(&collection_name(collection), vector, limit)
                .await?;

            let mut candidates = Vec::with_capacity(hits.len());
            for hit in hits {
                let Some(raw) = hit.payload.get("document").and_then(|v| v.as_str()) else {
                    tracing::warn!(id = %hit.id, "vector hit without document payload");
                    continue;
                };
                let document: Document = serde_json::from_str(raw)?;
                candidates.push(RetrievalCandidate {
                    document,
                    score: f64::from(hit.score),
                });
            }
            Ok(candidates)
        })
    }
}
