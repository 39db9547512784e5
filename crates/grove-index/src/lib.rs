//! Repository corpus construction and relevance ranking.
//!
//! A repository tree is walked into a corpus of [`Document`]s, cached per repository,
//! and ranked against free-text queries by a [`Scorer`]: lexical TF-IDF with
//! title/phrase bonuses, or nearest-neighbour search over embeddings.

pub mod cache;
pub mod document;
pub mod error;
pub mod indexer;
pub(crate) mod languages;
pub mod repository;
pub mod rerank;
pub mod retriever;
pub mod scorer;

pub use cache::{CorpusCache, InMemoryCorpusCache, SqliteCorpusCache};
pub use document::{Document, DocumentMetadata, Importance};
pub use error::{IndexError, Result};
pub use indexer::{IndexReport, IndexerConfig};
pub use repository::{BuildJob, RepositoryIndex, repo_key};
pub use rerank::{extract_keywords, rerank_with_context};
pub use retriever::{RetrievalCandidate, RetrievalEngine};
pub use scorer::{LexicalScorer, Scorer, ScoringWeights, VectorScorer};

pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
