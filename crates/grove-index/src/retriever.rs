use std::sync::Arc;

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::scorer::Scorer;

/// A scored document, produced per query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalCandidate {
    pub document: Document,
    pub score: f64,
}

/// Top-K retrieval over a corpus through whichever [`Scorer`] was selected.
#[derive(Clone)]
pub struct RetrievalEngine {
    scorer: Arc<dyn Scorer>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("scorer", &self.scorer.name())
            .finish()
    }
}

impl RetrievalEngine {
    #[must_use]
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    #[must_use]
    pub fn scorer(&self) -> &Arc<dyn Scorer> {
        &self.scorer
    }

    /// Rank `corpus` against `query` and return at most `k` candidates, best first.
    ///
    /// Ties keep the order the scorer produced them in.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyCorpus`] if `corpus` is empty, or the scorer's error.
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        corpus: &[Document],
        k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        if corpus.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        let mut candidates = self.scorer.score(collection, query, corpus, k).await?;
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(k);
        tracing::debug!(
            repo = collection,
            scorer = self.scorer.name(),
            returned = candidates.len(),
            "retrieval done"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, Importance};
    use crate::scorer::LexicalScorer;

    fn engine() -> RetrievalEngine {
        RetrievalEngine::new(Arc::new(LexicalScorer::default()))
    }

    fn doc(title: &str, text: &str, importance: Importance) -> Document {
        Document::new(
            title,
            text,
            DocumentMetadata::new(title).with_importance(importance),
        )
    }

    #[tokio::test]
    async fn higher_relevance_ranks_first() {
        let corpus = vec![
            doc("util.go", "unrelated util", Importance::Medium),
            doc("auth.go", "auth handler", Importance::High),
        ];
        let hits = engine().retrieve("repo", "auth", &corpus, 10).await.unwrap();
        assert_eq!(hits[0].document.title(), "auth.go");
    }

    #[tokio::test]
    async fn empty_corpus_is_an_error() {
        let err = engine().retrieve("repo", "x", &[], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::EmptyCorpus));
    }

    #[tokio::test]
    async fn k_larger_than_corpus_returns_all_scored() {
        let corpus = vec![
            doc("a.md", "shared alpha", Importance::Normal),
            doc("b.md", "shared beta", Importance::Normal),
        ];
        let hits = engine().retrieve("repo", "shared", &corpus, 50).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn ties_preserve_scan_order() {
        let corpus = vec![
            doc("first.md", "same words", Importance::Normal),
            doc("second.md", "same words", Importance::Normal),
            doc("third.md", "same words", Importance::Normal),
        ];
        let hits = engine().retrieve("repo", "same words", &corpus, 3).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|c| c.document.title()).collect();
        assert_eq!(titles, vec!["first.md", "second.md", "third.md"]);
    }

    #[tokio::test]
    async fn retrieval_is_deterministic_and_leaves_corpus_untouched() {
        let corpus = vec![
            doc("a.rs", "parse config file", Importance::Medium),
            doc("b.rs", "config defaults", Importance::Normal),
            doc("README.md", "how to config", Importance::High),
        ];
        let snapshot = corpus.clone();
        let first = engine().retrieve("repo", "config", &corpus, 3).await.unwrap();
        let second = engine().retrieve("repo", "config", &corpus, 3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(corpus, snapshot);
    }
}
