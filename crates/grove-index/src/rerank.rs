//! Conversation-aware re-ranking of retrieval candidates.

use std::collections::HashSet;

use grove_memory::tokens::is_stopword;

use crate::retriever::RetrievalCandidate;
use crate::scorer::ScoringWeights;

const TRIM: &[char] = &[
    ',', '.', '!', '?', ';', ':', '"', '\'', '(', ')', '[', ']', '{', '}',
];

/// Keywords from prior-turn context: whitespace-split, punctuation-trimmed, lowercased,
/// longer than one character and not a stopword. First-seen order, no duplicates.
#[must_use]
pub fn extract_keywords(context: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    context
        .split_whitespace()
        .map(|w| w.trim_matches(TRIM).to_lowercase())
        .filter(|w| w.chars().count() > 1 && !is_stopword(w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Boost candidates that mention context keywords, then re-sort (stable, descending).
///
/// Never drops a candidate. An empty context leaves the input order and scores alone.
#[must_use]
pub fn rerank_with_context(
    mut candidates: Vec<RetrievalCandidate>,
    context: &str,
    weights: &ScoringWeights,
) -> Vec<RetrievalCandidate> {
    let keywords = extract_keywords(context);
    if keywords.is_empty() {
        return candidates;
    }

    for candidate in &mut candidates {
        let text = candidate.document.text().to_lowercase();
        let title = candidate.document.title().to_lowercase();
        let mut bonus = 0.0;
        for keyword in &keywords {
            if text.contains(keyword.as_str()) {
                bonus += weights.context_text;
            }
            if title.contains(keyword.as_str()) {
                bonus += weights.context_title;
            }
        }
        candidate.score += bonus * weights.importance_factor(candidate.document.importance());
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}
