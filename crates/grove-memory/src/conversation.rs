//! Append-only dialogue log with relevance-filtered recall.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogTurn {
    pub id: Uuid,
    pub user_query: String,
    pub assistant_response: String,
}

/// How many recent turns recall looks at and how similar a turn must be to count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    pub window: usize,
    pub threshold: f64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            window: 3,
            threshold: 0.3,
        }
    }
}

/// Overlap between two texts: `matches / (|A| + |B| - matches)` over the lowercased,
/// whitespace-separated word sets, counting only words longer than one character.
///
/// Always in `[0, 1]`; returns `0.0` when either side has no qualifying words.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let matches = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - matches;
    matches as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// Dialogue history for one session.
///
/// Turns are only ever appended; [`ConversationMemory::clear`] is the sole removal path.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: RwLock<Vec<DialogTurn>>,
    config: RecallConfig,
}

impl ConversationMemory {
    #[must_use]
    pub fn new(config: RecallConfig) -> Self {
        Self {
            turns: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Append a turn and return it.
    pub fn add_turn(
        &self,
        user_query: impl Into<String>,
        assistant_response: impl Into<String>,
    ) -> DialogTurn {
        let turn = DialogTurn {
            id: Uuid::new_v4(),
            user_query: user_query.into(),
            assistant_response: assistant_response.into(),
        };
        self.turns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turn.clone());
        turn
    }

    /// Snapshot of all turns in insertion order.
    #[must_use]
    pub fn turns(&self) -> Vec<DialogTurn> {
        self.turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.turns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Render the whole history for inclusion in a prompt.
    #[must_use]
    pub fn formatted_history(&self) -> String {
        let turns = self.turns.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for turn in turns.iter() {
            let _ = write!(
                out,
                "<turn>\n<user>{}</user>\n<assistant>{}</assistant>\n</turn>\n",
                turn.user_query, turn.assistant_response
            );
        }
        out
    }

    /// Turns from the recent window whose user query resembles `query`.
    ///
    /// Falls back to the whole window when nothing clears the threshold, so the result
    /// is empty only when the memory is.
    #[must_use]
    pub fn relevant_turns(&self, query: &str) -> Vec<DialogTurn> {
        let turns = self.turns.read().unwrap_or_else(PoisonError::into_inner);
        let start = turns.len().saturating_sub(self.config.window);
        let window = &turns[start..];

        let relevant: Vec<DialogTurn> = window
            .iter()
            .filter(|t| similarity(query, &t.user_query) > self.config.threshold)
            .cloned()
            .collect();

        if relevant.is_empty() {
            window.to_vec()
        } else {
            relevant
        }
    }

    /// Text of [`ConversationMemory::relevant_turns`], query then response, one turn
    /// per paragraph. No labels are added, so only words the conversation used appear.
    #[must_use]
    pub fn relevant_context(&self, query: &str) -> String {
        let mut out = String::new();
        for turn in self.relevant_turns(query) {
            let _ = write!(out, "{}\n{}\n\n", turn.user_query, turn.assistant_response);
        }
        out
    }
}

/// Per-session memories, created on first use.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<ConversationMemory>>>,
    config: RecallConfig,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: RecallConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Return the memory for `session_id`, creating an empty one if needed.
    pub fn get_or_create(&self, session_id: &str) -> Arc<ConversationMemory> {
        if let Some(memory) = self.get(session_id) {
            return memory;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(ConversationMemory::new(self.config))),
        )
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<ConversationMemory>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Drop a session. Returns `true` if it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
