//! Test-only mock LLM provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;

use crate::error::LlmError;
use crate::provider::{ChatStream, LlmProvider, Message};

const EMBEDDING_DIM: usize = 64;

#[derive(Debug, Clone)]
pub struct MockProvider {
    pub fragments: Vec<String>,
    /// Number of leading `chat_stream` calls rejected before streaming starts.
    pub fail_first: usize,
    /// Yield this many fragments, then an error item.
    pub fail_after: Option<usize>,
    pub supports_embeddings: bool,
    /// Milliseconds to sleep before each fragment.
    pub fragment_delay_ms: u64,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fragments: vec!["mock ".into(), "response".into()],
            fail_first: 0,
            fail_after: None,
            supports_embeddings: false,
            fragment_delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_first: usize::MAX,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    #[must_use]
    pub fn with_embeddings(mut self) -> Self {
        self.supports_embeddings = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.fragment_delay_ms = ms;
        self
    }

    /// Number of `chat`/`chat_stream` calls made so far, across clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages received by each call, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, messages: &[Message]) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(messages.to_vec());
        self.calls.fetch_add(1, Ordering::SeqCst)
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let call = self.record(messages);
        if call < self.fail_first {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        Ok(self.fragments.concat())
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        let call = self.record(messages);
        if call < self.fail_first {
            return Err(LlmError::Other("mock LLM error".into()));
        }

        let mut items: Vec<Result<String, LlmError>> = match self.fail_after {
            Some(n) => self.fragments.iter().take(n).cloned().map(Ok).collect(),
            None => self.fragments.iter().cloned().map(Ok).collect(),
        };
        if self.fail_after.is_some() {
            items.push(Err(LlmError::Stream {
                provider: "mock",
                message: "interrupted".into(),
            }));
        }

        let delay = Duration::from_millis(self.fragment_delay_ms);
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if !self.supports_embeddings {
            return Err(LlmError::EmbeddingsUnavailable { provider: "mock" });
        }
        Ok(bag_of_words(text))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

/// Deterministic embedding: lowercase words hashed (FNV-1a) into fixed buckets.
fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in word.to_lowercase().bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[expect(clippy::cast_possible_truncation)]
        let bucket = (hash % EMBEDDING_DIM as u64) as usize;
        v[bucket] += 1.0;
    }
    v
}
