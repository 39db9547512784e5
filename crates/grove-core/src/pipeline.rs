//! Cancellable streaming generation with a single reduced-prompt retry.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use grove_llm::Message;
use grove_memory::ConversationMemory;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::RagError;
use crate::provider::{Generator, RagProvider, require_generator};

/// One item of a response stream. An `Error`, if any, is always the last item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Error(String),
}

/// Fragments of one generation, in order.
///
/// Cancelling (or dropping) the stream stops generation; fragments not yet polled are
/// discarded.
pub struct ResponseStream {
    rx: mpsc::Receiver<Fragment>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ResponseStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for ResponseStream {
    type Item = Fragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Fragment>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            this.rx.close();
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

/// What to send, what to fall back to, and where to record the finished answer.
#[derive(Debug)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub reduced: Vec<Message>,
    /// Session memory and the user query to append as a turn on clean completion.
    pub record: Option<(Arc<ConversationMemory>, String)>,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationPipeline {
    start_timeout: Duration,
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

enum Attempt {
    Completed(String),
    Cancelled,
    /// Nothing was forwarded, so a retry cannot duplicate text.
    FailedBeforeOutput(String),
    FailedMidStream(String),
}

impl GenerationPipeline {
    /// `start_timeout` bounds how long the backend may take to start streaming.
    #[must_use]
    pub fn new(start_timeout: Duration) -> Self {
        Self { start_timeout }
    }

    /// Spawn the generation task and return its fragment stream.
    ///
    /// `cancel` is the caller's lifetime: cancelling it (or dropping the returned stream)
    /// stops the task.
    #[must_use]
    pub fn start(
        &self,
        provider: Arc<dyn RagProvider>,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> ResponseStream {
        let token = cancel.child_token();
        let (tx, rx) = mpsc::channel(1);
        let task_token = token.clone();
        let start_timeout = self.start_timeout;

        tokio::spawn(async move {
            run(provider.as_ref(), request, &tx, &task_token, start_timeout).await;
        });

        ResponseStream {
            rx,
            cancel: token.clone(),
            _guard: token.drop_guard(),
        }
    }
}

async fn run(
    provider: &dyn RagProvider,
    request: GenerationRequest,
    tx: &mpsc::Sender<Fragment>,
    cancel: &CancellationToken,
    start_timeout: Duration,
) {
    let generator = match require_generator(provider) {
        Ok(g) => g,
        Err(e) => {
            send(tx, cancel, Fragment::Error(e.to_string())).await;
            return;
        }
    };

    let outcome = match attempt(generator, &request.messages, tx, cancel, start_timeout).await {
        Attempt::FailedBeforeOutput(e) => {
            tracing::warn!(
                provider = provider.name(),
                error = %e,
                "generation failed, retrying with reduced prompt"
            );
            attempt(generator, &request.reduced, tx, cancel, start_timeout).await
        }
        other => other,
    };

    match outcome {
        Attempt::Completed(answer) => {
            if let Some((memory, query)) = request.record {
                memory.add_turn(query, answer);
            }
        }
        Attempt::Cancelled => {
            tracing::debug!(provider = provider.name(), "generation cancelled");
        }
        Attempt::FailedBeforeOutput(e) | Attempt::FailedMidStream(e) => {
            tracing::error!(provider = provider.name(), error = %e, "generation failed");
            send(tx, cancel, Fragment::Error(e)).await;
        }
    }
}

/// Returns `false` once the consumer is gone.
async fn send(tx: &mpsc::Sender<Fragment>, cancel: &CancellationToken, fragment: Fragment) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(fragment) => sent.is_ok(),
    }
}

async fn attempt(
    generator: &dyn Generator,
    messages: &[Message],
    tx: &mpsc::Sender<Fragment>,
    cancel: &CancellationToken,
    start_timeout: Duration,
) -> Attempt {
    let started = tokio::select! {
        biased;
        () = cancel.cancelled() => return Attempt::Cancelled,
        r = tokio::time::timeout(start_timeout, generator.generate_stream(messages)) => r,
    };
    let mut stream = match started {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Attempt::FailedBeforeOutput(e.to_string()),
        Err(_) => {
            let e = RagError::Timeout {
                operation: "generation",
                seconds: start_timeout.as_secs(),
            };
            return Attempt::FailedBeforeOutput(e.to_string());
        }
    };

    let mut answer = String::new();
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return Attempt::Cancelled,
            item = stream.next() => item,
        };
        match item {
            None => return Attempt::Completed(answer),
            Some(Ok(text)) if text.is_empty() => {}
            Some(Ok(text)) => {
                answer.push_str(&text);
                if !send(tx, cancel, Fragment::Text(text)).await {
                    return Attempt::Cancelled;
                }
            }
            Some(Err(e)) if answer.is_empty() => {
                return Attempt::FailedBeforeOutput(e.to_string());
            }
            Some(Err(e)) => return Attempt::FailedMidStream(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use grove_llm::mock::MockProvider;
    use grove_llm::{ChatStream, LlmProvider};

    use super::*;
    use crate::error::Result;
    use crate::provider::{BoxFuture, Lifecycle};

    struct MockGenerator(MockProvider);

    impl Lifecycle for MockGenerator {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn initialize(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    impl Generator for MockGenerator {
        fn generate_stream<'a>(&'a self, messages: &'a [Message]) -> BoxFuture<'a, Result<ChatStream>> {
            Box::pin(async move { Ok(self.0.chat_stream(messages).await?) })
        }
    }

    impl RagProvider for MockGenerator {
        fn generator(&self) -> Option<&dyn Generator> {
            Some(self)
        }
    }

    fn request(record: Option<Arc<ConversationMemory>>) -> GenerationRequest {
        GenerationRequest {
            messages: vec![Message::user("full prompt")],
            reduced: vec![Message::user("reduced prompt")],
            record: record.map(|m| (m, "the question".to_owned())),
        }
    }

    fn start(mock: MockProvider, record: Option<Arc<ConversationMemory>>) -> ResponseStream {
        GenerationPipeline::default().start(
            Arc::new(MockGenerator(mock)),
            request(record),
            &CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn clean_stream_is_forwarded_and_recorded() {
        let memory = Arc::new(ConversationMemory::default());
        let stream = start(
            MockProvider::with_fragments(["Hel", "lo"]),
            Some(Arc::clone(&memory)),
        );
        let fragments: Vec<Fragment> = stream.collect().await;
        assert_eq!(
            fragments,
            vec![Fragment::Text("Hel".into()), Fragment::Text("lo".into())]
        );

        tokio::task::yield_now().await;
        let turns = memory.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_query, "the question");
        assert_eq!(turns[0].assistant_response, "Hello");
    }

    #[tokio::test]
    async fn cancel_after_two_fragments_yields_exactly_two() {
        let mock = MockProvider::with_fragments(["1", "2", "3", "4", "5"]).with_delay(5);
        let memory = Arc::new(ConversationMemory::default());
        let mut stream = start(mock, Some(Arc::clone(&memory)));

        let mut seen = Vec::new();
        while let Some(fragment) = stream.next().await {
            seen.push(fragment);
            if seen.len() == 2 {
                stream.cancel();
            }
        }
        assert_eq!(
            seen,
            vec![Fragment::Text("1".into()), Fragment::Text("2".into())]
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn caller_token_cancels_stream() {
        let caller = CancellationToken::new();
        let mock = MockProvider::with_fragments(["a", "b", "c"]).with_delay(5);
        let mut stream = GenerationPipeline::default().start(
            Arc::new(MockGenerator(mock)),
            request(None),
            &caller,
        );
        assert_eq!(stream.next().await, Some(Fragment::Text("a".into())));
        caller.cancel();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropping_stream_stops_generation() {
        let memory = Arc::new(ConversationMemory::default());
        let mock = MockProvider::with_fragments(["a", "b", "c"]).with_delay(10);
        let stream = start(mock, Some(Arc::clone(&memory)));
        let token = stream.cancellation_token();
        drop(stream);
        assert!(token.is_cancelled());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn failure_before_output_retries_once_with_reduced_prompt() {
        let mock = MockProvider::with_fragments(["ok"]).fail_first(1);
        let calls = mock.clone();
        let fragments: Vec<Fragment> = start(mock, None).collect().await;

        assert_eq!(fragments, vec![Fragment::Text("ok".into())]);
        assert_eq!(calls.call_count(), 2);
        let requests = calls.requests();
        assert_eq!(requests[0][0].content, "full prompt");
        assert_eq!(requests[1][0].content, "reduced prompt");
    }

    #[tokio::test]
    async fn double_failure_ends_with_one_error() {
        let mock = MockProvider::failing();
        let calls = mock.clone();
        let fragments: Vec<Fragment> = start(mock, None).collect().await;

        assert_eq!(fragments.len(), 1);
        assert!(matches!(fragments[0], Fragment::Error(_)));
        assert_eq!(calls.call_count(), 2);
    }

    #[tokio::test]
    async fn mid_stream_failure_is_not_retried() {
        let memory = Arc::new(ConversationMemory::default());
        let mock = MockProvider::with_fragments(["a", "b", "c"]).fail_after(2);
        let calls = mock.clone();
        let fragments: Vec<Fragment> = start(mock, Some(Arc::clone(&memory))).collect().await;

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], Fragment::Text("a".into()));
        assert_eq!(fragments[1], Fragment::Text("b".into()));
        assert!(matches!(fragments[2], Fragment::Error(_)));
        assert_eq!(calls.call_count(), 1);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn error_on_first_item_is_retried() {
        let mock = MockProvider::with_fragments(["x"]).fail_after(0);
        let calls = mock.clone();
        let fragments: Vec<Fragment> = start(mock, None).collect().await;
        assert_eq!(calls.call_count(), 2);
        assert_eq!(fragments.len(), 1);
        assert!(matches!(fragments[0], Fragment::Error(_)));
    }

    struct NoGenerator;

    impl Lifecycle for NoGenerator {
        fn name(&self) -> &'static str {
            "retrieval-only"
        }

        fn initialize(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    impl RagProvider for NoGenerator {}

    #[tokio::test]
    async fn provider_without_generator_reports_unsupported() {
        let fragments: Vec<Fragment> = GenerationPipeline::default()
            .start(Arc::new(NoGenerator), request(None), &CancellationToken::new())
            .collect()
            .await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Fragment::Error(e) if e.contains("does not support")));
    }
}
