use crate::claude::ClaudeProvider;
use crate::error::LlmError;
use crate::gemini::GeminiProvider;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{ChatStream, LlmProvider, Message};

/// Runs `$body` against whichever backend `$any` holds, bound as `$inner`.
macro_rules! each_backend {
    ($any:expr, $inner:ident => $body:expr) => {
        match $any {
            AnyProvider::OpenAi($inner) => $body,
            AnyProvider::Claude($inner) => $body,
            AnyProvider::Gemini($inner) => $body,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($inner) => $body,
        }
    };
}

/// The configured backend. [`LlmProvider`] uses `async fn`, so a closed enum
/// stands in for a trait object.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Claude(ClaudeProvider),
    Gemini(GeminiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl From<OpenAiProvider> for AnyProvider {
    fn from(inner: OpenAiProvider) -> Self {
        Self::OpenAi(inner)
    }
}

impl From<ClaudeProvider> for AnyProvider {
    fn from(inner: ClaudeProvider) -> Self {
        Self::Claude(inner)
    }
}

impl From<GeminiProvider> for AnyProvider {
    fn from(inner: GeminiProvider) -> Self {
        Self::Gemini(inner)
    }
}

#[cfg(feature = "mock")]
impl From<MockProvider> for AnyProvider {
    fn from(inner: MockProvider) -> Self {
        Self::Mock(inner)
    }
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        each_backend!(self, inner => inner.chat(messages).await)
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        tracing::debug!(backend = self.name(), messages = messages.len(), "opening stream");
        each_backend!(self, inner => inner.chat_stream(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        each_backend!(self, inner => inner.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        each_backend!(self, inner => inner.supports_embeddings())
    }

    fn name(&self) -> &str {
        each_backend!(self, inner => inner.name())
    }
}
