use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{ChatStream, GenerationParams, LlmProvider, Message, Role};
use crate::retry::RetryPolicy;
use crate::sse::{Dialect, into_chat_stream};

const PROVIDER: &str = "claude";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API. Has no embedding endpoint.
#[derive(Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ClaudeProvider {
    #[must_use]
    pub fn new(api_key: String, model: String, params: GenerationParams) -> Self {
        Self {
            client: crate::http::default_client(),
            api_key,
            url: MESSAGES_URL.to_owned(),
            model,
            params,
            retry: RetryPolicy::default(),
        }
    }

    /// Send requests to another messages endpoint, such as a proxy.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn body<'a>(&'a self, messages: &'a [Message], stream: bool) -> MessagesBody<'a> {
        let mut system = Vec::new();
        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            match message.role {
                Role::System => system.push(message.content.as_str()),
                Role::User => turns.push(Turn {
                    role: "user",
                    content: &message.content,
                }),
                Role::Assistant => turns.push(Turn {
                    role: "assistant",
                    content: &message.content,
                }),
            }
        }

        MessagesBody {
            model: &self.model,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            top_k: self.params.top_k,
            stream,
        }
    }

    async fn send(&self, body: &MessagesBody<'_>) -> Result<reqwest::Response, LlmError> {
        self.retry
            .send(PROVIDER, || {
                self.client
                    .post(&self.url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(body)
                    .send()
            })
            .await
    }
}

impl LlmProvider for ClaudeProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let response = self.send(&self.body(messages, false)).await?;
        let reply: Reply = response.json().await?;
        let text: String = reply
            .content
            .into_iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text),
                Block::Other => None,
            })
            .collect();
        if text.is_empty() {
            return Err(LlmError::NoContent { provider: PROVIDER });
        }
        Ok(text)
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        let response = self.send(&self.body(messages, true)).await?;
        Ok(into_chat_stream(response, Dialect::Claude))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::EmbeddingsUnavailable { provider: PROVIDER })
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Turn<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    content: Vec<Block>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ClaudeProvider {
        ClaudeProvider::new(
            "sk-ant-secret".into(),
            "claude-sonnet-4-5".into(),
            GenerationParams::default(),
        )
    }

    #[test]
    fn system_messages_move_to_top_level() {
        let messages = [
            Message::system("be brief"),
            Message::user("hi"),
            Message::system("cite files"),
            Message::assistant("hello"),
        ];
        let json = serde_json::to_value(provider().body(&messages, true)).unwrap();
        assert_eq!(json["system"], "be brief\n\ncite files");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["top_k"], 40);
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn body_without_system_prompt() {
        let json = serde_json::to_value(provider().body(&[Message::user("q")], false)).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn reply_keeps_only_text_blocks() {
        let reply: Reply = serde_json::from_str(
            r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"answer"}]}"#,
        )
        .unwrap();
        assert!(matches!(&reply.content[1], Block::Text { text } if text == "answer"));
        assert!(matches!(reply.content[0], Block::Other));
    }

    #[test]
    fn debug_hides_api_key() {
        assert!(!format!("{:?}", provider()).contains("sk-ant-secret"));
    }

    #[tokio::test]
    async fn embeddings_are_unavailable() {
        let p = provider();
        assert!(!p.supports_embeddings());
        assert!(matches!(
            p.embed("x").await,
            Err(LlmError::EmbeddingsUnavailable { provider: "claude" })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let p = provider().with_api_url("http://127.0.0.1:1/v1/messages");
        assert!(p.chat_stream(&[Message::user("hi")]).await.is_err());
    }
}
