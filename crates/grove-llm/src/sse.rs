//! Server-sent event decoding for the three streaming wire formats.

use eventsource_stream::Eventsource;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::error::LlmError;
use crate::provider::ChatStream;

/// Streaming wire format spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Claude,
    OpenAi,
    Gemini,
}

impl Dialect {
    fn provider(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Text carried by one event payload. `Ok(None)` for keep-alives, role
    /// announcements and other events without text.
    fn decode(self, data: &str) -> Result<Option<String>, String> {
        match self {
            Self::Claude => decode_claude(data),
            Self::OpenAi => decode_openai(data),
            Self::Gemini => decode_gemini(data),
        }
    }
}

/// Turn a streaming HTTP response into answer fragments.
pub(crate) fn into_chat_stream(response: reqwest::Response, dialect: Dialect) -> ChatStream {
    let provider = dialect.provider();
    let fragments = response
        .bytes_stream()
        .eventsource()
        .filter_map(move |event| {
            let decoded = match event {
                Ok(event) => dialect.decode(&event.data),
                Err(e) => Err(e.to_string()),
            };
            decoded
                .map_err(|message| LlmError::Stream { provider, message })
                .transpose()
        });
    Box::pin(fragments)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeEvent {
    ContentBlockDelta { delta: ClaudeDelta },
    Error { error: ClaudeFailure },
    #[serde(other)]
    Ignored,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeDelta {
    TextDelta { text: String },
    #[serde(other)]
    Ignored,
}

#[derive(Deserialize)]
struct ClaudeFailure {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn decode_claude(data: &str) -> Result<Option<String>, String> {
    let event: ClaudeEvent =
        serde_json::from_str(data).map_err(|e| format!("unreadable event: {e}"))?;
    match event {
        ClaudeEvent::ContentBlockDelta {
            delta: ClaudeDelta::TextDelta { text },
        } => Ok(non_empty(text)),
        ClaudeEvent::Error { error } => Err(format!("{}: {}", error.kind, error.message)),
        ClaudeEvent::ContentBlockDelta { .. } | ClaudeEvent::Ignored => Ok(None),
    }
}

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    delta: OpenAiDelta,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

fn decode_openai(data: &str) -> Result<Option<String>, String> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }
    let chunk: OpenAiChunk =
        serde_json::from_str(data).map_err(|e| format!("unreadable chunk: {e}"))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .and_then(non_empty))
}

/// Body of both `generateContent` and each `streamGenerateContent` event.
#[derive(Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<GeminiFailure>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    pub(crate) fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiFailure {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn decode_gemini(data: &str) -> Result<Option<String>, String> {
    let mut response: GeminiResponse =
        serde_json::from_str(data).map_err(|e| format!("unreadable chunk: {e}"))?;
    if let Some(failure) = response.error.take() {
        return Err(format!("error {}: {}", failure.code, failure.message));
    }
    Ok(non_empty(response.into_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(Dialect::Claude.decode(data).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn claude_skips_bookkeeping_events() {
        for data in [
            r#"{"type":"message_start","message":{"id":"m"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":""}}"#,
        ] {
            assert_eq!(Dialect::Claude.decode(data).unwrap(), None, "{data}");
        }
    }

    #[test]
    fn claude_error_event() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let message = Dialect::Claude.decode(data).unwrap_err();
        assert_eq!(message, "overloaded_error: Overloaded");
    }

    #[test]
    fn openai_content_and_done() {
        let data = r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#;
        assert_eq!(Dialect::OpenAi.decode(data).unwrap().as_deref(), Some("hi"));
        assert_eq!(Dialect::OpenAi.decode("[DONE]").unwrap(), None);
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(Dialect::OpenAi.decode(role_only).unwrap(), None);
    }

    #[test]
    fn openai_garbage_is_an_error() {
        let message = Dialect::OpenAi.decode("not json").unwrap_err();
        assert!(message.starts_with("unreadable chunk"));
    }

    #[test]
    fn gemini_joins_parts() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"foo "},{"text":"bar"}]}}]}"#;
        assert_eq!(Dialect::Gemini.decode(data).unwrap().as_deref(), Some("foo bar"));
    }

    #[test]
    fn gemini_finish_chunk_has_no_text() {
        let data = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{}}"#;
        assert_eq!(Dialect::Gemini.decode(data).unwrap(), None);
    }

    #[test]
    fn gemini_error_payload() {
        let data = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(Dialect::Gemini.decode(data).unwrap_err(), "error 429: quota");
    }
}
