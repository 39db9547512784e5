use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{ChatStream, GenerationParams, LlmProvider, Message, Role};
use crate::retry::RetryPolicy;
use crate::sse::{Dialect, GeminiResponse, into_chat_stream};

const PROVIDER: &str = "gemini";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    params: GenerationParams,
    embedding_model: Option<String>,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("params", &self.params)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        params: GenerationParams,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            params,
            embedding_model,
        }
    }

    fn generate_body<'a>(&self, messages: &'a [Message]) -> GenerateRequest<'a> {
        let system: Vec<Part<'a>> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part { text: &m.content })
            .collect();
        let contents = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::System => return None,
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Some(Content {
                    role: Some(role),
                    parts: vec![Part { text: &m.content }],
                })
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: (!system.is_empty()).then_some(Content {
                role: None,
                parts: system,
            }),
            generation_config: GenerationConfig {
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                top_k: self.params.top_k,
                max_output_tokens: self.params.max_tokens,
            },
        }
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<reqwest::Response, LlmError> {
        RetryPolicy::default()
            .send(PROVIDER, || {
                self.client
                    .post(url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(body)
                    .send()
            })
            .await
    }
}

impl LlmProvider for GeminiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self.post(&url, &self.generate_body(messages)).await?;
        let text = response.json::<GeminiResponse>().await?.into_text();
        if text.is_empty() {
            return Err(LlmError::NoContent { provider: PROVIDER });
        }
        Ok(text)
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let response = self.post(&url, &self.generate_body(messages)).await?;
        Ok(into_chat_stream(response, Dialect::Gemini))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbeddingsUnavailable { provider: PROVIDER })?;

        let url = format!("{}/models/{model}:embedContent", self.base_url);
        let body = EmbedRequest {
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };
        let response = self.post(&url, &body).await?;
        let resp: EmbedResponse = response.json().await?;
        Ok(resp.embedding.values)
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> GeminiProvider {
        GeminiProvider::new(
            "AIza-secret".into(),
            DEFAULT_BASE_URL.into(),
            "gemini-2.5-pro".into(),
            GenerationParams::default(),
            Some("text-embedding-004".into()),
        )
    }

    #[test]
    fn body_maps_roles_and_system_instruction() {
        let messages = vec![
            Message::system("sys"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let p = test_provider();
        let json = serde_json::to_value(p.generate_body(&messages)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn body_without_system_omits_instruction() {
        let messages = [Message::user("q")];
        let json = serde_json::to_value(test_provider().generate_body(&messages)).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn parse_embed_response() {
        let resp: EmbedResponse =
            serde_json::from_str(r#"{"embedding":{"values":[0.5,0.25]}}"#).unwrap();
        assert_eq!(resp.embedding.values, vec![0.5, 0.25]);
    }

    #[test]
    fn debug_redacts_api_key() {
        assert!(!format!("{:?}", test_provider()).contains("AIza-secret"));
    }

    #[test]
    fn name_is_gemini() {
        assert_eq!(test_provider().name(), "gemini");
        assert!(test_provider().supports_embeddings());
    }
}
