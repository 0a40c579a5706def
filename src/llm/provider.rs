//! Provider-agnostic call surface: `messages -> reply`. Concrete vendor
//! integrations are out of scope (see spec's provider Non-goal); this
//! module only defines the seam and a single generic OpenAI-chat-shaped
//! HTTP implementation, since every provider referenced by the pool
//! config document speaks that wire shape.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Internal role alphabet. Mapped to the wire roles `system|user|assistant|tool`
/// at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl Role {
    fn wire(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider returned a non-success status: {0}")]
    Status(String),
    #[error("provider response had no content")]
    EmptyResponse,
}

/// Hides vendor identity from graph nodes: selection, retry, and health
/// tracking happen one layer up in [`crate::llm::pool::Pool`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn call(&self, messages: &[Message]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// A generic OpenAI-chat-compatible HTTP endpoint: most providers named
/// in the pool config document (`openai`, `azure`, self-hosted gateways)
/// speak this shape or a thin variant of it.
pub struct HttpChatProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl HttpChatProvider {
    pub fn new(api_base: String, api_key: Option<String>, model: String, temperature: f32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base,
            api_key,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    async fn call(&self, messages: &[Message]) -> Result<String, LlmError> {
        let wire_messages: Vec<WireMessage> = messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.wire(),
                content: &m.content,
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages: wire_messages,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&json!(body));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().to_string()));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_mapping() {
        assert_eq!(Role::System.wire(), "system");
        assert_eq!(Role::Human.wire(), "user");
        assert_eq!(Role::Assistant.wire(), "assistant");
        assert_eq!(Role::Tool.wire(), "tool");
    }

    #[tokio::test]
    async fn http_chat_provider_parses_reply() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let provider = HttpChatProvider::new(server.uri(), None, "test-model".to_string(), 0.7, Duration::from_secs(5));
        let reply = provider.call(&[Message::human("hi")]).await.unwrap();
        assert_eq!(reply, "hello");
    }
}
