//! Client for an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Every attempt first waits on the shared [`RequestPacer`], then the whole
//! exchange runs under [`retry_with_backoff`].

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::AssistantError;
use crate::retry::{retry_with_backoff, RequestPacer};
use crate::types::AssistantConfig;

/// Longest error body kept in [`AssistantError::UnexpectedStatus`].
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generation settings for [`ChatModelClient`].
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub min_request_interval: Duration,
}

impl ModelSettings {
    #[must_use]
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            model: config.llm_model.clone(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
            max_retries: config.llm_max_retries,
            retry_backoff_base_ms: config.llm_retry_backoff_base_ms,
            min_request_interval: Duration::from_millis(config.llm_min_request_interval_ms),
        }
    }
}

/// Hosted text-generation client with retry and request pacing.
pub struct ChatModelClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    settings: ModelSettings,
    pacer: RequestPacer,
}

impl std::fmt::Debug for ChatModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModelClient")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ChatModelClient {
    /// Creates a client for the API rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        settings: ModelSettings,
    ) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("shopdb-assistant/0.1")
            .build()?;
        let pacer = RequestPacer::new(settings.min_request_interval);
        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            settings,
            pacer,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Requests a completion for `messages` and returns the first choice's text.
    ///
    /// # Errors
    ///
    /// - [`AssistantError::RateLimited`] or [`AssistantError::UnexpectedStatus`]
    ///   once retries are exhausted or for non-retriable statuses.
    /// - [`AssistantError::Http`] on network failure.
    /// - [`AssistantError::Deserialize`] if the body is not a completion.
    /// - [`AssistantError::EmptyCompletion`] if the model returned no text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let this = self;
        retry_with_backoff(
            self.settings.max_retries,
            self.settings.retry_backoff_base_ms,
            move || async move {
                this.pacer.wait().await;
                this.send_once(messages).await
            },
        )
        .await
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let body = CompletionRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);
            return Err(AssistantError::RateLimited {
                service: "llm",
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AssistantError::UnexpectedStatus {
                service: "llm",
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = response.bytes().await?;
        let parsed: CompletionResponse =
            serde_json::from_slice(&bytes).map_err(|e| AssistantError::Deserialize {
                context: format!("chat completion from {}", self.settings.model),
                source: e,
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AssistantError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::new(ChatRole::System, "rules");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "rules");
    }

    #[test]
    fn completion_url_joins_base() {
        let settings = ModelSettings {
            model: "m".into(),
            max_tokens: 1,
            temperature: 0.0,
            max_retries: 0,
            retry_backoff_base_ms: 0,
            min_request_interval: Duration::ZERO,
        };
        let client = ChatModelClient::new("http://llm/v1/", Some("k".into()), 5, settings).unwrap();
        assert_eq!(client.url, "http://llm/v1/chat/completions");
        assert!(!format!("{client:?}").contains("\"k\""));
    }
}
