//! Language model client.
//!
//! The model is a text-in/text-out capability behind [`LanguageModel`]. The
//! response envelope is kept untyped in [`RawResponse`]; [`extract_text`] is
//! the only code that knows its shape, so the rest of the pipeline stays
//! independent of which inference service is configured.
//!
//! # Providers
//!
//! - **`openai`**: `POST {url}/v1/chat/completions` (any compatible gateway).
//! - **`anthropic`**: `POST {url}/v1/messages`.
//! - **`disabled`**: every call fails; answers degrade to an apology.
//!
//! No retries are performed. A failed call is surfaced to the caller, which
//! decides how to degrade.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Result, ScoutError};

/// One message of a model conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The untyped response envelope returned by a model call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse(pub Value);

/// A text generation service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<RawResponse>;
}

/// Pull plain text out of a response envelope.
///
/// Understands the chat-completions shape (`choices[0].message.content`) and
/// the messages shape (`content[*].text` for `type == "text"` blocks). Returns
/// `None` when no non-blank text is present.
pub fn extract_text(response: &RawResponse) -> Option<String> {
    let json = &response.0;

    if let Some(content) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        return non_blank(content.to_string());
    }

    if let Some(blocks) = json.get("content").and_then(|c| c.as_array()) {
        let text: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        return non_blank(text.join(""));
    }

    None
}

fn non_blank(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============ Disabled ============

/// Used when `llm.provider = "disabled"`; every call fails.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _messages: &[ChatMessage], _max_tokens: u32) -> Result<RawResponse> {
        Err(ScoutError::Upstream(
            "language model provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP providers ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    Anthropic,
}

/// A model reached over HTTP.
pub struct HttpLanguageModel {
    http: reqwest::Client,
    flavor: Flavor,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpLanguageModel {
    fn new(config: &LlmConfig, flavor: Flavor) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| ScoutError::Config("llm.model required".to_string()))?;

        let key_env = config.key_env();
        let api_key = std::env::var(&key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ScoutError::MissingCredential(key_env))?;

        let base = match (&config.url, flavor) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Flavor::OpenAi) => "https://api.openai.com".to_string(),
            (None, Flavor::Anthropic) => "https://api.anthropic.com".to_string(),
        };
        let endpoint = match flavor {
            Flavor::OpenAi => format!("{}/v1/chat/completions", base),
            Flavor::Anthropic => format!("{}/v1/messages", base),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            flavor,
            endpoint,
            model,
            api_key,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], max_tokens: u32) -> Value {
        match self.flavor {
            Flavor::OpenAi => serde_json::json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": max_tokens,
            }),
            Flavor::Anthropic => {
                // System prompts travel outside the message list.
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == "system")
                    .map(|m| m.content.as_str())
                    .collect();
                let turns: Vec<&ChatMessage> =
                    messages.iter().filter(|m| m.role != "system").collect();
                let mut body = serde_json::json!({
                    "model": self.model,
                    "messages": turns,
                    "max_tokens": max_tokens,
                });
                if !system.is_empty() {
                    body["system"] = Value::String(system.join("\n\n"));
                }
                body
            }
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<RawResponse> {
        let body = self.request_body(messages, max_tokens);
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);

        request = match self.flavor {
            Flavor::OpenAi => request.header("Authorization", format!("Bearer {}", self.api_key)),
            Flavor::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ScoutError::Upstream(format!(
                "model API error {}: {}",
                status,
                body_text.chars().take(200).collect::<String>()
            )));
        }

        Ok(RawResponse(response.json::<Value>().await?))
    }
}

/// Instantiate the model named by the configuration.
///
/// # Errors
///
/// Fails if the provider is unknown, `llm.model` is missing, or the API key
/// variable is unset.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(HttpLanguageModel::new(config, Flavor::OpenAi)?)),
        "anthropic" => Ok(Box::new(HttpLanguageModel::new(config, Flavor::Anthropic)?)),
        other => Err(ScoutError::Config(format!(
            "Unknown llm provider: {}",
            other
        ))),
    }
}
