//! Anthropic Messages API provider.
//!
//! Used for intent analysis, planning, preference extraction and plain answers.
//! Structured prompts ask for short JSON replies, so the output budget defaults
//! low and callers raise it through `Context::max_tokens` when needed.

use async_trait::async_trait;
use belt_core::{
    context::Context,
    error::BeltError,
    message::{MessageMetadata, OutgoingMessage},
    traits::Provider,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create from config values.
    pub fn from_config(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("anthropic: falling back to default http client: {e}");
                reqwest::Client::new()
            });
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    model: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorBody,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

impl AnthropicResponse {
    /// Concatenated text blocks, ignoring tool use and other block types.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind.is_empty() || b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Render an error body as `type: message`, or the raw body when it is not
/// Anthropic's error envelope.
fn describe_error(body: &str) -> String {
    match serde_json::from_str::<AnthropicErrorEnvelope>(body) {
        Ok(env) => format!("{}: {}", env.error.kind, env.error.message),
        Err(_) => body.chars().take(300).collect(),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, BeltError> {
        let (system, api_messages) = context.to_api_messages();
        let effective_model = context.model.as_deref().unwrap_or(&self.model);
        let start = Instant::now();

        let body = AnthropicRequest {
            model: effective_model.to_string(),
            max_tokens: context.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: api_messages
                .into_iter()
                .map(|m| AnthropicMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
        };

        debug!("anthropic: POST {ANTHROPIC_API_URL} model={effective_model}");

        let resp = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| BeltError::Provider(format!("anthropic request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BeltError::Provider(format!(
                "anthropic returned {status}: {}",
                describe_error(&text)
            )));
        }

        let parsed: AnthropicResponse = resp.json().await.map_err(|e| {
            BeltError::Provider(format!("anthropic: failed to parse response: {e}"))
        })?;

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(BeltError::Provider(
                "anthropic: response contained no text".to_string(),
            ));
        }

        Ok(OutgoingMessage {
            text,
            metadata: MessageMetadata {
                provider_used: "anthropic".to_string(),
                tokens_used: parsed
                    .usage
                    .as_ref()
                    .map(|u| u.input_tokens + u.output_tokens),
                processing_time_ms: start.elapsed().as_millis() as u64,
                model: parsed.model,
            },
            reply_target: None,
        })
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            warn!("anthropic: no API key configured");
            return false;
        }
        true
    }
}
