//! Hosted LLM rewrite backends.
//!
//! Both backends send the shared prompt as a single user message and return
//! the first text block of the reply. HTTP 408/425/429/5xx and transport
//! timeouts are transient; everything else, including rejected keys, is
//! permanent.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use reelsmith_common::config::RewriterConfig;
use reelsmith_common::error::{is_transient_status, RewriteError};

use crate::backend::{build_prompt, RewriteBackend, RewriteRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";

fn http_client(config: &RewriterConfig) -> Result<reqwest::Client, RewriteError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .build()
        .map_err(|e| RewriteError::permanent(format!("failed to build HTTP client: {e}")))
}

fn transport_error(provider: &str, err: reqwest::Error) -> RewriteError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RewriteError::transient(format!("{provider} request failed: {err}"))
    } else {
        RewriteError::permanent(format!("{provider} request failed: {err}"))
    }
}

fn status_error(provider: &str, status: u16, body: &str) -> RewriteError {
    let snippet: String = body.chars().take(300).collect();
    let message = format!("{provider} API returned HTTP {status}: {snippet}");
    if is_transient_status(status) {
        RewriteError::transient(message)
    } else {
        RewriteError::permanent(message)
    }
}

/// POST `body` as JSON and return the response text, mapping failures.
async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<String, RewriteError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    if !(200..300).contains(&status) {
        return Err(status_error(provider, status, &text));
    }
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
}

impl AnthropicBackend {
    pub fn new(config: &RewriterConfig, api_key: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            http: http_client(config)?,
            api_key: api_key.to_string(),
            model: config.anthropic_model.clone(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl RewriteBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": build_prompt(request) }],
        });

        tracing::info!(
            model = %self.model,
            target_words = request.target_word_count,
            "Sending rewrite request to Anthropic"
        );
        let builder = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let text = post_json("anthropic", builder, &body).await?;
        parse_anthropic(&text)
    }
}

fn parse_anthropic(body: &str) -> Result<String, RewriteError> {
    let response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| RewriteError::permanent(format!("invalid Anthropic response: {e}")))?;
    response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RewriteError::permanent("Anthropic response contained no text"))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI Chat Completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiBackend {
    pub fn new(config: &RewriterConfig, api_key: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            http: http_client(config)?,
            api_key: api_key.to_string(),
            model: config.openai_model.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl RewriteBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": build_prompt(request) }],
        });

        tracing::info!(
            model = %self.model,
            target_words = request.target_word_count,
            "Sending rewrite request to OpenAI"
        );
        let builder = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let text = post_json("openai", builder, &body).await?;
        parse_openai(&text)
    }
}

fn parse_openai(body: &str) -> Result<String, RewriteError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RewriteError::permanent(format!("invalid OpenAI response: {e}")))?;
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RewriteError::permanent("OpenAI response contained no text"))
}
