use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tarla_core::config::{LlmConfig, LlmProvider};

const CONFIDENCE_PREFIX: &str = "confidence:";

/// Generated text plus the model's self-reported confidence, when it gave one.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub confidence: Option<f64>,
}

impl Completion {
    pub fn new(text: impl Into<String>, confidence: Option<f64>) -> Self {
        Self { text: text.into(), confidence }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

/// Strips a trailing `CONFIDENCE: <0..1>` line from raw model output. Values that
/// do not parse or fall outside `[0, 1]` are dropped, leaving the scorer default.
pub fn split_self_reported_confidence(raw: &str) -> Completion {
    let trimmed = raw.trim_end();
    let (body, last_line) = match trimmed.rfind('\n') {
        Some(index) => (&trimmed[..index], &trimmed[index + 1..]),
        None => ("", trimmed),
    };

    let lowered = last_line.trim().to_ascii_lowercase();
    let Some(value) = lowered.strip_prefix(CONFIDENCE_PREFIX) else {
        return Completion::new(trimmed, None);
    };

    let confidence = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && (0.0..=1.0).contains(value));
    Completion::new(body.trim_end(), confidence)
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into(), model: model.into() }
    }
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": &self.model,
                "prompt": prompt,
                "stream": false,
                "options": {"temperature": 0.2}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {status}: {body}"));
        }

        let body: OllamaGenerateResponse = response.json().await?;
        Ok(split_self_reported_confidence(&body.response))
    }
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key, model: model.into() }
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": &self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.2
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {status}: {body}"));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI returned no choices"))?;
        Ok(split_self_reported_confidence(&content))
    }
}

/// Always fails, so every turn answers from rule templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<Completion> {
        Err(anyhow!("text generation is disabled"))
    }
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Disabled => Arc::new(DisabledClient),
        LlmProvider::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("llm.base_url is required for the ollama provider"))?;
            Arc::new(OllamaClient::new(http, base_url, config.model.clone()))
        }
        LlmProvider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("llm.api_key is required for the openai provider"))?;
            let base_url =
                config.base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string());
            Arc::new(OpenAiClient::new(http, base_url, api_key, config.model.clone()))
        }
    };
    Ok(client)
}
