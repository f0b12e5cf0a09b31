use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use citabot_agent::{CompletionRequest, LlmClient, LlmError};
use citabot_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI and any compatible endpoint (Ollama's `/v1`).
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl ChatCompletionsClient {
    /// `None` when the provider is disabled.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, reqwest::Error> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (LlmProvider::Disabled, _) => return Ok(None),
            (_, Some(base_url)) => base_url.to_owned(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_owned(),
            (LlmProvider::Ollama, None) => return Ok(None),
        };

        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Some(Self {
            http,
            endpoint: completions_endpoint(&base_url),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }))
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = request_body(&self.model, request);
        let mut call = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }

        let response = call.send().await.map_err(|error| LlmError::Request(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!("status {}: {}", status.as_u16(), detail.trim())));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|error| LlmError::Request(format!("invalid response body: {error}")))?;
        debug!(model = %self.model, "chat completion received");
        first_choice_text(payload)
    }
}

fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn request_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
    let mut messages = vec![ChatMessage { role: "system", content: &request.system_prompt }];
    if !request.context.trim().is_empty() {
        messages.push(ChatMessage { role: "system", content: &request.context });
    }
    if !request.history.trim().is_empty() {
        messages.push(ChatMessage { role: "system", content: &request.history });
    }
    messages.push(ChatMessage { role: "user", content: &request.user_message });

    ChatCompletionBody { model, messages, temperature: 0.3 }
}

fn first_choice_text(payload: Value) -> Result<String, LlmError> {
    let response = serde_json::from_value::<ChatCompletionResponse>(payload)
        .map_err(|error| LlmError::Request(format!("unexpected response shape: {error}")))?;

    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_owned())
        .filter(|content| !content.is_empty())
        .ok_or(LlmError::EmptyResponse)
}
