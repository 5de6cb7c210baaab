//! Completion backend for OpenAI-compatible chat-completions endpoints.

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use retrieval_core::error::OracleError;
use retrieval_core::oracle::{Completion, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiChat {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiChat {
    /// `api_base` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(api_base: &str, api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = if api_base.ends_with('/') { api_base.to_string() } else { format!("{api_base}/") };
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .with_context(|| format!("invalid api base url '{api_base}'"))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint, api_key, model: model.into() })
    }

    pub fn endpoint(&self) -> &Url { &self.endpoint }
}

impl Completion for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: &request.prompt }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let mut req = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| OracleError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Status { status: status.as_u16(), body });
        }
        let parsed: ChatResponse = resp.json().await.map_err(|e| OracleError::Transport(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}
