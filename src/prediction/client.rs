//! Chat-completion client
//!
//! HTTP client for an OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;

/// One prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Optional system message
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the text of the first choice
    async fn complete(&self, request: CompletionRequest) -> Result<String, PredictionError>;
}

/// Errors that can occur when talking to the completion model
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Completion model not configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Completion service unavailable")]
    Unavailable,

    #[error("Model returned no content")]
    EmptyResponse,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Build a client if the model is enabled and has a key
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, PredictionError> {
        let Some(api_key) = config.active_key() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
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

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, PredictionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PredictionError::Timeout
                } else if e.is_connect() {
                    PredictionError::Unavailable
                } else {
                    PredictionError::Request(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PredictionError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let result: ChatResponse = response.json().await?;
        extract_content(result)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, PredictionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(PredictionError::EmptyResponse)
}

/// Canned responses, in order, for tests
#[cfg(test)]
pub(crate) struct ScriptedClient {
    replies: std::sync::Mutex<std::collections::VecDeque<Result<String, PredictionError>>>,
    pub prompts: std::sync::Mutex<Vec<CompletionRequest>>,
}

#[cfg(test)]
impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, PredictionError>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }
}

#[cfg(test)]
#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, PredictionError> {
        self.prompts.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(PredictionError::Unavailable))
    }
}
