//! Text-generation client for the OpenAI chat completions endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiSettings;
use crate::error::{CodeBlueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
  pub model: String,
  pub messages: Vec<ChatMessage>,
  pub temperature: f32,
  pub max_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
  /// Generated text of the first choice
  async fn complete(&self, request: ChatRequest) -> Result<String>;
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

pub struct OpenAiChat {
  client: Client,
  endpoint: String,
  api_key: String,
}

impl OpenAiChat {
  pub fn new(client: Client, settings: &OpenAiSettings) -> Self {
    Self {
      client,
      endpoint: format!("{}/chat/completions", settings.base_url.as_str().trim_end_matches('/')),
      api_key: settings.api_key.clone(),
    }
  }
}

#[async_trait]
impl CompletionService for OpenAiChat {
  async fn complete(&self, request: ChatRequest) -> Result<String> {
    let response = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(|e| CodeBlueError::service("openai", e.to_string()))?;

    if !response.status().is_success() {
      let status = response.status();
      let error_text = response.text().await.unwrap_or_default();
      return Err(CodeBlueError::service("openai", format!("HTTP {status}: {error_text}")));
    }

    let body: ChatResponse = response
      .json()
      .await
      .map_err(|e| CodeBlueError::service("openai", format!("invalid chat response: {e}")))?;

    body
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .ok_or_else(|| CodeBlueError::service("openai", "chat response had no content"))
  }
}
