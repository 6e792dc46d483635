//! Embedding client
//!
//! Turns one piece of text into one fixed-length vector through the OpenAI
//! embeddings endpoint. There is no caching and no local retry: failures go
//! straight back to the caller, whose retry policy decides what happens next.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAiSettings;
use crate::error::{CodeBlueError, Result};

/// Output dimension of `text-embedding-ada-002`
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Input limit of the embedding model, in tokens
pub const MAX_INPUT_TOKENS: usize = 8191;

/// Rough characters-per-token ratio for English clinical text
const CHARS_PER_TOKEN: usize = 4;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingService: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cut `text` to the model's input limit, keeping the first chunk only.
/// Tokens are estimated at four characters each.
pub fn truncate_for_embedding(text: &str, max_tokens: usize) -> &str {
  let max_chars = max_tokens * CHARS_PER_TOKEN;
  match text.char_indices().nth(max_chars) {
    Some((byte_index, _)) => &text[..byte_index],
    None => text,
  }
}

/// Reject vectors that do not match the index dimension
pub fn check_dimension(vector: &[f32]) -> Result<()> {
  if vector.len() != EMBEDDING_DIMENSION {
    return Err(CodeBlueError::dimension_mismatch(EMBEDDING_DIMENSION, vector.len()));
  }
  Ok(())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

pub struct OpenAiEmbeddings {
  client: Client,
  endpoint: String,
  api_key: String,
  model: String,
}

impl OpenAiEmbeddings {
  pub fn new(client: Client, settings: &OpenAiSettings) -> Self {
    Self {
      client,
      endpoint: format!("{}/embeddings", settings.base_url.as_str().trim_end_matches('/')),
      api_key: settings.api_key.clone(),
      model: settings.embedding_model.clone(),
    }
  }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddings {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    if text.trim().is_empty() {
      return Err(CodeBlueError::data("cannot embed empty text"));
    }

    let input = truncate_for_embedding(text, MAX_INPUT_TOKENS);
    if input.len() < text.len() {
      debug!("Truncated embedding input from {} to {} bytes", text.len(), input.len());
    }

    let request = EmbeddingRequest { model: &self.model, input };
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

    let body: EmbeddingResponse = response
      .json()
      .await
      .map_err(|e| CodeBlueError::service("openai", format!("invalid embedding response: {e}")))?;

    let embedding = body
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or_else(|| CodeBlueError::service("openai", "embedding response had no data"))?;

    check_dimension(&embedding)?;
    Ok(embedding)
  }
}
