//! Runtime settings resolved from the environment
//!
//! Credentials and index coordinates are mandatory; everything else has a
//! default that matches the hosted OpenAI and Pinecone endpoints.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{CodeBlueError, Result};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
pub const PINECONE_INDEX_NAME: &str = "PINECONE_INDEX_NAME";
pub const PINECONE_HOST: &str = "PINECONE_HOST";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_CHAT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
  pub api_key: String,
  pub base_url: Url,
  pub embedding_model: String,
  pub chat_model: String,
}

#[derive(Debug, Clone)]
pub struct PineconeSettings {
  pub api_key: String,
  pub control_url: Url,
  pub index_name: String,
  /// Data-plane host of the index, copied from the Pinecone console
  pub host: Url,
}

#[derive(Debug, Clone)]
pub struct Settings {
  pub openai: OpenAiSettings,
  pub pinecone: PineconeSettings,
  pub timeout: Duration,
}

impl Settings {
  /// Resolve settings from the process environment
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Resolve settings through an arbitrary key lookup
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let openai = OpenAiSettings {
      api_key: required(&lookup, OPENAI_API_KEY)?,
      base_url: parse_url(
        "OPENAI_BASE_URL",
        &optional(&lookup, "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
      )?,
      embedding_model: optional(&lookup, "CODEBLUE_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
      chat_model: optional(&lookup, "CODEBLUE_CHAT_MODEL", DEFAULT_CHAT_MODEL),
    };

    let pinecone = PineconeSettings {
      api_key: required(&lookup, PINECONE_API_KEY)?,
      control_url: parse_url(
        "PINECONE_CONTROL_URL",
        &optional(&lookup, "PINECONE_CONTROL_URL", DEFAULT_PINECONE_CONTROL_URL),
      )?,
      index_name: required(&lookup, PINECONE_INDEX_NAME)?,
      host: parse_url(PINECONE_HOST, &required(&lookup, PINECONE_HOST)?)?,
    };

    let timeout_secs = match lookup("CODEBLUE_TIMEOUT_SECS") {
      Some(raw) => raw.trim().parse().map_err(|_| {
        CodeBlueError::configuration(format!("CODEBLUE_TIMEOUT_SECS is not a number: {raw}"))
      })?,
      None => DEFAULT_TIMEOUT_SECS,
    };

    Ok(Self { openai, pinecone, timeout: Duration::from_secs(timeout_secs) })
  }
}

/// Default location of the ICU CSV exports
pub fn default_data_dir() -> PathBuf {
  dirs::home_dir().unwrap_or_default().join("Desktop").join("med").join("data")
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
  F: Fn(&str) -> Option<String>,
{
  match lookup(key) {
    Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
    _ => Err(CodeBlueError::configuration(format!("{key} is not set"))),
  }
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
  F: Fn(&str) -> Option<String>,
{
  lookup(key)
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
    .unwrap_or_else(|| default.to_string())
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
  let url = Url::parse(raw)
    .map_err(|e| CodeBlueError::configuration(format!("{key} is not a valid URL ({raw}): {e}")))?;

  if url.host_str().is_none() {
    return Err(CodeBlueError::configuration(format!("{key} has no host: {raw}")));
  }

  Ok(url)
}
