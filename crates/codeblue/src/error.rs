use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodeBlueError>;

#[derive(Error, Debug)]
pub enum CodeBlueError {
  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("{service} request failed: {message}")]
  Service { service: &'static str, message: String },

  #[error("Data error: {message}")]
  Data { message: String },

  #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

impl CodeBlueError {
  pub fn configuration(message: impl Into<String>) -> Self {
    Self::Configuration { message: message.into() }
  }

  pub fn service(service: &'static str, message: impl Into<String>) -> Self {
    Self::Service { service, message: message.into() }
  }

  pub fn data(message: impl Into<String>) -> Self {
    Self::Data { message: message.into() }
  }

  pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
    Self::DimensionMismatch { expected, actual }
  }

  /// Only external-service failures are worth another attempt.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Service { .. })
  }
}

impl From<reqwest::Error> for CodeBlueError {
  fn from(err: reqwest::Error) -> Self {
    Self::service("http", err.to_string())
  }
}

impl From<csv::Error> for CodeBlueError {
  fn from(err: csv::Error) -> Self {
    Self::data(err.to_string())
  }
}

impl From<std::io::Error> for CodeBlueError {
  fn from(err: std::io::Error) -> Self {
    Self::data(err.to_string())
  }
}
