//! Per-operation retry policies
//!
//! Each remote operation carries its own attempt cap and pause so that the
//! index bootstrap, upserts and queries can fail differently.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Duration,
  /// Upper bound of the random delay added to `backoff`
  pub jitter: Duration,
}

impl RetryPolicy {
  pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
    Self { max_attempts, backoff, jitter: Duration::ZERO }
  }

  /// Index bootstrap: 3 attempts, 10 seconds apart
  pub const fn initialization() -> Self {
    Self::new(3, Duration::from_secs(10))
  }

  /// Record upserts: 3 attempts, 5 seconds apart
  pub const fn upsert() -> Self {
    Self::new(3, Duration::from_secs(5))
  }

  /// Similarity queries fail fast
  pub const fn query() -> Self {
    Self::none()
  }

  pub const fn none() -> Self {
    Self::new(1, Duration::ZERO)
  }

  pub fn with_jitter(mut self, jitter: Duration) -> Self {
    self.jitter = jitter;
    self
  }

  fn pause(&self) -> Duration {
    if self.jitter.is_zero() {
      return self.backoff;
    }
    let extra = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
    self.backoff + Duration::from_millis(extra)
  }

  /// Run `op` until it succeeds, fails with a non-transient error, or the
  /// attempt cap is reached. The last error is returned.
  pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match op(attempt).await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_transient() => {
          error!("{label} failed with a non-retryable error: {err}");
          return Err(err);
        }
        Err(err) if attempt >= max_attempts => {
          if max_attempts > 1 {
            error!("{label} attempt {attempt} failed: {err}. Max retries reached");
          }
          return Err(err);
        }
        Err(err) => {
          warn!("{label} attempt {attempt} failed: {err}");
          sleep(self.pause()).await;
          attempt += 1;
        }
      }
    }
  }
}
