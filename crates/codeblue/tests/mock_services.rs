use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeblue::completion::{ChatRequest, CompletionService};
use codeblue::embedding::{EmbeddingService, EMBEDDING_DIMENSION};
use codeblue::index::{IndexDescription, IndexEntry, IndexHandle, IndexMatch, IndexService};
use codeblue::{CodeBlueError, Result};

/// Embedding fake that can be told to fail specific calls (1-based)
#[derive(Default)]
pub struct MockEmbedder {
  pub calls: AtomicU32,
  pub texts: Mutex<Vec<String>>,
  pub fail_calls: Vec<u32>,
}

impl MockEmbedder {
  #[allow(dead_code)]
  pub fn failing_on(fail_calls: Vec<u32>) -> Self {
    Self { fail_calls, ..Self::default() }
  }

  #[allow(dead_code)]
  pub fn call_count(&self) -> u32 {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl EmbeddingService for MockEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    self.texts.lock().unwrap().push(text.to_string());
    if self.fail_calls.contains(&call) {
      return Err(CodeBlueError::service("openai", format!("rate limited on call {call}")));
    }
    Ok(vec![0.5; EMBEDDING_DIMENSION])
  }
}

/// Index fake that records every flush and every query
#[derive(Default)]
pub struct MockIndex {
  pub flushes: Mutex<Vec<Vec<IndexEntry>>>,
  pub upsert_attempts: AtomicU32,
  /// Upsert calls (1-based) that fail
  pub fail_upserts: Vec<u32>,
  pub matches: Vec<IndexMatch>,
  pub queries: Mutex<Vec<(usize, bool)>>,
}

impl MockIndex {
  #[allow(dead_code)]
  pub fn with_matches(matches: Vec<IndexMatch>) -> Self {
    Self { matches, ..Self::default() }
  }

  #[allow(dead_code)]
  pub fn failing_upserts(fail_upserts: Vec<u32>) -> Self {
    Self { fail_upserts, ..Self::default() }
  }

  #[allow(dead_code)]
  pub fn flushed(&self) -> Vec<Vec<IndexEntry>> {
    self.flushes.lock().unwrap().clone()
  }
}

#[async_trait]
impl IndexHandle for MockIndex {
  async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
    let attempt = self.upsert_attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if self.fail_upserts.contains(&attempt) {
      return Err(CodeBlueError::service("pinecone", format!("upsert {attempt} unavailable")));
    }
    self.flushes.lock().unwrap().push(entries.to_vec());
    Ok(entries.len())
  }

  async fn query(
    &self,
    _vector: &[f32],
    top_k: usize,
    include_metadata: bool,
  ) -> Result<Vec<IndexMatch>> {
    self.queries.lock().unwrap().push((top_k, include_metadata));
    Ok(self.matches.clone())
  }
}

/// Control plane fake whose index listing fails a set number of times
#[derive(Default)]
pub struct MockControlPlane {
  pub outages: AtomicU32,
  pub list_calls: AtomicU32,
  pub opened: AtomicU32,
  pub index: Arc<MockIndex>,
}

impl MockControlPlane {
  #[allow(dead_code)]
  pub fn with_outages(outages: u32) -> Self {
    Self { outages: AtomicU32::new(outages), ..Self::default() }
  }
}

#[async_trait]
impl IndexService for MockControlPlane {
  async fn authenticate(&self) -> Result<()> {
    Ok(())
  }

  async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    let remaining = self.outages.load(Ordering::SeqCst);
    if remaining > 0 {
      self.outages.store(remaining - 1, Ordering::SeqCst);
      return Err(CodeBlueError::service("pinecone", "service unavailable"));
    }
    Ok(vec![IndexDescription {
      name: "icu-records".to_string(),
      dimension: Some(EMBEDDING_DIMENSION),
      host: Some("icu-records.svc.pinecone.io".to_string()),
    }])
  }

  async fn open_index(&self, _name: &str, _host: &str) -> Result<Arc<dyn IndexHandle>> {
    self.opened.fetch_add(1, Ordering::SeqCst);
    Ok(self.index.clone())
  }
}

/// Chat fake that echoes the prompt it received
#[derive(Default)]
pub struct MockChat {
  pub requests: Mutex<Vec<ChatRequest>>,
}

#[async_trait]
impl CompletionService for MockChat {
  async fn complete(&self, request: ChatRequest) -> Result<String> {
    let question = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
    self.requests.lock().unwrap().push(request);
    if question.contains("explode") {
      return Err(CodeBlueError::service("openai", "model overloaded"));
    }
    Ok(format!("answered {} chars", question.len()))
  }
}
