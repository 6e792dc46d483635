//! Vector index client
//!
//! `VectorStore` owns the long-lived index handle. It is built once by
//! [`VectorStore::connect`], then shared by reference between ingestion and
//! question answering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::dataset::Record;
use crate::embedding::{EmbeddingService, EMBEDDING_DIMENSION};
use crate::error::{CodeBlueError, Result};
use crate::index::{IndexEntry, IndexHandle, IndexService};
use crate::retry::RetryPolicy;

/// Connection lifecycle of the index client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
  Uninitialized,
  Connecting,
  Ready,
  Failed,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
  pub batch_size: usize,
  /// Pause between consecutive flushes within one upsert
  pub flush_pause: Duration,
  pub initialization: RetryPolicy,
  pub upsert: RetryPolicy,
  pub query: RetryPolicy,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      batch_size: 50,
      flush_pause: Duration::from_millis(500),
      initialization: RetryPolicy::initialization(),
      upsert: RetryPolicy::upsert(),
      query: RetryPolicy::query(),
    }
  }
}

/// Monotonic id source owned by the caller, so ids stay unique across
/// chunks and repeated upserts
#[derive(Debug, Clone)]
pub struct RecordIds {
  prefix: String,
  next: usize,
}

impl RecordIds {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self { prefix: prefix.into(), next: 0 }
  }

  pub fn assign(&mut self, count: usize) -> Vec<String> {
    (0..count)
      .map(|_| {
        let id = format!("{}_{}", self.prefix, self.next);
        self.next += 1;
        id
      })
      .collect()
  }

  /// Ids handed out so far
  pub fn issued(&self) -> usize {
    self.next
  }
}

impl Default for RecordIds {
  fn default() -> Self {
    Self::new("rec")
  }
}

/// Work carried across retry attempts of one upsert call
struct UpsertProgress {
  embeddings: Vec<Option<Vec<f32>>>,
  flushed: usize,
}

pub fn record_text(record: &Record) -> String {
  format!("Patient record: {record}")
}

/// Drives the index client from `Uninitialized` to `Ready` or `Failed`
pub struct IndexConnector<'a> {
  service: &'a dyn IndexService,
  state: IndexState,
}

impl<'a> IndexConnector<'a> {
  pub fn new(service: &'a dyn IndexService) -> Self {
    Self { service, state: IndexState::Uninitialized }
  }

  pub fn state(&self) -> IndexState {
    self.state
  }

  pub async fn connect(
    &mut self,
    embedder: Arc<dyn EmbeddingService>,
    index_name: &str,
    host: &str,
    options: StoreOptions,
  ) -> Result<VectorStore> {
    self.transition(IndexState::Connecting);

    let service = self.service;
    let result = options
      .initialization
      .run("Pinecone initialization", |attempt| async move {
        info!("Attempt {attempt} to initialize Pinecone...");
        open_and_verify(service, index_name, host).await
      })
      .await;

    match result {
      Ok(index) => {
        self.transition(IndexState::Ready);
        info!("Pinecone initialization successful");
        Ok(VectorStore { index, embedder, options })
      }
      Err(e) => {
        self.transition(IndexState::Failed);
        error!("Initialization failed: {e}");
        Err(e)
      }
    }
  }

  fn transition(&mut self, next: IndexState) {
    debug!("Index client {:?} -> {:?}", self.state, next);
    self.state = next;
  }
}

pub struct VectorStore {
  index: Arc<dyn IndexHandle>,
  embedder: Arc<dyn EmbeddingService>,
  options: StoreOptions,
}

impl VectorStore {
  /// Authenticate, list indexes, open the configured index and run a
  /// zero-vector smoke query, retrying the whole sequence under the
  /// initialization policy. Only a ready store is ever returned.
  pub async fn connect(
    service: &dyn IndexService,
    embedder: Arc<dyn EmbeddingService>,
    index_name: &str,
    host: &str,
    options: StoreOptions,
  ) -> Result<Self> {
    IndexConnector::new(service).connect(embedder, index_name, host, options).await
  }

  /// Wrap an already-open handle
  pub fn from_handle(
    index: Arc<dyn IndexHandle>,
    embedder: Arc<dyn EmbeddingService>,
    options: StoreOptions,
  ) -> Self {
    Self { index, embedder, options }
  }

  /// Embed and store `records` in batches. Ids are drawn from `ids` once, so
  /// a retried attempt overwrites rather than duplicates. Work finished by a
  /// failed attempt (embeddings, flushed batches) is kept for the next one.
  pub async fn upsert(&self, records: &[Record], ids: &mut RecordIds) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }

    let ids = ids.assign(records.len());
    let progress =
      Mutex::new(UpsertProgress { embeddings: vec![None; records.len()], flushed: 0 });

    self
      .options
      .upsert
      .run("Upsert", |_| {
        let ids = &ids;
        let progress = &progress;
        async move {
          let mut progress = progress.lock().await;
          self.upsert_remaining(records, ids, &mut progress).await
        }
      })
      .await?;

    info!("Successfully upserted {} records to Pinecone", records.len());
    Ok(())
  }

  async fn upsert_remaining(
    &self,
    records: &[Record],
    ids: &[String],
    progress: &mut UpsertProgress,
  ) -> Result<()> {
    let batch_size = self.options.batch_size.max(1);

    while progress.flushed < records.len() {
      let start = progress.flushed;
      let end = (start + batch_size).min(records.len());

      let mut batch = Vec::with_capacity(end - start);
      for i in start..end {
        let values = match &progress.embeddings[i] {
          Some(values) => values.clone(),
          None => {
            let values = self.embedder.embed(&record_text(&records[i])).await?;
            progress.embeddings[i] = Some(values.clone());
            values
          }
        };
        batch.push(IndexEntry { id: ids[i].clone(), values, metadata: records[i].clone() });
      }

      self.index.upsert(&batch).await?;
      progress.flushed = end;
      debug!("Flushed {} entries ({}/{})", batch.len(), end, records.len());

      for embedding in &mut progress.embeddings[start..end] {
        *embedding = None;
      }

      if end < records.len() {
        sleep(self.options.flush_pause).await;
      }
    }

    Ok(())
  }

  /// Records most similar to `query`, paired with their scores, in the
  /// order the index returned them
  pub async fn query_scored(&self, query: &str, top_k: usize) -> Result<Vec<(Record, f32)>> {
    if top_k == 0 {
      return Ok(Vec::new());
    }

    let result = self
      .options
      .query
      .run("Query", |_| async move {
        let vector = self.embedder.embed(query).await?;
        self.index.query(&vector, top_k, true).await
      })
      .await;

    match result {
      Ok(matches) => Ok(
        matches
          .into_iter()
          .take(top_k)
          .map(|m| (m.metadata.unwrap_or_default(), m.score))
          .collect(),
      ),
      Err(e) => {
        error!("Error querying Pinecone: {e}");
        Err(e)
      }
    }
  }

  /// Metadata of the `top_k` most similar records
  pub async fn query_similar(&self, query: &str, top_k: usize) -> Result<Vec<Record>> {
    let scored = self.query_scored(query, top_k).await?;
    Ok(scored.into_iter().map(|(record, _)| record).collect())
  }
}

async fn open_and_verify(
  service: &dyn IndexService,
  index_name: &str,
  host: &str,
) -> Result<Arc<dyn IndexHandle>> {
  service.authenticate().await?;
  info!("Pinecone client created");

  let existing = service.list_indexes().await?;
  let names: Vec<&str> = existing.iter().map(|d| d.name.as_str()).collect();
  info!("Found existing indexes: {names:?}");

  match existing.iter().find(|d| d.name == index_name) {
    Some(description) => {
      if let Some(dimension) = description.dimension {
        if dimension != EMBEDDING_DIMENSION {
          return Err(CodeBlueError::dimension_mismatch(EMBEDDING_DIMENSION, dimension));
        }
      }
    }
    None => warn!("Index '{index_name}' is not in the index list, connecting by host anyway"),
  }

  info!("Connecting to index {index_name} using host: {host}");
  let index = service.open_index(index_name, host).await?;

  index.query(&[0.0f32; EMBEDDING_DIMENSION], 1, false).await?;
  info!("Test query successful");

  Ok(index)
}
