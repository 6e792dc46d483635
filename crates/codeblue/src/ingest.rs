//! Feeds selected CSV exports into the vector index, one chunk at a time

use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::dataset::DataLoader;
use crate::error::Result;
use crate::index::{RecordIds, VectorStore};

pub const INGESTED_FILES: [&str; 3] = ["icustays.csv", "chartevents.csv", "inputevents.csv"];

#[derive(Debug, Clone)]
pub struct IngestOptions {
  pub files: Vec<String>,
  pub chunk_size: usize,
  /// Pause after each chunk to stay under service rate limits
  pub chunk_pause: Duration,
}

impl Default for IngestOptions {
  fn default() -> Self {
    Self {
      files: INGESTED_FILES.iter().map(|f| f.to_string()).collect(),
      chunk_size: 100,
      chunk_pause: Duration::from_secs(1),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
  /// Records upserted per file, in processing order
  pub ingested: Vec<(String, usize)>,
  pub skipped: Vec<(String, String)>,
}

impl IngestReport {
  pub fn total(&self) -> usize {
    self.ingested.iter().map(|(_, n)| n).sum()
  }
}

pub struct IngestionDriver<'a> {
  loader: &'a DataLoader,
  store: &'a VectorStore,
  options: IngestOptions,
}

impl<'a> IngestionDriver<'a> {
  pub fn new(loader: &'a DataLoader, store: &'a VectorStore, options: IngestOptions) -> Self {
    Self { loader, store, options }
  }

  /// Ingest every configured file. A failing file is logged and skipped;
  /// records already upserted from it stay in the index.
  pub async fn run(&self) -> IngestReport {
    let mut report = IngestReport::default();

    for file_name in &self.options.files {
      info!("Processing {file_name}...");
      let mut ids = RecordIds::new(id_prefix(file_name));

      match self.ingest_file(file_name, &mut ids).await {
        Ok(count) => report.ingested.push((file_name.clone(), count)),
        Err(e) => {
          error!("Error processing {file_name}: {e}");
          report.skipped.push((file_name.clone(), e.to_string()));
        }
      }
    }

    info!("Data loading complete! {} records ingested", report.total());
    report
  }

  async fn ingest_file(&self, file_name: &str, ids: &mut RecordIds) -> Result<usize> {
    let mut reader = self.loader.open(file_name)?;

    loop {
      let chunk = reader.next_chunk(self.options.chunk_size.max(1))?;
      if chunk.is_empty() {
        break;
      }

      self.store.upsert(&chunk, ids).await?;
      sleep(self.options.chunk_pause).await;
      info!("Processed {} records from {file_name}", chunk.len());
    }

    Ok(ids.issued())
  }
}

fn id_prefix(file_name: &str) -> String {
  Path::new(file_name)
    .file_stem()
    .map(|stem| stem.to_string_lossy().to_string())
    .unwrap_or_else(|| "rec".to_string())
}
