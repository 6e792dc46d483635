//! Vector index abstraction layer
//!
//! The remote index is reached through two traits: [`IndexService`] for the
//! control plane (credentials, index listing, opening a handle) and
//! [`IndexHandle`] for the data plane (upsert and similarity query). The
//! Pinecone implementation lives in [`pinecone`]; [`store::VectorStore`] is
//! the client the rest of the crate talks to.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::Record;
use crate::error::Result;

pub mod pinecone;
pub mod store;

pub use store::{IndexConnector, IndexState, RecordIds, StoreOptions, VectorStore};

/// One vector stored in the index, with the source record as metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub id: String,
  pub values: Vec<f32>,
  pub metadata: Record,
}

/// A similarity match as returned by the index
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexMatch {
  pub id: String,
  #[serde(default)]
  pub score: f32,
  #[serde(default)]
  pub metadata: Option<Record>,
}

/// Control-plane view of an existing index
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDescription {
  pub name: String,
  #[serde(default)]
  pub dimension: Option<usize>,
  #[serde(default)]
  pub host: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexHandle: Send + Sync {
  /// Write a batch of entries; entries with an existing id are overwritten
  async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize>;

  /// Top-k nearest entries to `vector`, most similar first
  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    include_metadata: bool,
  ) -> Result<Vec<IndexMatch>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexService: Send + Sync {
  async fn authenticate(&self) -> Result<()>;

  async fn list_indexes(&self) -> Result<Vec<IndexDescription>>;

  async fn open_index(&self, name: &str, host: &str) -> Result<Arc<dyn IndexHandle>>;
}
