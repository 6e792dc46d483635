//! Retrieval-augmented question answering over the ICU dataset

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::completion::{ChatMessage, ChatRequest, CompletionService};
use crate::dataset::{DatasetSummary, Record};
use crate::error::Result;
use crate::index::VectorStore;

pub const TOP_K: usize = 5;
pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 500;

pub const SYSTEM_ROLE: &str = "You are a healthcare data analyst expert specializing in hospital ICU data analysis. Provide specific insights based on the available data.";

const DATASET_FILES: &str = "\
1. icustays.csv - Contains information about ICU stays
2. chartevents.csv - Contains patient charting data
3. inputevents.csv - Contains data about medications and other inputs
4. datetimeevents.csv - Contains timestamped events
5. ingredientevents.csv - Contains medication ingredient information
6. d_items.csv - Dictionary/reference table for items
7. caregiver.csv - Information about healthcare providers";

/// Source of records related to a question
#[async_trait]
pub trait Retriever: Send + Sync {
  async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<Record>>;
}

#[async_trait]
impl Retriever for VectorStore {
  async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<Record>> {
    self.query_similar(question, top_k).await
  }
}

/// Assemble the user prompt from schema context, retrieved records and the question
pub fn build_prompt(columns: &[String], records: &[Record], question: &str) -> String {
  let relevant = if records.is_empty() {
    "No specific records found".to_string()
  } else {
    records.iter().map(|r| format!("- {r}")).collect::<Vec<_>>().join("\n")
  };

  format!(
    "You are analyzing a real hospital dataset with the following files:\n\n\
     {DATASET_FILES}\n\n\
     The columns available in these files are: {}\n\n\
     Relevant records found:\n{relevant}\n\n\
     Please analyze the data structure and provide specific insights about: {question}",
    columns.join(", "),
  )
}

pub struct HealthcareAnalyst {
  completion: Arc<dyn CompletionService>,
  retriever: Option<Arc<dyn Retriever>>,
  summary: DatasetSummary,
  model: String,
}

impl HealthcareAnalyst {
  pub fn new(
    completion: Arc<dyn CompletionService>,
    summary: DatasetSummary,
    model: impl Into<String>,
  ) -> Self {
    Self { completion, retriever: None, summary, model: model.into() }
  }

  pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
    self.retriever = Some(retriever);
    self
  }

  /// Answer a question. Never fails: errors come back as the answer text.
  pub async fn answer(&self, question: &str) -> String {
    match self.try_answer(question).await {
      Ok(answer) => answer,
      Err(e) => format!("Error processing question: {e}"),
    }
  }

  async fn try_answer(&self, question: &str) -> Result<String> {
    let records = match &self.retriever {
      Some(retriever) => retriever.retrieve(question, TOP_K).await.unwrap_or_else(|e| {
        warn!("Retrieval failed, answering without records: {e}");
        Vec::new()
      }),
      None => Vec::new(),
    };

    let request = ChatRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessage::system(SYSTEM_ROLE),
        ChatMessage::user(build_prompt(&self.summary.columns, &records, question)),
      ],
      temperature: TEMPERATURE,
      max_tokens: MAX_TOKENS,
    };

    self.completion.complete(request).await
  }
}
