use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info};

use crate::dataset::loader::{DataLoader, RecordReader, Schema};
use crate::dataset::stats::{ColumnAccumulator, ColumnStats};
use crate::error::Result;

/// Read-only description of the loaded dataset, used as prompt context
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetSummary {
  pub columns: Vec<String>,
  pub row_count: usize,
  pub stats: BTreeMap<String, ColumnStats>,
  pub skipped_files: Vec<String>,
}

impl DatasetSummary {
  /// Summary with known columns and no statistics
  pub fn from_columns(columns: Vec<String>) -> Self {
    Self { columns, ..Self::default() }
  }

  /// One streaming pass over every CSV file in the loader's directory
  pub fn compute(loader: &DataLoader) -> Result<Self> {
    let mut schema = Schema::default();
    let mut accumulators: BTreeMap<String, ColumnAccumulator> = BTreeMap::new();
    let mut row_count = 0;
    let mut skipped_files = Vec::new();

    for path in loader.csv_files()? {
      let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

      match accumulate_file(&path) {
        Ok((file_schema, rows, file_accumulators)) => {
          schema.merge(&file_schema);
          row_count += rows;
          for (column, acc) in file_accumulators {
            match accumulators.get_mut(&column) {
              Some(existing) => existing.merge(acc),
              None => {
                accumulators.insert(column, acc);
              }
            }
          }
          info!("Summarized {rows} rows from {file_name}");
        }
        Err(e) => {
          error!("Skipping {file_name} in summary: {e}");
          skipped_files.push(file_name);
        }
      }
    }

    let stats = accumulators.iter().map(|(column, acc)| (column.clone(), acc.stats())).collect();
    Ok(Self { columns: schema.names(), row_count, stats, skipped_files })
  }
}

fn accumulate_file(path: &Path) -> Result<(Schema, usize, BTreeMap<String, ColumnAccumulator>)> {
  let mut reader = RecordReader::open(path)?;
  let schema = reader.schema().clone();
  let mut accumulators: BTreeMap<String, ColumnAccumulator> = schema
    .columns
    .iter()
    .map(|column| (column.name.clone(), ColumnAccumulator::new(column.kind)))
    .collect();

  let mut rows = 0;
  while let Some(record) = reader.next_record()? {
    rows += 1;
    for (name, value) in record.fields() {
      if let Some(acc) = accumulators.get_mut(name) {
        acc.push(value);
      }
    }
  }

  Ok((schema, rows, accumulators))
}

impl fmt::Display for DatasetSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "rows: {}", self.row_count)?;
    writeln!(f, "columns: {}", self.columns.len())?;
    for column in &self.columns {
      let stats = self.stats.get(column).cloned().unwrap_or(ColumnStats::Empty);
      writeln!(f, "  {column}: {stats}")?;
    }
    if !self.skipped_files.is_empty() {
      writeln!(f, "skipped: {}", self.skipped_files.join(", "))?;
    }
    Ok(())
  }
}
