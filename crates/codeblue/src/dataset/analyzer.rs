use std::collections::BTreeMap;

use tracing::warn;

use crate::dataset::chart::{self, ChartKind};
use crate::dataset::loader::{DataLoader, RecordReader};
use crate::dataset::stats::{ColumnAccumulator, ColumnStats};
use crate::error::{CodeBlueError, Result};

/// Distribution and summary of a single column, or why it could not be built
#[derive(Debug, Clone, PartialEq)]
pub enum Trend {
  Analyzed { distribution: Vec<(String, usize)>, summary: ColumnStats },
  Failed(String),
}

pub struct DataAnalyzer {
  loader: DataLoader,
}

impl DataAnalyzer {
  pub fn new(loader: DataLoader) -> Self {
    Self { loader }
  }

  /// Analyze each column independently; one bad column does not stop the rest
  pub fn analyze_trends(&self, columns: &[String]) -> BTreeMap<String, Trend> {
    columns
      .iter()
      .map(|column| {
        let trend = match self.collect_column(column, true) {
          Ok(acc) => Trend::Analyzed { distribution: acc.value_counts(), summary: acc.stats() },
          Err(e) => Trend::Failed(format!("Error analyzing {column}: {e}")),
        };
        (column.clone(), trend)
      })
      .collect()
  }

  pub fn generate_visualization(&self, column: &str, kind: ChartKind) -> Result<String> {
    let acc = self.collect_column(column, false)?;

    match (kind, acc.numeric_sample()) {
      (ChartKind::Histogram, Some(values)) => {
        let mut chart = chart::histogram(column, values);
        if let Some((kept, seen)) = acc.sampled() {
          chart.push_str(&format!("(drawn from {kept} of {seen} values)\n"));
        }
        Ok(chart)
      }
      (ChartKind::Histogram, None) => Ok(chart::category_bars(column, &acc.value_counts())),
      (ChartKind::Box, Some(_)) => match acc.stats() {
        ColumnStats::Numeric(stats) => Ok(chart::box_plot(column, &stats)),
        _ => Ok(format!("{column}: no values\n")),
      },
      (ChartKind::Box, None) => {
        Err(CodeBlueError::data(format!("box plots need a numeric column, '{column}' is text")))
      }
    }
  }

  /// Accumulate `column` across the files that contain it. Frequency tables
  /// for numeric columns are only built when `with_counts` is set.
  fn collect_column(&self, column: &str, with_counts: bool) -> Result<ColumnAccumulator> {
    let mut found: Option<ColumnAccumulator> = None;

    for path in self.loader.csv_files()? {
      let mut reader = RecordReader::open(&path)?;
      let Some(kind) = reader.schema().kind_of(column) else {
        continue;
      };

      let mut acc = if with_counts {
        ColumnAccumulator::with_value_counts(kind)
      } else {
        ColumnAccumulator::new(kind)
      };
      let mut read = || -> Result<()> {
        while let Some(record) = reader.next_record()? {
          if let Some(value) = record.get(column) {
            acc.push(value);
          }
        }
        Ok(())
      };
      if let Err(e) = read() {
        warn!("Skipping {} while reading column {column}: {e}", path.display());
        continue;
      }

      match found.as_mut() {
        Some(existing) => existing.merge(acc),
        None => found = Some(acc),
      }
    }

    found.ok_or_else(|| CodeBlueError::data(format!("column '{column}' not found")))
  }
}
