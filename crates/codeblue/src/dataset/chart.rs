//! Terminal renderings of a single column

use clap::ValueEnum;

use crate::dataset::record::format_number;
use crate::dataset::stats::NumericStats;
use crate::error::{CodeBlueError, Result};

const BAR_WIDTH: usize = 40;
const HISTOGRAM_BINS: usize = 10;
const TOP_CATEGORIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
  Histogram,
  Box,
}

impl std::str::FromStr for ChartKind {
  type Err = CodeBlueError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "histogram" | "hist" => Ok(ChartKind::Histogram),
      "box" => Ok(ChartKind::Box),
      other => Err(CodeBlueError::data(format!("unknown chart type '{other}' (histogram/box)"))),
    }
  }
}

/// Equal-width histogram of numeric values
pub fn histogram(title: &str, values: &[f64]) -> String {
  if values.is_empty() {
    return format!("{title}: no values\n");
  }

  let min = values.iter().copied().fold(f64::INFINITY, f64::min);
  let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let width = (max - min) / HISTOGRAM_BINS as f64;

  let mut counts = [0usize; HISTOGRAM_BINS];
  for v in values {
    let bin = if width == 0.0 { 0 } else { ((v - min) / width) as usize };
    counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
  }

  let rows: Vec<(String, usize)> = if width == 0.0 {
    vec![(format_number(min), counts[0])]
  } else {
    counts
      .iter()
      .enumerate()
      .map(|(i, n)| {
        let lo = min + width * i as f64;
        (format!("{:>10.2} - {:<10.2}", lo, lo + width), *n)
      })
      .collect()
  };

  bars(title, &rows)
}

/// Frequency bars for the most common categories
pub fn category_bars(title: &str, counts: &[(String, usize)]) -> String {
  let rows: Vec<(String, usize)> = counts.iter().take(TOP_CATEGORIES).cloned().collect();
  if rows.is_empty() {
    return format!("{title}: no values\n");
  }
  bars(title, &rows)
}

fn bars(title: &str, rows: &[(String, usize)]) -> String {
  let peak = rows.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1);
  let label_width = rows.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);

  let mut out = format!("{title}\n");
  for (label, n) in rows {
    let len = n * BAR_WIDTH / peak;
    out.push_str(&format!("{label:<label_width$} | {} {n}\n", "#".repeat(len)));
  }
  out
}

/// Five-number summary drawn as a horizontal box plot
pub fn box_plot(title: &str, stats: &NumericStats) -> String {
  let NumericStats { min, q25: q1, median, q75: q3, max, .. } = *stats;

  let span = max - min;
  let scale = |v: f64| -> usize {
    if span == 0.0 {
      0
    } else {
      (((v - min) / span) * (BAR_WIDTH - 1) as f64).round() as usize
    }
  };

  let mut line = vec![' '; BAR_WIDTH];
  let (q1_at, median_at, q3_at) = (scale(q1), scale(median), scale(q3));
  for (i, cell) in line.iter_mut().enumerate() {
    *cell = if i < q1_at || i > q3_at { '-' } else { '=' };
  }
  line[0] = '|';
  line[BAR_WIDTH - 1] = '|';
  line[q1_at] = '[';
  line[q3_at] = ']';
  line[median_at] = ':';

  format!(
    "{title}\n{}\nmin={} q1={} median={} q3={} max={}\n",
    line.into_iter().collect::<String>(),
    format_number(min),
    format_number(q1),
    format_number(median),
    format_number(q3),
    format_number(max),
  )
}
