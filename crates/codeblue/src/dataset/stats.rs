//! Descriptive statistics accumulated one value at a time
//!
//! Memory per column is bounded: count, mean, std, min and max are exact
//! running values, quartiles come from a fixed-size uniform sample, and
//! frequency tables stop admitting new values once they are full.

use std::collections::HashMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::dataset::loader::ColumnKind;
use crate::dataset::record::{format_number, FieldValue};

/// Values kept per numeric column for quartiles and histograms
pub const SAMPLE_CAPACITY: usize = 10_000;
/// Distinct values tracked per frequency table
pub const MAX_TRACKED_VALUES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
  pub count: usize,
  pub mean: f64,
  /// Sample standard deviation; undefined for a single value
  pub std: Option<f64>,
  pub min: f64,
  pub q25: f64,
  pub median: f64,
  pub q75: f64,
  pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStats {
  pub count: usize,
  pub unique: usize,
  /// False once the frequency table filled up; `unique` is then a lower bound
  pub unique_exact: bool,
  pub top: String,
  pub freq: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnStats {
  Numeric(NumericStats),
  Text(TextStats),
  Empty,
}

impl fmt::Display for ColumnStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ColumnStats::Numeric(s) => write!(
        f,
        "count={} mean={:.3} std={} min={} 25%={} 50%={} 75%={} max={}",
        s.count,
        s.mean,
        s.std.map(|v| format!("{v:.3}")).unwrap_or_else(|| "n/a".to_string()),
        format_number(s.min),
        format_number(s.q25),
        format_number(s.median),
        format_number(s.q75),
        format_number(s.max),
      ),
      ColumnStats::Text(s) => {
        let bound = if s.unique_exact { "=" } else { ">=" };
        write!(f, "count={} unique{bound}{} top={:?} freq={}", s.count, s.unique, s.top, s.freq)
      }
      ColumnStats::Empty => write!(f, "count=0"),
    }
  }
}

/// Running count, mean and variance (Welford), combined across files with
/// the pairwise update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
  count: u64,
  mean: f64,
  m2: f64,
  min: f64,
  max: f64,
}

impl Default for Moments {
  fn default() -> Self {
    Self { count: 0, mean: 0.0, m2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
  }
}

impl Moments {
  pub fn push(&mut self, value: f64) {
    self.count += 1;
    let delta = value - self.mean;
    self.mean += delta / self.count as f64;
    self.m2 += delta * (value - self.mean);
    self.min = self.min.min(value);
    self.max = self.max.max(value);
  }

  pub fn merge(&mut self, other: &Moments) {
    if other.count == 0 {
      return;
    }
    if self.count == 0 {
      *self = *other;
      return;
    }

    let (a, b) = (self.count as f64, other.count as f64);
    let total = a + b;
    let delta = other.mean - self.mean;
    self.mean += delta * b / total;
    self.m2 += other.m2 + delta * delta * a * b / total;
    self.count += other.count;
    self.min = self.min.min(other.min);
    self.max = self.max.max(other.max);
  }

  pub fn count(&self) -> u64 {
    self.count
  }

  pub fn mean(&self) -> f64 {
    self.mean
  }

  pub fn std(&self) -> Option<f64> {
    (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
  }
}

/// Uniform sample of at most `capacity` values out of everything pushed
#[derive(Debug, Clone)]
pub struct Reservoir {
  samples: Vec<f64>,
  seen: u64,
  capacity: usize,
}

impl Reservoir {
  pub fn new(capacity: usize) -> Self {
    Self { samples: Vec::new(), seen: 0, capacity: capacity.max(1) }
  }

  pub fn push(&mut self, value: f64) {
    self.seen += 1;
    if self.samples.len() < self.capacity {
      self.samples.push(value);
      return;
    }
    let slot = rand::rng().random_range(0..self.seen) as usize;
    if slot < self.capacity {
      self.samples[slot] = value;
    }
  }

  /// Combine two samples, drawing from each side in proportion to how many
  /// values it stands for
  pub fn merge(&mut self, other: Reservoir) {
    let seen = self.seen + other.seen;
    if self.samples.len() + other.samples.len() <= self.capacity
      && seen == (self.samples.len() + other.samples.len()) as u64
    {
      self.samples.extend(other.samples);
      self.seen = seen;
      return;
    }

    let mut rng = rand::rng();
    let mut ours = std::mem::take(&mut self.samples);
    let mut theirs = other.samples;
    ours.shuffle(&mut rng);
    theirs.shuffle(&mut rng);

    while self.samples.len() < self.capacity {
      let take_ours = match (ours.is_empty(), theirs.is_empty()) {
        (true, true) => break,
        (false, true) => true,
        (true, false) => false,
        (false, false) => rng.random_range(0..seen) < self.seen,
      };
      let next = if take_ours { ours.pop() } else { theirs.pop() };
      self.samples.extend(next);
    }
    self.seen = seen;
  }

  pub fn samples(&self) -> &[f64] {
    &self.samples
  }

  pub fn seen(&self) -> u64 {
    self.seen
  }

  pub fn is_complete(&self) -> bool {
    self.seen == self.samples.len() as u64
  }
}

/// Frequency table that stops admitting new values once `capacity` distinct
/// values are tracked; later unseen values are only counted in total
#[derive(Debug, Clone)]
pub struct ValueCounts {
  counts: HashMap<String, usize>,
  capacity: usize,
  untracked: usize,
}

impl ValueCounts {
  pub fn new(capacity: usize) -> Self {
    Self { counts: HashMap::new(), capacity, untracked: 0 }
  }

  pub fn add(&mut self, key: String, n: usize) {
    if let Some(count) = self.counts.get_mut(key.as_str()) {
      *count += n;
    } else if self.counts.len() < self.capacity {
      self.counts.insert(key, n);
    } else {
      self.untracked += n;
    }
  }

  pub fn merge(&mut self, other: ValueCounts) {
    for (key, n) in other.counts {
      self.add(key, n);
    }
    self.untracked += other.untracked;
  }

  pub fn total(&self) -> usize {
    self.counts.values().sum::<usize>() + self.untracked
  }

  pub fn tracked(&self) -> usize {
    self.counts.len()
  }

  pub fn is_complete(&self) -> bool {
    self.untracked == 0
  }

  /// Most common first; ties ordered by value
  pub fn sorted(&self) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> =
      self.counts.iter().map(|(k, n)| (k.clone(), *n)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
  }
}

/// Collects one column's values across files
#[derive(Debug, Clone)]
pub enum ColumnAccumulator {
  Numeric { moments: Moments, sample: Reservoir, counts: Option<ValueCounts> },
  Text(ValueCounts),
}

impl ColumnAccumulator {
  pub fn new(kind: ColumnKind) -> Self {
    match kind {
      ColumnKind::Numeric => ColumnAccumulator::Numeric {
        moments: Moments::default(),
        sample: Reservoir::new(SAMPLE_CAPACITY),
        counts: None,
      },
      ColumnKind::Text => ColumnAccumulator::Text(ValueCounts::new(MAX_TRACKED_VALUES)),
    }
  }

  /// Like `new`, but numeric columns also keep a frequency table
  pub fn with_value_counts(kind: ColumnKind) -> Self {
    match Self::new(kind) {
      ColumnAccumulator::Numeric { moments, sample, .. } => ColumnAccumulator::Numeric {
        moments,
        sample,
        counts: Some(ValueCounts::new(MAX_TRACKED_VALUES)),
      },
      text => text,
    }
  }

  pub fn push(&mut self, value: &FieldValue) {
    match self {
      ColumnAccumulator::Numeric { moments, sample, counts } => {
        let number = match value {
          FieldValue::Number(n) => *n,
          FieldValue::Text(s) => match s.parse() {
            Ok(n) => n,
            Err(_) => return,
          },
        };
        moments.push(number);
        sample.push(number);
        if let Some(counts) = counts {
          counts.add(format_number(number), 1);
        }
      }
      ColumnAccumulator::Text(counts) => {
        let key = match value {
          FieldValue::Text(s) => s.clone(),
          FieldValue::Number(n) => format_number(*n),
        };
        counts.add(key, 1);
      }
    }
  }

  pub fn merge(&mut self, other: ColumnAccumulator) {
    match (self, other) {
      (
        ColumnAccumulator::Numeric { moments, sample, counts },
        ColumnAccumulator::Numeric { moments: more, sample: more_sample, counts: more_counts },
      ) => {
        moments.merge(&more);
        sample.merge(more_sample);
        if let Some(more) = more_counts {
          match counts.as_mut() {
            Some(existing) => existing.merge(more),
            None => *counts = Some(more),
          }
        }
      }
      (ColumnAccumulator::Text(counts), ColumnAccumulator::Text(more)) => counts.merge(more),
      _ => {}
    }
  }

  /// Sampled values of a numeric column; every value while the column is
  /// shorter than the sample capacity
  pub fn numeric_sample(&self) -> Option<&[f64]> {
    match self {
      ColumnAccumulator::Numeric { sample, .. } => Some(sample.samples()),
      ColumnAccumulator::Text(_) => None,
    }
  }

  /// `(kept, seen)` when the numeric sample no longer holds every value
  pub fn sampled(&self) -> Option<(usize, u64)> {
    match self {
      ColumnAccumulator::Numeric { sample, .. } if !sample.is_complete() => {
        Some((sample.samples().len(), sample.seen()))
      }
      _ => None,
    }
  }

  /// Value frequencies, most common first; ties ordered by value. Empty for
  /// numeric columns built without a frequency table.
  pub fn value_counts(&self) -> Vec<(String, usize)> {
    match self {
      ColumnAccumulator::Numeric { counts: Some(counts), .. } => counts.sorted(),
      ColumnAccumulator::Numeric { counts: None, .. } => Vec::new(),
      ColumnAccumulator::Text(counts) => counts.sorted(),
    }
  }

  /// Number of values and distinct keys currently held in memory
  pub fn retained(&self) -> usize {
    match self {
      ColumnAccumulator::Numeric { sample, counts, .. } => {
        sample.samples().len() + counts.as_ref().map_or(0, ValueCounts::tracked)
      }
      ColumnAccumulator::Text(counts) => counts.tracked(),
    }
  }

  pub fn stats(&self) -> ColumnStats {
    match self {
      ColumnAccumulator::Numeric { moments, sample, .. } => numeric_stats(moments, sample),
      ColumnAccumulator::Text(counts) => match counts.sorted().into_iter().next() {
        Some((top, freq)) => ColumnStats::Text(TextStats {
          count: counts.total(),
          unique: counts.tracked(),
          unique_exact: counts.is_complete(),
          top,
          freq,
        }),
        None => ColumnStats::Empty,
      },
    }
  }
}

fn numeric_stats(moments: &Moments, sample: &Reservoir) -> ColumnStats {
  if moments.count() == 0 {
    return ColumnStats::Empty;
  }

  let mut sorted = sample.samples().to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));

  ColumnStats::Numeric(NumericStats {
    count: moments.count() as usize,
    mean: moments.mean(),
    std: moments.std(),
    min: moments.min,
    q25: quantile(&sorted, 0.25),
    median: quantile(&sorted, 0.5),
    q75: quantile(&sorted, 0.75),
    max: moments.max,
  })
}

/// Linearly interpolated quantile of an ascending slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
  if sorted.is_empty() {
    return f64::NAN;
  }
  let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lower = position.floor() as usize;
  let upper = position.ceil() as usize;
  let weight = position - lower as f64;
  sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
