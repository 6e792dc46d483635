//! CSV discovery, schema inference and streaming record reads

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord};
use tracing::info;

use crate::dataset::record::{FieldValue, Record};
use crate::error::{CodeBlueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  Numeric,
  Text,
}

impl ColumnKind {
  /// Identifier columns are numeric, everything else stays text
  pub fn infer(column: &str) -> Self {
    if column.to_lowercase().contains("id") {
      ColumnKind::Numeric
    } else {
      ColumnKind::Text
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
  pub name: String,
  pub kind: ColumnKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
  pub columns: Vec<Column>,
}

impl Schema {
  pub fn from_header(header: &StringRecord) -> Self {
    let columns = header
      .iter()
      .map(|name| Column { name: name.to_string(), kind: ColumnKind::infer(name) })
      .collect();
    Self { columns }
  }

  pub fn names(&self) -> Vec<String> {
    self.columns.iter().map(|c| c.name.clone()).collect()
  }

  pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
    self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
  }

  /// Add columns from another file that this schema has not seen yet
  pub fn merge(&mut self, other: &Schema) {
    for column in &other.columns {
      if self.kind_of(&column.name).is_none() {
        self.columns.push(column.clone());
      }
    }
  }

  /// Convert a raw CSV row into a record. Empty cells are treated as missing.
  pub fn parse_row(&self, row: &StringRecord, line: u64) -> Result<Record> {
    let mut record = Record::new();

    for (column, raw) in self.columns.iter().zip(row.iter()) {
      let raw = raw.trim();
      if raw.is_empty() {
        continue;
      }

      let value = match column.kind {
        ColumnKind::Numeric => raw.parse::<f64>().map(FieldValue::Number).map_err(|_| {
          CodeBlueError::data(format!(
            "line {line}: column '{}' expects a number, found '{raw}'",
            column.name
          ))
        })?,
        ColumnKind::Text => FieldValue::Text(raw.to_string()),
      };
      record.insert(column.name.clone(), value);
    }

    Ok(record)
  }
}

/// Streams records out of one CSV file
pub struct RecordReader {
  reader: Reader<File>,
  schema: Schema,
  row: StringRecord,
  path: PathBuf,
}

impl RecordReader {
  pub fn open(path: &Path) -> Result<Self> {
    let mut reader = ReaderBuilder::new()
      .flexible(true)
      .from_path(path)
      .map_err(|e| CodeBlueError::data(format!("{}: {e}", path.display())))?;
    let schema = Schema::from_header(reader.headers()?);

    Ok(Self { reader, schema, row: StringRecord::new(), path: path.to_path_buf() })
  }

  pub fn schema(&self) -> &Schema {
    &self.schema
  }

  /// Read the next record, or `None` at end of file
  pub fn next_record(&mut self) -> Result<Option<Record>> {
    let has_row = self
      .reader
      .read_record(&mut self.row)
      .map_err(|e| CodeBlueError::data(format!("{}: {e}", self.path.display())))?;
    if !has_row {
      return Ok(None);
    }

    let line = self.row.position().map(|p| p.line()).unwrap_or_default();
    self
      .schema
      .parse_row(&self.row, line)
      .map(Some)
      .map_err(|e| CodeBlueError::data(format!("{}: {e}", self.path.display())))
  }

  /// Read up to `size` records; an empty chunk means the file is exhausted
  pub fn next_chunk(&mut self, size: usize) -> Result<Vec<Record>> {
    let mut chunk = Vec::with_capacity(size);
    while chunk.len() < size {
      match self.next_record()? {
        Some(record) => chunk.push(record),
        None => break,
      }
    }
    Ok(chunk)
  }
}

/// Locates the CSV exports and reads them lazily
#[derive(Debug, Clone)]
pub struct DataLoader {
  data_dir: PathBuf,
}

impl DataLoader {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into() }
  }

  /// All `*.csv` files in the data directory, sorted by name
  pub fn csv_files(&self) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(&self.data_dir).map_err(|e| {
      CodeBlueError::data(format!("cannot read data directory {}: {e}", self.data_dir.display()))
    })?;

    let mut files: Vec<PathBuf> = entries
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path())
      .filter(|path| {
        path.is_file()
          && path.extension().map(|ext| ext.eq_ignore_ascii_case("csv")).unwrap_or(false)
      })
      .collect();
    files.sort();

    if files.is_empty() {
      return Err(CodeBlueError::data(format!(
        "no CSV files found in {}",
        self.data_dir.display()
      )));
    }
    Ok(files)
  }

  /// Inspect every file header and report the combined schema
  pub fn load(&self) -> Result<Schema> {
    info!("Loading data from {}", self.data_dir.display());
    let files = self.csv_files()?;
    let names: Vec<String> = files
      .iter()
      .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
      .collect();
    info!("Found {} CSV files: {:?}", files.len(), names);

    let mut schema = Schema::default();
    for file in &files {
      schema.merge(RecordReader::open(file)?.schema());
    }

    info!("Data loaded successfully. Columns found: {:?}", schema.names());
    Ok(schema)
  }

  pub fn open(&self, file_name: &str) -> Result<RecordReader> {
    RecordReader::open(&self.data_dir.join(file_name))
  }
}
