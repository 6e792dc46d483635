//! ICU dataset access: CSV loading, summary statistics and text charts

pub mod analyzer;
pub mod chart;
pub mod loader;
pub mod record;
pub mod stats;
pub mod summary;

pub use loader::{ColumnKind, DataLoader, RecordReader, Schema};
pub use record::{FieldValue, Record};
pub use summary::DatasetSummary;
