//! CodeBlue - ICU Dataset Analysis
//!
//! Loads hospital ICU CSV exports, summarizes them, embeds their records into
//! a Pinecone index and answers free-text questions with retrieval-augmented
//! generation.

pub mod completion;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod qa;
pub mod retry;
pub mod session;

pub use error::{CodeBlueError, Result};
