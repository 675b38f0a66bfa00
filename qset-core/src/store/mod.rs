//! Document store collaborator
//!
//! The engine hands each substituted stage to a [`DocumentStore`], which runs
//! the pipeline against a named collection and returns the output documents.
//! [`MemoryStore`] is an in-process implementation backed by JSON fixtures.

pub mod executor;
pub mod memory;
pub mod pipeline;

use crate::document::Document;

pub use executor::{compare_values, values_equal, PipelineExecutor};
pub use memory::MemoryStore;
pub use pipeline::{Filter, Projection, ProjectionType, Sort, SortOrder, Stage};

/// Executes pipelines against named collections
pub trait DocumentStore: Send + Sync {
    /// Run `pipeline` against `collection` and return every output document
    fn execute(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn execute(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, StoreError> {
        (**self).execute(collection, pipeline)
    }
}

/// Document store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid pipeline stage: {0}")]
    InvalidStage(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Invalid fixture {path}: {reason}")]
    InvalidFixture { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}
