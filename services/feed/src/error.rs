//! Error taxonomy for ingestion and feed loading.
//!
//! Store adapters report failures as `anyhow::Error`; the core wraps them into
//! these typed variants so the HTTP boundary can tell bad input from an outage.

use thiserror::Error;

/// Errors returned by [`UploadPipeline::ingest`](crate::ingest::UploadPipeline::ingest)
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No video file in upload")]
    MissingFile,

    #[error("Failed to write blob {key}: {source}")]
    StorageFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create metadata record for blob {key}: {source}")]
    PersistenceFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::MissingFile => "MISSING_FILE",
            IngestError::StorageFailure { .. } => "STORAGE_FAILURE",
            IngestError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
        }
    }
}

/// Errors returned by [`FeedLoader::load`](crate::feed_loader::FeedLoader::load)
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Metadata store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}
