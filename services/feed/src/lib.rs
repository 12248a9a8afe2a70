//! Reelfeed Feed Service
//!
//! Backend and session core for a vertically swiped short-video feed.
//! Uploads are written to blob storage and indexed in a metadata store; the
//! feed is served back newest first; a playback session turns swipe gestures
//! and taps into play/pause commands for exactly one active video.
//!
//! ## Architecture
//!
//! ```text
//!  POST /api/videos          Blob Store              Metadata Store
//! ┌──────────────┐          ┌──────────────┐        ┌──────────────┐
//! │ Upload       │ 1. put   │ uploads/ or  │        │ videos       │
//! │ Pipeline     │─────────▶│ S3 bucket    │        │ (Postgres)   │
//! └──────────────┘          └──────────────┘        └──────────────┘
//!        │  2. create (only after put succeeds)            ▲  │
//!        └─────────────────────────────────────────────────┘  │
//!                                                             ▼
//!                            GET /api/videos         ┌──────────────┐
//!                                                    │ Feed Loader  │
//!                                                    └──────────────┘
//!                                                             │
//!                                                             ▼
//!                                                    ┌──────────────┐
//!                                  gestures, taps ──▶│ FeedSession  │──▶ Play/Pause
//!                                                    └──────────────┘
//! ```

pub mod api;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod feed_loader;
pub mod ingest;
pub mod metadata_store;
pub mod model;
pub mod playback;
pub mod storage_key;

pub use api::{AppState, ErrorResponse, UploadResponse};
pub use blob_store::{BlobStore, KeyConflict, LocalBlobStore, S3BlobStore};
pub use config::Config;
pub use error::{IngestError, LoadError};
pub use feed_loader::FeedLoader;
pub use ingest::UploadPipeline;
pub use metadata_store::{InMemoryMetadataStore, MetadataStore, PgMetadataStore};
pub use model::{Comment, NewVideo, UploadFields, VideoRecord};
pub use playback::{FeedSession, FeedView, GestureEvent, PlaybackCommand, SwipeDirection};
pub use storage_key::StorageKeyGenerator;
