use crate::blob_store::{BlobStore, KeyConflict};
use crate::error::IngestError;
use crate::metadata_store::MetadataStore;
use crate::model::{NewVideo, UploadFields, VideoRecord};
use crate::storage_key::{content_type_for, StorageKeyGenerator};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Keys tried for one upload before a taken key is reported as a storage failure
const MAX_KEY_ATTEMPTS: u32 = 5;

/// Turns an uploaded file plus form fields into a stored blob and a video record.
///
/// The blob is always written before the record is created, so a record never
/// points at a missing blob. A record failure after a successful write leaves
/// the blob orphaned; it is never surfaced because nothing references it.
pub struct UploadPipeline {
    blob_store: Arc<dyn BlobStore>,
    metadata_store: Arc<dyn MetadataStore>,
    keys: StorageKeyGenerator,
}

impl UploadPipeline {
    pub fn new(blob_store: Arc<dyn BlobStore>, metadata_store: Arc<dyn MetadataStore>) -> Self {
        Self::with_key_generator(blob_store, metadata_store, StorageKeyGenerator::new())
    }

    pub fn with_key_generator(
        blob_store: Arc<dyn BlobStore>,
        metadata_store: Arc<dyn MetadataStore>,
        keys: StorageKeyGenerator,
    ) -> Self {
        Self {
            blob_store,
            metadata_store,
            keys,
        }
    }

    /// Ingest one upload.
    ///
    /// `file_name_hint` is only used for the key's extension.
    #[instrument(skip(self, file, fields))]
    pub async fn ingest(
        &self,
        file: Option<Bytes>,
        file_name_hint: Option<&str>,
        fields: UploadFields,
    ) -> Result<VideoRecord, IngestError> {
        let data = match file {
            Some(data) if !data.is_empty() => data,
            _ => {
                warn!("Upload rejected: no video file");
                metrics::counter!("feed.uploads.rejected").increment(1);
                return Err(IngestError::MissingFile);
            }
        };

        let size_bytes = data.len();
        let mut attempt = 1;

        // A key can already be taken by a blob from another process or an
        // earlier run; the store refuses it and the next key is tried.
        let key = loop {
            let key = self.keys.generate(file_name_hint);

            match self
                .blob_store
                .put(&key, data.clone(), content_type_for(&key))
                .await
            {
                Ok(()) => break key,
                Err(source) if source.is::<KeyConflict>() && attempt < MAX_KEY_ATTEMPTS => {
                    warn!(key = %key, attempt = attempt, "Blob key already taken, retrying");
                    metrics::counter!("feed.uploads.key_conflicts").increment(1);
                    attempt += 1;
                }
                Err(source) => {
                    error!(key = %key, error = %source, "Blob write failed");
                    metrics::counter!("feed.uploads.failed", "stage" => "blob").increment(1);
                    return Err(IngestError::StorageFailure { key, source });
                }
            }
        };

        let new_video = NewVideo::new(self.blob_store.url_for(&key), fields);

        let record = match self.metadata_store.create(new_video).await {
            Ok(record) => record,
            Err(source) => {
                error!(key = %key, error = %source, "Metadata create failed, blob left orphaned");
                metrics::counter!("feed.uploads.failed", "stage" => "metadata").increment(1);
                return Err(IngestError::PersistenceFailure { key, source });
            }
        };

        metrics::counter!("feed.uploads.ingested").increment(1);
        metrics::counter!("feed.upload.bytes").increment(size_bytes as u64);

        info!(
            video_id = %record.id,
            key = %key,
            size_bytes = size_bytes,
            "Video ingested"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{LocalBlobStore, MockBlobStore};
    use crate::metadata_store::{InMemoryMetadataStore, MockMetadataStore};
    use chrono::Utc;
    use mockall::Sequence;
    use uuid::Uuid;

    fn fixed_keys() -> StorageKeyGenerator {
        StorageKeyGenerator::with_clock(|| 1_700_000_000_000)
    }

    fn local_urls(blob: &mut MockBlobStore) {
        blob.expect_url_for()
            .returning(|key| format!("/uploads/{key}"));
    }

    #[tokio::test]
    async fn test_ingest_writes_blob_then_creates_record() {
        let mut seq = Sequence::new();
        let mut blob = MockBlobStore::new();
        let mut meta = MockMetadataStore::new();

        blob.expect_put()
            .withf(|key, data, content_type| {
                key == "1700000000000.mp4" && data[..] == b"clip"[..] && content_type == "video/mp4"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        local_urls(&mut blob);
        meta.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|video| Ok(video.into_record(Uuid::new_v4(), Utc::now())));

        let pipeline = UploadPipeline::with_key_generator(Arc::new(blob), Arc::new(meta), fixed_keys());
        let fields = UploadFields {
            caption: Some("hi".to_string()),
            username: Some("alice".to_string()),
            ..Default::default()
        };

        let record = pipeline
            .ingest(Some(Bytes::from_static(b"clip")), Some("clip.mp4"), fields)
            .await
            .unwrap();

        assert_eq!(record.url, "/uploads/1700000000000.mp4");
        assert_eq!(record.caption.as_deref(), Some("hi"));
        assert_eq!(record.username.as_deref(), Some("alice"));
        assert_eq!(record.likes, 0);
        assert!(record.comments.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_touches_no_store() {
        let mut blob = MockBlobStore::new();
        let mut meta = MockMetadataStore::new();
        blob.expect_put().never();
        meta.expect_create().never();

        let pipeline = UploadPipeline::new(Arc::new(blob), Arc::new(meta));

        let err = pipeline
            .ingest(None, Some("clip.mp4"), UploadFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingFile));

        let err = pipeline
            .ingest(Some(Bytes::new()), Some("clip.mp4"), UploadFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingFile));
    }

    #[tokio::test]
    async fn test_blob_failure_creates_no_record() {
        let mut blob = MockBlobStore::new();
        let mut meta = MockMetadataStore::new();
        blob.expect_put()
            .returning(|_, _, _| Err(anyhow::anyhow!("disk full")));
        meta.expect_create().never();

        let pipeline = UploadPipeline::with_key_generator(Arc::new(blob), Arc::new(meta), fixed_keys());

        let err = pipeline
            .ingest(Some(Bytes::from_static(b"x")), Some("a.webm"), UploadFields::default())
            .await
            .unwrap_err();

        match err {
            IngestError::StorageFailure { key, source } => {
                assert_eq!(key, "1700000000000.webm");
                assert!(source.to_string().contains("disk full"));
            }
            other => panic!("Expected StorageFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_reports_persistence_failure() {
        let mut blob = MockBlobStore::new();
        let mut meta = MockMetadataStore::new();
        blob.expect_put().times(1).returning(|_, _, _| Ok(()));
        local_urls(&mut blob);
        meta.expect_create()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let pipeline = UploadPipeline::with_key_generator(Arc::new(blob), Arc::new(meta), fixed_keys());

        let err = pipeline
            .ingest(Some(Bytes::from_static(b"x")), None, UploadFields::default())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::PersistenceFailure { ref key, .. } if key == "1700000000000"));
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
    }

    #[tokio::test]
    async fn test_taken_key_is_retried_with_next_key() {
        let mut seq = Sequence::new();
        let mut blob = MockBlobStore::new();
        blob.expect_put()
            .withf(|key, _, _| key == "1700000000000.mp4")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|key, _, _| {
                Err(KeyConflict {
                    key: key.to_string(),
                }
                .into())
            });
        blob.expect_put()
            .withf(|key, _, _| key == "1700000000001.mp4")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        local_urls(&mut blob);

        let pipeline = UploadPipeline::with_key_generator(
            Arc::new(blob),
            Arc::new(InMemoryMetadataStore::new()),
            fixed_keys(),
        );

        let record = pipeline
            .ingest(Some(Bytes::from_static(b"x")), Some("v.mp4"), UploadFields::default())
            .await
            .unwrap();
        assert_eq!(record.url, "/uploads/1700000000001.mp4");
    }

    #[tokio::test]
    async fn test_restarted_pipeline_keeps_earlier_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let blob = Arc::new(LocalBlobStore::new(dir.path(), None).await.unwrap());
        let meta = Arc::new(InMemoryMetadataStore::new());

        let before = UploadPipeline::with_key_generator(blob.clone(), meta.clone(), fixed_keys());
        let first = before
            .ingest(Some(Bytes::from_static(b"first-video")), Some("a.mp4"), UploadFields::default())
            .await
            .unwrap();

        // Fresh generator on the same clock reading, as after a restart
        let after = UploadPipeline::with_key_generator(blob.clone(), meta.clone(), fixed_keys());
        let second = after
            .ingest(Some(Bytes::from_static(b"second-video")), Some("b.mp4"), UploadFields::default())
            .await
            .unwrap();

        assert_eq!(first.url, "/uploads/1700000000000.mp4");
        assert_eq!(second.url, "/uploads/1700000000001.mp4");
        assert_eq!(
            std::fs::read(dir.path().join("1700000000000.mp4")).unwrap(),
            b"first-video"
        );
        assert_eq!(
            std::fs::read(dir.path().join("1700000000001.mp4")).unwrap(),
            b"second-video"
        );
        assert_eq!(meta.count().await, 2);
    }

    #[tokio::test]
    async fn test_key_conflicts_give_up_after_bounded_attempts() {
        let mut blob = MockBlobStore::new();
        blob.expect_put()
            .times(MAX_KEY_ATTEMPTS as usize)
            .returning(|key, _, _| {
                Err(KeyConflict {
                    key: key.to_string(),
                }
                .into())
            });
        let mut meta = MockMetadataStore::new();
        meta.expect_create().never();

        let pipeline = UploadPipeline::with_key_generator(Arc::new(blob), Arc::new(meta), fixed_keys());

        let err = pipeline
            .ingest(Some(Bytes::from_static(b"x")), Some("v.mp4"), UploadFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::StorageFailure { ref key, .. } if key == "1700000000004.mp4"));
    }

    #[tokio::test]
    async fn test_consecutive_uploads_get_distinct_keys() {
        let mut blob = MockBlobStore::new();
        blob.expect_put().times(3).returning(|_, _, _| Ok(()));
        local_urls(&mut blob);
        let meta = Arc::new(InMemoryMetadataStore::new());

        let pipeline = UploadPipeline::with_key_generator(Arc::new(blob), meta.clone(), fixed_keys());

        let mut urls = Vec::new();
        for _ in 0..3 {
            let record = pipeline
                .ingest(Some(Bytes::from_static(b"x")), Some("v.mp4"), UploadFields::default())
                .await
                .unwrap();
            urls.push(record.url);
        }

        assert_eq!(
            urls,
            vec![
                "/uploads/1700000000000.mp4",
                "/uploads/1700000000001.mp4",
                "/uploads/1700000000002.mp4",
            ]
        );
        assert_eq!(meta.count().await, 3);
    }
}
