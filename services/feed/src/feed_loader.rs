use crate::error::LoadError;
use crate::metadata_store::MetadataStore;
use crate::model::VideoRecord;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Reads the full feed from the metadata store.
///
/// The result is ordered newest first (`created_at` descending, then `id`
/// descending), whatever order the store returns. No retries: a store failure
/// is reported once as [`LoadError::Unavailable`].
pub struct FeedLoader {
    metadata_store: Arc<dyn MetadataStore>,
}

impl FeedLoader {
    pub fn new(metadata_store: Arc<dyn MetadataStore>) -> Self {
        Self { metadata_store }
    }

    /// Independent snapshot of every video
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Vec<VideoRecord>, LoadError> {
        let mut videos = self.metadata_store.find_all().await.map_err(|e| {
            error!(error = %e, "Failed to load feed");
            metrics::counter!("feed.loads.failed").increment(1);
            LoadError::Unavailable(e)
        })?;

        videos.sort_by_key(|v| Reverse((v.created_at, v.id)));

        debug!(count = videos.len(), "Feed loaded");
        metrics::counter!("feed.loads").increment(1);

        Ok(videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::MockMetadataStore;
    use crate::model::{NewVideo, UploadFields};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn video(url: &str, secs: i64, id: u128) -> VideoRecord {
        NewVideo::new(url, UploadFields::default())
            .into_record(Uuid::from_u128(id), Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[tokio::test]
    async fn test_load_orders_newest_first() {
        let mut store = MockMetadataStore::new();
        store.expect_find_all().returning(|| {
            Ok(vec![
                video("/uploads/a.mp4", 100, 1),
                video("/uploads/c.mp4", 300, 3),
                video("/uploads/b.mp4", 200, 2),
                video("/uploads/d.mp4", 300, 4),
            ])
        });

        let feed = FeedLoader::new(Arc::new(store)).load().await.unwrap();
        let urls: Vec<_> = feed.iter().map(|v| v.url.as_str()).collect();

        assert_eq!(
            urls,
            vec!["/uploads/d.mp4", "/uploads/c.mp4", "/uploads/b.mp4", "/uploads/a.mp4"]
        );
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let mut store = MockMetadataStore::new();
        store.expect_find_all().returning(|| Ok(Vec::new()));

        let feed = FeedLoader::new(Arc::new(store)).load().await.unwrap();
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable_without_retry() {
        let mut store = MockMetadataStore::new();
        store
            .expect_find_all()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("timed out")));

        let err = FeedLoader::new(Arc::new(store)).load().await.unwrap_err();
        assert!(matches!(err, LoadError::Unavailable(_)));
        assert_eq!(err.code(), "UNAVAILABLE");
    }
}
