use crate::config::DatabaseConfig;
use crate::model::{Comment, NewVideo, VideoRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Document store for video records.
///
/// Only create and unfiltered find are needed by the core; ordering of
/// `find_all` is up to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a new record, assigning its id and creation time
    async fn create(&self, video: NewVideo) -> Result<VideoRecord>;

    /// Every stored record
    async fn find_all(&self) -> Result<Vec<VideoRecord>>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct VideoRow {
    id: Uuid,
    url: String,
    caption: Option<String>,
    username: Option<String>,
    user_avatar: Option<String>,
    song_name: Option<String>,
    likes: i64,
    comments: Json<Vec<Comment>>,
    created_at: DateTime<Utc>,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            caption: row.caption,
            username: row.username,
            user_avatar: row.user_avatar,
            song_name: row.song_name,
            likes: row.likes,
            comments: row.comments.0,
            created_at: row.created_at,
        }
    }
}

/// Metadata store backed by PostgreSQL
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, video), fields(url = %video.url))]
    async fn create(&self, video: NewVideo) -> Result<VideoRecord> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            INSERT INTO videos (
                id, url, caption, username, user_avatar, song_name,
                likes, comments, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, 0, '[]'::jsonb, NOW()
            )
            RETURNING id, url, caption, username, user_avatar, song_name,
                      likes, comments, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&video.url)
        .bind(&video.fields.caption)
        .bind(&video.fields.username)
        .bind(&video.fields.user_avatar)
        .bind(&video.fields.song_name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert video record")?;

        debug!(video_id = %row.id, "Video record created");

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<VideoRecord>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, url, caption, username, user_avatar, song_name,
                   likes, comments, created_at
            FROM videos
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query videos")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

/// Process-local store, used for tests and for running without a database
#[derive(Default)]
pub struct InMemoryMetadataStore {
    videos: RwLock<Vec<VideoRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.videos.read().await.len()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create(&self, video: NewVideo) -> Result<VideoRecord> {
        let record = video.into_record(Uuid::new_v4(), Utc::now());
        self.videos.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_all(&self) -> Result<Vec<VideoRecord>> {
        Ok(self.videos.read().await.clone())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
