use crate::config::BlobConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Durable storage for raw video bytes, addressed by key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`. Returns only once the blob is durable.
    ///
    /// Never replaces an existing blob: a taken key fails with [`KeyConflict`].
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Public locator for a stored key, recorded verbatim on the video record
    fn url_for(&self, key: &str) -> String;
}

/// A blob already exists under the requested key
#[derive(Error, Debug)]
#[error("Blob already exists at key {key}")]
pub struct KeyConflict {
    pub key: String,
}

/// Blob store on a flat local directory
pub struct LocalBlobStore {
    directory: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// Create the store, making sure `directory` exists
    pub async fn new(directory: impl Into<PathBuf>, base_url: Option<String>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create upload directory {}", directory.display()))?;

        info!(directory = %directory.display(), "Local blob store initialized");

        Ok(Self {
            directory,
            base_url: base_url.unwrap_or_else(|| "/uploads".to_string()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, data, _content_type), fields(size_bytes = data.len()))]
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let path = self.directory.join(key);
        // Written under a temporary name so a crash never leaves a truncated blob at `key`
        let partial = self
            .directory
            .join(format!(".{key}.{}.part", Uuid::new_v4().simple()));

        tokio::fs::write(&partial, &data)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;

        // Hard link fails on a taken key; an existing blob is never replaced
        let linked = tokio::fs::hard_link(&partial, &path).await;
        if let Err(e) = tokio::fs::remove_file(&partial).await {
            warn!(path = %partial.display(), error = %e, "Failed to remove partial blob");
        }
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(KeyConflict {
                    key: key.to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to move blob into place at {}", path.display())));
            }
        }

        debug!(path = %path.display(), "Blob written");
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Blob store on an S3-compatible bucket
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    base_url: String,
    multipart_threshold_bytes: usize,
    part_size_bytes: usize,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &BlobConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 blob store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            base_url: s3_base_url(config),
            multipart_threshold_bytes: config.multipart_threshold_bytes,
            part_size_bytes: config.part_size_bytes.max(5 * 1024 * 1024),
        })
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| write_error(key, e, "Failed to upload video to S3"))?;

        Ok(())
    }

    /// Multipart upload for large files. A failed upload is aborted so its parts
    /// do not linger in the bucket.
    async fn multipart_upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?
            .to_string();

        let result = self.upload_parts(key, &upload_id, data).await;

        if result.is_err() {
            match self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                Ok(_) => debug!(key = %key, upload_id = %upload_id, "Multipart upload aborted"),
                Err(e) => warn!(
                    key = %key,
                    upload_id = %upload_id,
                    error = %e,
                    "Failed to abort multipart upload"
                ),
            }
        }

        result
    }

    /// Upload every part of `data` and complete the multipart upload
    async fn upload_parts(&self, key: &str, upload_id: &str, data: Bytes) -> Result<()> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in data.chunks(self.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.slice_ref(chunk)))
                .send()
                .await
                .context("Failed to upload part")?;

            completed_parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| write_error(key, e, "Failed to complete multipart upload"))?;

        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self, data, content_type), fields(bucket = %self.bucket, size_bytes = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        if data.len() > self.multipart_threshold_bytes {
            self.multipart_upload(key, data, content_type).await?;
        } else {
            self.simple_upload(key, data, content_type).await?;
        }

        debug!(key = %key, "Video uploaded to S3");
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

/// Map a failed S3 write, turning a failed `If-None-Match` precondition into [`KeyConflict`]
fn write_error<E>(key: &str, err: E, context: &'static str) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if err.code() == Some("PreconditionFailed") {
        KeyConflict {
            key: key.to_string(),
        }
        .into()
    } else {
        anyhow::Error::new(err).context(context)
    }
}

/// Public URL prefix for objects in the configured bucket
fn s3_base_url(config: &BlobConfig) -> String {
    if let Some(ref base) = config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    match config.endpoint_url {
        Some(ref endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    }
}
