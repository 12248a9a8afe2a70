use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the feed service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Blob storage configuration
    #[serde(default)]
    pub blob: BlobConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Playback session tuning handed to clients
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Where uploaded video bytes are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    /// Flat directory on local disk, served by this service under `/uploads`
    #[default]
    Local,
    /// S3-compatible bucket
    S3,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    #[serde(default)]
    pub backend: BlobBackend,
    /// Directory for the local backend
    #[serde(default = "default_upload_dir")]
    pub directory: PathBuf,
    /// Prefix of the `url` stored on each record. Defaults to `/uploads` for the
    /// local backend and to the bucket endpoint for S3.
    pub public_base_url: Option<String>,
    /// Bucket name for the S3 backend
    #[serde(default)]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted upload request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Playback session tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct PlaybackConfig {
    /// Minimum swipe displacement (logical units) that moves the feed
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: f32,
}

// Default value functions
fn default_service_name() -> String {
    "feed-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024 // 512MB
}

fn default_swipe_threshold() -> f32 {
    50.0
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "feed-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/feed").required(false))
            .add_source(config::File::with_name("/etc/reelfeed/feed").required(false))
            // Override with environment variables
            // FEED__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("FEED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.playback.validate()?;
        Ok(config)
    }
}

impl DatabaseConfig {
    /// Pool acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Idle connection timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl PlaybackConfig {
    /// The swipe threshold must be a positive finite number
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.swipe_threshold.is_finite() || self.swipe_threshold <= 0.0 {
            anyhow::bail!(
                "playback.swipe_threshold must be a positive finite number, got {}",
                self.swipe_threshold
            );
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::default(),
            directory: default_upload_dir(),
            public_base_url: None,
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            multipart_threshold_bytes: default_multipart_threshold(),
            part_size_bytes: default_part_size(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: default_swipe_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_swipe_threshold(), 50.0);
        assert_eq!(default_api_port(), 5000);
        assert_eq!(BlobConfig::default().backend, BlobBackend::Local);
        assert_eq!(BlobConfig::default().directory, PathBuf::from("uploads"));
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = config::Config::builder()
            .set_override("database.url", "postgres://localhost/feed")
            .unwrap()
            .set_override("blob.backend", "s3")
            .unwrap()
            .set_override("blob.bucket", "videos")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.url, "postgres://localhost/feed");
        assert_eq!(config.database.max_connections, 10);
        assert!(config.database.run_migrations);
        assert_eq!(config.blob.backend, BlobBackend::S3);
        assert_eq!(config.blob.bucket, "videos");
        assert_eq!(config.api.max_upload_bytes, 512 * 1024 * 1024);
        assert_eq!(config.playback.swipe_threshold, 50.0);
        assert_eq!(config.service.name, "feed-service");
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.database.idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_swipe_threshold_validation() {
        assert!(PlaybackConfig::default().validate().is_ok());

        for bad in [f32::NAN, f32::INFINITY, 0.0, -10.0] {
            let config = PlaybackConfig {
                swipe_threshold: bad,
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }
}
