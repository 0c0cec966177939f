//! Configuration module
//!
//! Configuration is read from environment variables (a `.env` file is loaded first when
//! present) and grouped into the sections consumed by each service: HTTP/database basics,
//! the upload session manager, the transcoding pipeline and the object storage adapter.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::QualityPreset;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 10;
const CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_UPLOAD_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const ALLOWED_VIDEO_FORMATS: &str = "mp4,mov,avi,mkv,webm,m4v";
const HLS_SEGMENT_DURATION: u64 = 10;
const HLS_VARIANTS: &str = "360p,480p,720p";
const THUMBNAIL_OFFSET_SECS: f64 = 1.0;
const MAX_CONCURRENT_TRANSCODES: usize = 2;
const MAX_PARALLEL_ENCODES: usize = 1;
const VIDEO_JOB_QUEUE_SIZE: usize = 1000;
const SESSION_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const SESSION_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
const JOB_HEARTBEAT_INTERVAL_SECS: u64 = 15;
const JOB_HEARTBEAT_TIMEOUT_SECS: u64 = 600;
const JOB_SUPERVISOR_INTERVAL_SECS: u64 = 60;

/// Server, logging and database settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    /// `json` selects the JSON log formatter, anything else the human-readable one
    pub log_format: String,
    /// In-memory stores are used when unset
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

/// Settings of the resumable upload session manager
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub max_upload_size_bytes: u64,
    /// Lowercase extensions without the leading dot
    pub allowed_formats: Vec<String>,
    /// Parent of the per-session scratch directories
    pub temp_dir: PathBuf,
    /// Destination of reassembled files
    pub upload_dir: PathBuf,
    pub session_timeout_secs: u64,
    pub session_sweep_interval_secs: u64,
}

/// Settings of the transcoding engine, pipeline and job queue
#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Parent of the per-asset local output directories
    pub processed_dir: PathBuf,
    pub hls_segment_duration: u64,
    pub hls_variants: Vec<String>,
    pub thumbnail_offset_secs: f64,
    pub max_concurrent_transcodes: usize,
    pub max_parallel_encodes: usize,
    pub video_job_queue_size: usize,
    pub job_heartbeat_interval_secs: u64,
    pub job_heartbeat_timeout_secs: u64,
    pub job_supervisor_interval_secs: u64,
}

/// Object storage settings. AWS credentials are read by the S3 client from the
/// standard `AWS_*` variables.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO etc.)
    pub s3_endpoint: Option<String>,
    /// Base used for public object URLs, defaults to the endpoint
    pub s3_public_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub upload: UploadConfig,
    pub transcode: TranscodeConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let base = BaseConfig {
            server_port: lookup("PORT")
                .unwrap_or_else(|| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "text".to_string())
                .to_lowercase(),
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
        };

        let upload = UploadConfig {
            chunk_size_bytes: parse_or(&lookup, "CHUNK_SIZE_BYTES", CHUNK_SIZE_BYTES),
            max_upload_size_bytes: parse_or(&lookup, "MAX_UPLOAD_SIZE_BYTES", MAX_UPLOAD_SIZE_BYTES),
            allowed_formats: list_or(&lookup, "ALLOWED_VIDEO_FORMATS", ALLOWED_VIDEO_FORMATS)
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            temp_dir: path_or(&lookup, "TEMP_DIR", "./data/tmp/chunks"),
            upload_dir: path_or(&lookup, "UPLOAD_DIR", "./data/uploads"),
            session_timeout_secs: parse_or(&lookup, "SESSION_TIMEOUT_SECS", SESSION_TIMEOUT_SECS),
            session_sweep_interval_secs: parse_or(
                &lookup,
                "SESSION_SWEEP_INTERVAL_SECS",
                SESSION_SWEEP_INTERVAL_SECS,
            ),
        };

        let transcode = TranscodeConfig {
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            processed_dir: path_or(&lookup, "PROCESSED_DIR", "./data/processed"),
            hls_segment_duration: parse_or(&lookup, "HLS_SEGMENT_DURATION", HLS_SEGMENT_DURATION),
            hls_variants: list_or(&lookup, "HLS_VARIANTS", HLS_VARIANTS),
            thumbnail_offset_secs: parse_or(&lookup, "THUMBNAIL_OFFSET_SECS", THUMBNAIL_OFFSET_SECS),
            max_concurrent_transcodes: parse_or(
                &lookup,
                "MAX_CONCURRENT_TRANSCODES",
                MAX_CONCURRENT_TRANSCODES,
            ),
            max_parallel_encodes: parse_or(&lookup, "MAX_PARALLEL_ENCODES", MAX_PARALLEL_ENCODES),
            video_job_queue_size: parse_or(&lookup, "VIDEO_JOB_QUEUE_SIZE", VIDEO_JOB_QUEUE_SIZE),
            job_heartbeat_interval_secs: parse_or(
                &lookup,
                "JOB_HEARTBEAT_INTERVAL_SECS",
                JOB_HEARTBEAT_INTERVAL_SECS,
            ),
            job_heartbeat_timeout_secs: parse_or(
                &lookup,
                "JOB_HEARTBEAT_TIMEOUT_SECS",
                JOB_HEARTBEAT_TIMEOUT_SECS,
            ),
            job_supervisor_interval_secs: parse_or(
                &lookup,
                "JOB_SUPERVISOR_INTERVAL_SECS",
                JOB_SUPERVISOR_INTERVAL_SECS,
            ),
        };

        let backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let storage = StorageConfig {
            backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION").or_else(|| lookup("AWS_REGION")),
            s3_endpoint: lookup("S3_ENDPOINT"),
            s3_public_endpoint: lookup("S3_PUBLIC_ENDPOINT"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
        };

        Ok(Config {
            base,
            upload,
            transcode,
            storage,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.base.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if self.upload.allowed_formats.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_VIDEO_FORMATS must list at least one extension"
            ));
        }

        if self.transcode.hls_variants.is_empty() {
            return Err(anyhow::anyhow!("HLS_VARIANTS must list at least one quality"));
        }
        QualityPreset::resolve_all(&self.transcode.hls_variants)
            .map_err(|e| anyhow::anyhow!("HLS_VARIANTS is invalid: {}", e))?;

        if self.transcode.hls_segment_duration == 0 {
            return Err(anyhow::anyhow!("HLS_SEGMENT_DURATION must be greater than 0"));
        }

        if self.transcode.thumbnail_offset_secs < 0.0 {
            return Err(anyhow::anyhow!("THUMBNAIL_OFFSET_SECS cannot be negative"));
        }

        if self.transcode.max_concurrent_transcodes == 0
            || self.transcode.max_parallel_encodes == 0
            || self.transcode.video_job_queue_size == 0
        {
            return Err(anyhow::anyhow!(
                "MAX_CONCURRENT_TRANSCODES, MAX_PARALLEL_ENCODES and VIDEO_JOB_QUEUE_SIZE must be at least 1"
            ));
        }

        if self.transcode.job_heartbeat_timeout_secs <= self.transcode.job_heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "JOB_HEARTBEAT_TIMEOUT_SECS must be greater than JOB_HEARTBEAT_INTERVAL_SECS"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn list_or<F>(lookup: &F, key: &str, default: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn path_or<F>(lookup: &F, key: &str, default: &str) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
}
