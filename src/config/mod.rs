use serde::Deserialize;
use std::time::Duration;

use crate::services::job_manager::{AnalysisSettings, Backoff};
use crate::services::preprocess::PreprocessOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue. Without it the server runs
    /// an in-process queue and must host its own workers.
    pub redis_url: Option<String>,

    /// Static API key accepted in the `X-API-Key` header
    pub api_key: String,

    /// HS256 secret for bearer tokens. Bearer auth is disabled when unset.
    pub jwt_secret: Option<String>,

    /// OpenAI-compatible API key for the vision model
    pub openai_api_key: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Remote call timeout in seconds
    #[serde(default = "default_vision_timeout_secs")]
    pub vision_timeout_secs: u64,

    /// R2 bucket name. Images go to `upload_dir` when unset.
    pub r2_bucket: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// AES-256-GCM encryption key (base64-encoded, 32 bytes)
    pub encryption_key: Option<String>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_max_image_pixels")]
    pub max_image_pixels: u32,

    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Byte ceiling for the preprocessed image sent to the vision model
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// How many times a failed job may be reprocessed
    #[serde(default = "default_max_reprocess")]
    pub max_reprocess: i32,

    /// Remote call attempts per processing cycle (transient failures only)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Workers spawned inside the API server process
    #[serde(default = "default_embedded_workers")]
    pub embedded_workers: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    60
}

fn default_upload_dir() -> String {
    "./data/uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_max_image_pixels() -> u32 {
    300_000
}

fn default_max_image_dimension() -> u32 {
    2048
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_max_payload_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_max_reprocess() -> i32 {
    3
}

fn default_max_attempts() -> i32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_embedded_workers() -> usize {
    1
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            max_upload_bytes: self.max_upload_bytes,
            preprocess: PreprocessOptions {
                max_pixels: self.max_image_pixels,
                max_dimension: self.max_image_dimension,
                jpeg_quality: self.jpeg_quality,
                max_output_bytes: self.max_payload_bytes,
            },
            max_reprocess: self.max_reprocess,
            max_attempts: self.max_attempts.max(1),
            backoff: Backoff {
                base: Duration::from_millis(self.retry_backoff_ms),
                max: Duration::from_millis(self.retry_backoff_max_ms),
            },
        }
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}
