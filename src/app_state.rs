use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::config::AppConfig;
use crate::db::{self, PgStore};
use crate::services::{
    encryption::{EncryptionError, EncryptionService},
    image_store::{EncryptedImageStore, ImageStore, LocalImageStore, R2ImageStore, StorageError},
    job_manager::AnalysisManager,
    queue::{JobQueue, MemoryJobQueue, QueueError, RedisJobQueue},
    vision::{OpenAiVisionClient, VisionAnalyzer, VisionError},
};
use crate::store::{AssetStore, AuditLog, JobStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AnalysisManager>,
    pub jobs: Arc<dyn JobStore>,
    pub assets: Arc<dyn AssetStore>,
    pub audit: Arc<dyn AuditLog>,
    pub queue: Arc<dyn JobQueue>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        manager: Arc<AnalysisManager>,
        jobs: Arc<dyn JobStore>,
        assets: Arc<dyn AssetStore>,
        audit: Arc<dyn AuditLog>,
        queue: Arc<dyn JobQueue>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            manager,
            jobs,
            assets,
            audit,
            queue,
            auth: Arc::new(auth),
        }
    }

    /// Wire every backend from configuration: connects to Postgres, runs
    /// migrations, and builds the image store and vision client.
    pub async fn from_config(
        config: &AppConfig,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, BootstrapError> {
        tracing::info!("Connecting to PostgreSQL database");
        let pool = db::init_pool(&config.database_url).await?;

        tracing::info!("Running database migrations");
        db::run_migrations(&pool).await?;
        let store = Arc::new(PgStore::new(pool));

        let images = build_image_store(config)?;

        tracing::info!(model = %config.openai_model, "Initializing vision client");
        let vision: Arc<dyn VisionAnalyzer> = Arc::new(OpenAiVisionClient::new(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            Duration::from_secs(config.vision_timeout_secs),
        )?);

        let manager = Arc::new(AnalysisManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            images,
            vision,
            queue.clone(),
            config.analysis_settings(),
        ));

        Ok(Self::new(
            manager,
            store.clone(),
            store.clone(),
            store,
            queue,
            AuthConfig {
                api_key: config.api_key.clone(),
                jwt_secret: config.jwt_secret.clone(),
            },
        ))
    }
}

/// Redis when configured, otherwise an in-process queue that only embedded
/// workers can drain.
pub fn build_queue(config: &AppConfig) -> Result<Arc<dyn JobQueue>, BootstrapError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to Redis job queue");
            Ok(Arc::new(RedisJobQueue::new(url)?))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process job queue");
            Ok(Arc::new(MemoryJobQueue::new()))
        }
    }
}

/// R2 when its settings are complete, else the local upload directory.
/// Sealed with AES-256-GCM when an encryption key is configured.
pub fn build_image_store(config: &AppConfig) -> Result<Arc<dyn ImageStore>, BootstrapError> {
    let encryption = config
        .encryption_key
        .as_deref()
        .map(EncryptionService::from_base64_key)
        .transpose()?;

    let r2 = match (
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    ) {
        (Some(bucket), Some(endpoint), Some(access), Some(secret)) => {
            tracing::info!(bucket = %bucket, "Initializing R2 image storage");
            Some(R2ImageStore::new(bucket, endpoint, access, secret)?)
        }
        _ => None,
    };

    let store: Arc<dyn ImageStore> = match (r2, encryption) {
        (Some(r2), Some(enc)) => Arc::new(EncryptedImageStore::new(r2, enc)),
        (Some(r2), None) => Arc::new(r2),
        (None, enc) => {
            tracing::info!(dir = %config.upload_dir, "Using local image storage");
            let local = LocalImageStore::new(&config.upload_dir);
            match enc {
                Some(enc) => Arc::new(EncryptedImageStore::new(local, enc)),
                None => Arc::new(local),
            }
        }
    };
    Ok(store)
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Database setup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Image storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption setup failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Vision client setup failed: {0}")]
    Vision(#[from] VisionError),

    #[error("Queue setup failed: {0}")]
    Queue(#[from] QueueError),
}
