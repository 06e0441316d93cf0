use gym_asset_register::{
    app_state::{self, AppState},
    config::AppConfig,
    telemetry,
    worker::Worker,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting analysis worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    if config.redis_url.is_none() {
        tracing::error!("REDIS_URL is required for a standalone worker");
        std::process::exit(1);
    }

    let queue = app_state::build_queue(&config).expect("Failed to initialize job queue");
    let state = AppState::from_config(&config, queue.clone())
        .await
        .expect("Failed to initialize services");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing current job");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("Worker ready, starting job processing loop");
    Worker::new(state.manager, queue, config.worker_poll_interval())
        .run(shutdown_rx)
        .await;
}
