use gym_asset_register::{
    app_state::{self, AppState},
    config::AppConfig,
    routes, telemetry,
    worker::Worker,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing gym-asset-register server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    telemetry::describe_metrics();

    let queue = app_state::build_queue(&config).expect("Failed to initialize job queue");
    let state = AppState::from_config(&config, queue.clone())
        .await
        .expect("Failed to initialize application state");

    // Without Redis nobody else can drain the in-process queue
    let workers = if config.redis_url.is_none() {
        config.embedded_workers.max(1)
    } else {
        config.embedded_workers
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let worker = Worker::new(
            state.manager.clone(),
            queue.clone(),
            config.worker_poll_interval(),
        );
        worker_handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }
    tracing::info!(workers, "Embedded workers started");

    let app = routes::router(state, Some(Arc::new(prometheus_handle)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
