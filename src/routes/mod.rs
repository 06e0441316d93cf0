use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod analysis;
pub mod assets;
pub mod health;
pub mod metrics;
pub mod reports;

/// Room for multipart framing on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analysis::submit_analysis))
        .route("/analyze/{job_id}", get(analysis::get_analysis))
        .route("/analysis/history", get(analysis::list_history))
        .route(
            "/analysis/reprocess/{job_id}",
            post(analysis::reprocess_analysis),
        )
        .route(
            "/assets",
            post(assets::create_asset).get(assets::list_assets),
        )
        .route(
            "/assets/{tag}",
            get(assets::get_asset)
                .put(assets::update_asset)
                .delete(assets::delete_asset),
        )
        .route("/assets/{tag}/location", patch(assets::update_location))
        .route("/reports/statistics", get(reports::statistics))
        .route("/reports/audit-logs", get(reports::audit_logs))
        .route("/reports/missing", get(reports::missing_assets))
        .route("/reports/repair", get(reports::repair_assets))
}

/// Full HTTP surface. `/metrics` is mounted only when a Prometheus recorder
/// is installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let body_limit = state.manager.settings().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
