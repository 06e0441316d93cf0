use axum::extract::{Query, State};
use axum::Json;

use crate::app_state::AppState;
use crate::auth::ApiAuth;
use crate::error::ApiResult;
use crate::models::asset::{Asset, AssetCondition, AssetFilter, AssetStatus};
use crate::models::audit::{AuditEntry, AuditFilter};
use crate::models::report::AssetStatistics;

/// GET /api/reports/statistics
pub async fn statistics(
    State(state): State<AppState>,
    _auth: ApiAuth,
) -> ApiResult<Json<AssetStatistics>> {
    Ok(Json(state.assets.statistics().await?))
}

/// GET /api/reports/audit-logs
pub async fn audit_logs(
    State(state): State<AppState>,
    _auth: ApiAuth,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.audit.list(&filter.normalized()).await?))
}

/// GET /api/reports/missing
pub async fn missing_assets(
    State(state): State<AppState>,
    _auth: ApiAuth,
) -> ApiResult<Json<Vec<Asset>>> {
    let filter = AssetFilter {
        status: Some(AssetStatus::Missing),
        limit: AssetFilter::MAX_LIMIT,
        ..Default::default()
    };
    Ok(Json(state.assets.list_assets(&filter.normalized()).await?))
}

/// GET /api/reports/repair
pub async fn repair_assets(
    State(state): State<AppState>,
    _auth: ApiAuth,
) -> ApiResult<Json<Vec<Asset>>> {
    let filter = AssetFilter {
        condition: Some(AssetCondition::NeedsRepair),
        limit: AssetFilter::MAX_LIMIT,
        ..Default::default()
    };
    Ok(Json(state.assets.list_assets(&filter.normalized()).await?))
}
