use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::ApiAuth;
use crate::error::{ApiError, ApiResult};
use crate::models::asset::{normalize_tag, Asset, AssetFilter, AssetUpdate, NewAsset};
use crate::models::audit::{actions, NewAuditEntry};

fn not_found(tag: &str) -> ApiError {
    ApiError::NotFound(format!("Asset '{tag}' not found"))
}

async fn audit(state: &AppState, entry: NewAuditEntry) {
    let action = entry.action;
    if let Err(e) = state.audit.record(entry).await {
        tracing::warn!(action, error = %e, "Failed to write audit entry");
    }
}

/// POST /api/assets
pub async fn create_asset(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(body): Json<NewAsset>,
) -> ApiResult<(StatusCode, Json<Asset>)> {
    body.validate()?;
    let asset = state.assets.create_asset(body).await?;

    tracing::info!(asset_tag = %asset.asset_tag, "Asset created");
    audit(
        &state,
        NewAuditEntry::asset(&auth.actor, actions::CREATE, &asset.asset_tag)
            .with_details(json!({ "item_type": asset.item_type, "location": asset.location })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(asset)))
}

/// GET /api/assets
pub async fn list_assets(
    State(state): State<AppState>,
    _auth: ApiAuth,
    Query(filter): Query<AssetFilter>,
) -> ApiResult<Json<Vec<Asset>>> {
    let assets = state.assets.list_assets(&filter.normalized()).await?;
    Ok(Json(assets))
}

/// GET /api/assets/{tag}
pub async fn get_asset(
    State(state): State<AppState>,
    _auth: ApiAuth,
    Path(tag): Path<String>,
) -> ApiResult<Json<Asset>> {
    let asset = state
        .assets
        .get_asset(&tag)
        .await?
        .ok_or_else(|| not_found(&tag))?;
    Ok(Json(asset))
}

/// PUT /api/assets/{tag}
pub async fn update_asset(
    State(state): State<AppState>,
    auth: ApiAuth,
    Path(tag): Path<String>,
    Json(body): Json<AssetUpdate>,
) -> ApiResult<Json<Asset>> {
    body.validate()?;
    let asset = state
        .assets
        .update_asset(&tag, &body)
        .await?
        .ok_or_else(|| not_found(&tag))?;

    audit(
        &state,
        NewAuditEntry::asset(&auth.actor, actions::UPDATE, &asset.asset_tag)
            .with_details(serde_json::to_value(&body).unwrap_or_default()),
    )
    .await;

    Ok(Json(asset))
}

/// DELETE /api/assets/{tag}
pub async fn delete_asset(
    State(state): State<AppState>,
    auth: ApiAuth,
    Path(tag): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.assets.delete_asset(&tag).await? {
        return Err(not_found(&tag));
    }

    tracing::info!(asset_tag = %tag, "Asset deleted");
    audit(
        &state,
        NewAuditEntry::asset(
            &auth.actor,
            actions::DELETE,
            &normalize_tag(&tag).unwrap_or_default(),
        ),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub message: String,
    pub asset: Asset,
}

/// PATCH /api/assets/{tag}/location?location=
pub async fn update_location(
    State(state): State<AppState>,
    auth: ApiAuth,
    Path(tag): Path<String>,
    Query(query): Query<LocationQuery>,
) -> ApiResult<Json<LocationResponse>> {
    let location = query.location.trim();
    if location.is_empty() || location.chars().count() > 200 {
        return Err(ApiError::BadRequest(
            "location must be 1 to 200 characters".to_string(),
        ));
    }

    let asset = state
        .assets
        .update_location(&tag, location)
        .await?
        .ok_or_else(|| not_found(&tag))?;

    audit(
        &state,
        NewAuditEntry::asset(&auth.actor, actions::LOCATION_UPDATE, &asset.asset_tag)
            .with_details(json!({ "new_location": location })),
    )
    .await;

    Ok(Json(LocationResponse {
        message: "Location updated successfully".to_string(),
        asset,
    }))
}
