use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::taxpayer::{
    precheck, NewTaxpayer, Taxpayer, TaxpayerUpdate, TaxpayerValidationResponse, ValidationRecord,
};
use crate::store::Page;
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct IdParams {
    #[serde(rename = "idType")]
    pub id_type: String,
    #[serde(rename = "idValue")]
    pub id_value: String,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Map a query rejection onto `AppError::InvalidInput`.
pub(super) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/v1.0/taxpayer/validate/:tin: check a TIN and mirror the outcome
pub async fn validate_taxpayer(
    State(state): State<Arc<AppState>>,
    Path(tin): Path<String>,
    query: Result<Query<IdParams>, QueryRejection>,
) -> Result<Json<TaxpayerValidationResponse>, AppError> {
    let params = query_params(query)?;
    if let Some(check) = precheck(&tin, &params.id_type, &params.id_value) {
        tracing::info!(tin = %tin, "TIN rejected by local checks: {}", check.message());
        return Ok(Json(TaxpayerValidationResponse {
            tin,
            id_type: params.id_type,
            id_value: params.id_value,
            is_valid: false,
            validation_message: check.message().to_string(),
            validated_at: Utc::now(),
        }));
    }

    let check = state
        .upstream
        .validate_tin(&tin, &params.id_type, &params.id_value)
        .await?;

    let row = state
        .store
        .record_validation(&ValidationRecord {
            tin: tin.clone(),
            id_type: params.id_type.clone(),
            id_value: params.id_value.clone(),
            is_valid: check.is_valid(),
        })
        .await?;

    Ok(Json(TaxpayerValidationResponse {
        tin: row.tin,
        id_type: row.id_type,
        id_value: row.id_value,
        is_valid: row.is_valid,
        validation_message: check.message().to_string(),
        validated_at: row.updated_at.unwrap_or(row.created_at),
    }))
}

/// GET /api/v1.0/taxpayer: list mirrored taxpayers
pub async fn list_taxpayers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Json<Vec<Taxpayer>>, AppError> {
    let params = query_params(query)?;
    let page = Page::new(params.skip, params.limit).map_err(AppError::InvalidInput)?;
    let rows = state.store.list(page).await?;
    Ok(Json(rows))
}

/// POST /api/v1.0/taxpayer: create a taxpayer record
pub async fn create_taxpayer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewTaxpayer>,
) -> Result<(StatusCode, Json<Taxpayer>), AppError> {
    payload.validate().map_err(AppError::InvalidInput)?;

    let row = state.store.create(&payload).await?.ok_or_else(|| {
        AppError::Conflict(format!("Taxpayer with TIN {} already exists", payload.tin))
    })?;

    tracing::info!(tin = %row.tin, id = row.id, "taxpayer created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1.0/taxpayer/:tin
pub async fn get_taxpayer(
    State(state): State<Arc<AppState>>,
    Path(tin): Path<String>,
) -> Result<Json<Taxpayer>, AppError> {
    state
        .store
        .get(&tin)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Taxpayer not found".into()))
}

/// PATCH /api/v1.0/taxpayer/:tin: partial update
pub async fn update_taxpayer(
    State(state): State<Arc<AppState>>,
    Path(tin): Path<String>,
    Json(payload): Json<TaxpayerUpdate>,
) -> Result<Json<Taxpayer>, AppError> {
    payload.validate().map_err(AppError::InvalidInput)?;

    state
        .store
        .update(&tin, &payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Taxpayer not found".into()))
}
