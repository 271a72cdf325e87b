//! Thin MyInvois pass-through endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use super::handlers::{query_params, IdParams};
use crate::errors::AppError;
use crate::models::invoice::{build_document, InvoiceSubmitRequest};
use crate::models::taxpayer::{check_identity, validation_summary, ValidationRecord};
use crate::proxy::token::TokenGrant;
use crate::AppState;

/// POST /api/v1.0/invois/token: force a fresh grant
pub async fn issue_token(State(state): State<Arc<AppState>>) -> Result<Json<TokenGrant>, AppError> {
    let grant = state.upstream.tokens().fetch_token().await?;
    Ok(Json(grant))
}

/// GET /api/v1.0/invois/documents/:id
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state
        .upstream
        .fetch_document(&document_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Document not found".into()))
}

/// GET /api/v1.0/invois/taxpayer/validate/:tin: plain-text summary
pub async fn validate_taxpayer_text(
    State(state): State<Arc<AppState>>,
    Path(tin): Path<String>,
    query: Result<Query<IdParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    check_identity(&tin, &params.id_type, &params.id_value).map_err(AppError::InvalidInput)?;

    let check = state
        .upstream
        .validate_tin(&tin, &params.id_type, &params.id_value)
        .await?;

    state
        .store
        .record_validation(&ValidationRecord {
            tin: tin.clone(),
            id_type: params.id_type.clone(),
            id_value: params.id_value.clone(),
            is_valid: check.is_valid(),
        })
        .await?;

    let body = validation_summary(&tin, &params.id_type, &params.id_value, &check);
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

/// POST /api/v1.0/invois/documents/submit
pub async fn submit_invoice(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InvoiceSubmitRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate().map_err(AppError::InvalidInput)?;

    let seller = state
        .store
        .get(&payload.seller_tin)
        .await?
        .ok_or_else(|| AppError::NotFound("Seller taxpayer not found".into()))?;

    let buyer_tin = state
        .store
        .find_by_name_and_address(&payload.buyer_name, &payload.buyer_address)
        .await?
        .map(|buyer| buyer.tin);
    if buyer_tin.is_none() {
        tracing::debug!(buyer = %payload.buyer_name, "no stored taxpayer matches buyer, omitting TIN");
    }

    let document = build_document(&payload, &seller, buyer_tin);
    let result = state.upstream.submit_document(&document).await?;

    tracing::info!(
        seller_tin = %seller.tin,
        document_number = %payload.document_number,
        "invoice submitted"
    );
    Ok(Json(result))
}
