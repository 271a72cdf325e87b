use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod invois;

/// Build the API router.
/// All routes are relative; the caller mounts this under `/api/v1.0`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/taxpayer/validate/:tin",
            get(handlers::validate_taxpayer),
        )
        .route(
            "/taxpayer",
            get(handlers::list_taxpayers).post(handlers::create_taxpayer),
        )
        .route(
            "/taxpayer/",
            get(handlers::list_taxpayers).post(handlers::create_taxpayer),
        )
        .route(
            "/taxpayer/:tin",
            get(handlers::get_taxpayer).patch(handlers::update_taxpayer),
        )
        // MyInvois pass-through
        .route("/invois/token", post(invois::issue_token))
        .route("/invois/documents/submit", post(invois::submit_invoice))
        .route("/invois/documents/:id", get(invois::get_document))
        .route(
            "/invois/taxpayer/validate/:tin",
            get(invois::validate_taxpayer_text),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
