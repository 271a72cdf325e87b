use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures talking to the MyInvois platform.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Client id or secret is not configured. No request was sent.
    #[error("MyInvois client credentials not configured")]
    MissingCredentials,

    #[error("upstream rejected credentials ({status}): {body}")]
    AuthRejected { status: u16, body: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("failed to connect to upstream: {0}")]
    Unreachable(String),

    /// Upstream refused the payload as malformed.
    #[error("upstream rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected upstream response ({status}): {body}")]
    Protocol { status: u16, body: String },
}

impl UpstreamError {
    /// Classify a reqwest failure into timeout vs. unreachable.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Unreachable(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                what.clone(),
            ),
            AppError::InvalidInput(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_input",
                reason.clone(),
            ),
            AppError::Conflict(reason) => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "conflict",
                reason.clone(),
            ),
            AppError::Upstream(e) => upstream_parts(e),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": msg,
            "type": error_type,
            "code": code,
        });

        if let AppError::Upstream(
            UpstreamError::AuthRejected { status, .. }
            | UpstreamError::Rejected { status, .. }
            | UpstreamError::Protocol { status, .. },
        ) = &self
        {
            error["upstream_status"] = json!(status);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

fn upstream_parts(e: &UpstreamError) -> (StatusCode, &'static str, &'static str, String) {
    match e {
        UpstreamError::MissingCredentials => {
            tracing::error!("MyInvois credentials are missing from configuration");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "credentials_not_configured",
                e.to_string(),
            )
        }
        UpstreamError::AuthRejected { status, body } => {
            tracing::warn!(upstream_status = status, "MyInvois rejected our credentials: {}", body);
            (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_auth_failed",
                body.clone(),
            )
        }
        UpstreamError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_error",
            "upstream_timeout",
            "MyInvois request timeout".to_string(),
        ),
        UpstreamError::Unreachable(_) => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream_unreachable",
            "Failed to connect to MyInvois".to_string(),
        ),
        UpstreamError::Rejected { body, .. } => (
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "upstream_rejected",
            body.clone(),
        ),
        UpstreamError::Protocol { status, body } => {
            tracing::error!(upstream_status = status, "MyInvois unexpected response: {}", body);
            (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_failed",
                body.clone(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = vec![
            (AppError::NotFound("Taxpayer not found".into()), StatusCode::NOT_FOUND),
            (AppError::InvalidInput("limit".into()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (UpstreamError::MissingCredentials.into(), StatusCode::INTERNAL_SERVER_ERROR),
            (UpstreamError::Timeout.into(), StatusCode::GATEWAY_TIMEOUT),
            (UpstreamError::Unreachable("refused".into()).into(), StatusCode::BAD_GATEWAY),
            (
                UpstreamError::AuthRejected { status: 401, body: "no".into() }.into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                UpstreamError::Rejected { status: 400, body: "bad".into() }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                UpstreamError::Protocol { status: 500, body: "boom".into() }.into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(err.into_response().status(), expected, "wrong status for {}", label);
        }
    }

    #[tokio::test]
    async fn test_upstream_status_is_reported() {
        let err: AppError = UpstreamError::Protocol { status: 503, body: "maintenance".into() }.into();
        let json = body_json(err.into_response()).await;
        assert_eq!(json["error"]["code"], "upstream_failed");
        assert_eq!(json["error"]["upstream_status"], 503);
        assert_eq!(json["error"]["message"], "maintenance");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let err = AppError::Internal(anyhow::anyhow!("connection pool exhausted"));
        let json = body_json(err.into_response()).await;
        assert_eq!(json["error"]["message"], "internal server error");
        assert!(json["error"].get("upstream_status").is_none());
    }
}
