/// HTTP client for the MyInvois REST API.
/// Every call carries the cached bearer token; a 401 invalidates the token
/// and the call is replayed exactly once with a fresh one.
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use url::Url;

use crate::config::MyInvoisConfig;
use crate::errors::UpstreamError;
use crate::models::taxpayer::{NotValidReason, TinCheck};
use crate::proxy::token::TokenCache;

pub struct UpstreamClient {
    http: reqwest::Client,
    api_base: Url,
    tokens: TokenCache,
}

impl UpstreamClient {
    pub fn new(cfg: &MyInvoisConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(16)
            .timeout(cfg.timeout)
            .connect_timeout(cfg.timeout.min(std::time::Duration::from_secs(10)))
            .build()?;

        let api_base = Url::parse(&cfg.api_base)?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("MyInvois API base cannot carry a path: {}", cfg.api_base);
        }

        let tokens = TokenCache::new(http.clone(), cfg);
        Ok(Self {
            http,
            api_base,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// `GET /taxpayer/validate/{tin}?idType=&idValue=`
    pub async fn validate_tin(
        &self,
        tin: &str,
        id_type: &str,
        id_value: &str,
    ) -> Result<TinCheck, UpstreamError> {
        let url = self.endpoint(&["taxpayer", "validate", tin]);
        let resp = self
            .send_authorized(|token| {
                self.http
                    .get(url.clone())
                    .query(&[("idType", id_type), ("idValue", id_value)])
                    .header(ACCEPT, "application/json")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
            })
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(UpstreamError::from_transport)?;
        tracing::info!(tin = %tin, status = status.as_u16(), "MyInvois validate response");
        interpret_validation(status, &body)
    }

    /// `GET /documents/{id}`. `Ok(None)` when upstream has no such document.
    pub async fn fetch_document(
        &self,
        document_id: &str,
    ) -> Result<Option<serde_json::Value>, UpstreamError> {
        let url = self.endpoint(&["documents", document_id]);
        let resp = self
            .send_authorized(|token| {
                self.http
                    .get(url.clone())
                    .header(ACCEPT, "application/json")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
            })
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(UpstreamError::from_transport)?;
        interpret_document(status, body)
    }

    /// `POST /documents/submit` with a JSON body.
    pub async fn submit_document<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = self.endpoint(&["documents", "submit"]);
        let resp = self
            .send_authorized(|token| {
                self.http
                    .post(url.clone())
                    .header(ACCEPT, "application/json")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .json(payload)
            })
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(UpstreamError::from_transport)?;
        tracing::info!(status = status.as_u16(), "MyInvois submit response");
        interpret_submission(status, body)
    }

    /// Send with the cached token, replaying once on 401 with a fresh token.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, UpstreamError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.get_valid_token().await?;
        let resp = build(&token).send().await.map_err(request_error)?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::warn!("MyInvois returned 401, refreshing token and retrying once");
        self.tokens.invalidate().await;
        let token = self.tokens.get_valid_token().await?;
        let resp = build(&token).send().await.map_err(request_error)?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("MyInvois still returned 401 after token refresh");
            return Err(UpstreamError::AuthRejected { status: 401, body });
        }
        Ok(resp)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn request_error(err: reqwest::Error) -> UpstreamError {
    let mapped = UpstreamError::from_transport(err);
    tracing::warn!("MyInvois request failed: {}", mapped);
    mapped
}

// ── Response interpretation ──────────────────────────────────

/// Map a validate-TIN response onto a check result.
///
/// An empty 200 body means the TIN is valid. 404 and 400 are answers, not
/// failures. Anything else is surfaced with its status and body.
pub fn interpret_validation(status: StatusCode, body: &str) -> Result<TinCheck, UpstreamError> {
    match status {
        StatusCode::OK => {
            if body.trim().is_empty() {
                return Ok(TinCheck::valid("TIN validated"));
            }
            let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
                return Ok(TinCheck::not_valid(
                    NotValidReason::UnexpectedResponse,
                    "Unexpected non-JSON response",
                ));
            };
            let valid = json.get("valid").and_then(|v| v.as_bool()).unwrap_or(false);
            let message = json
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Validation completed")
                .to_string();
            if valid {
                Ok(TinCheck::valid(message))
            } else {
                Ok(TinCheck::not_valid(NotValidReason::Rejected, message))
            }
        }
        StatusCode::NOT_FOUND => Ok(TinCheck::not_valid(
            NotValidReason::NotFound,
            "Taxpayer not found",
        )),
        StatusCode::BAD_REQUEST => Ok(TinCheck::not_valid(
            NotValidReason::InvalidFormat,
            "Invalid TIN format or ID parameters",
        )),
        other => Err(UpstreamError::Protocol {
            status: other.as_u16(),
            body: body.to_string(),
        }),
    }
}

pub fn interpret_document(
    status: StatusCode,
    body: String,
) -> Result<Option<serde_json::Value>, UpstreamError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(UpstreamError::Protocol {
            status: status.as_u16(),
            body,
        });
    }
    match serde_json::from_str(&body) {
        Ok(doc) => Ok(Some(doc)),
        Err(_) => Err(UpstreamError::Protocol {
            status: status.as_u16(),
            body,
        }),
    }
}

/// Accepted submissions may come back without a JSON body; wrap those.
pub fn interpret_submission(
    status: StatusCode,
    body: String,
) -> Result<serde_json::Value, UpstreamError> {
    if status.is_success() {
        return Ok(serde_json::from_str(&body).unwrap_or_else(|_| {
            serde_json::json!({
                "message": "Submitted, non-JSON response",
                "raw": body,
            })
        }));
    }
    if status == StatusCode::BAD_REQUEST {
        return Err(UpstreamError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Err(UpstreamError::Protocol {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ok_body_is_valid() {
        let check = interpret_validation(StatusCode::OK, "").unwrap();
        assert!(check.is_valid());
        assert_eq!(check.message(), "TIN validated");

        let check = interpret_validation(StatusCode::OK, "  \n").unwrap();
        assert!(check.is_valid());
    }

    #[test]
    fn test_json_body_flag() {
        let check =
            interpret_validation(StatusCode::OK, r#"{"valid":true,"message":"OK"}"#).unwrap();
        assert_eq!(check, TinCheck::valid("OK"));

        let check = interpret_validation(StatusCode::OK, r#"{"message":"Mismatch"}"#).unwrap();
        assert_eq!(check, TinCheck::not_valid(NotValidReason::Rejected, "Mismatch"));

        let check = interpret_validation(StatusCode::OK, r#"{"valid":false}"#).unwrap();
        assert_eq!(check.message(), "Validation completed");
    }

    #[test]
    fn test_non_json_ok_body() {
        let check = interpret_validation(StatusCode::OK, "<html>ok</html>").unwrap();
        assert_eq!(
            check,
            TinCheck::not_valid(NotValidReason::UnexpectedResponse, "Unexpected non-JSON response")
        );
    }

    #[test]
    fn test_not_found_and_bad_request_are_results() {
        let check = interpret_validation(StatusCode::NOT_FOUND, "").unwrap();
        assert_eq!(check, TinCheck::not_valid(NotValidReason::NotFound, "Taxpayer not found"));

        let check = interpret_validation(StatusCode::BAD_REQUEST, "{}").unwrap();
        assert!(matches!(
            check,
            TinCheck::NotValid { reason: NotValidReason::InvalidFormat, .. }
        ));
    }

    #[test]
    fn test_other_status_is_error() {
        let err = interpret_validation(StatusCode::INTERNAL_SERVER_ERROR, "oops").unwrap_err();
        match err {
            UpstreamError::Protocol { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_document_interpretation() {
        assert!(interpret_document(StatusCode::NOT_FOUND, String::new()).unwrap().is_none());
        let doc = interpret_document(StatusCode::OK, r#"{"uuid":"F9D425"}"#.into()).unwrap();
        assert_eq!(doc.unwrap()["uuid"], "F9D425");
        assert!(interpret_document(StatusCode::OK, "not json".into()).is_err());
        assert!(matches!(
            interpret_document(StatusCode::FORBIDDEN, "no".into()),
            Err(UpstreamError::Protocol { status: 403, .. })
        ));
    }

    #[test]
    fn test_submission_interpretation() {
        let ok = interpret_submission(StatusCode::ACCEPTED, r#"{"submissionUid":"S1"}"#.into())
            .unwrap();
        assert_eq!(ok["submissionUid"], "S1");

        let wrapped = interpret_submission(StatusCode::CREATED, "queued".into()).unwrap();
        assert_eq!(wrapped["message"], "Submitted, non-JSON response");
        assert_eq!(wrapped["raw"], "queued");

        assert!(matches!(
            interpret_submission(StatusCode::BAD_REQUEST, "bad".into()),
            Err(UpstreamError::Rejected { status: 400, .. })
        ));
        assert!(matches!(
            interpret_submission(StatusCode::BAD_GATEWAY, "".into()),
            Err(UpstreamError::Protocol { status: 502, .. })
        ));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let cfg = MyInvoisConfig {
            token_url: "http://127.0.0.1:9/connect/token".into(),
            api_base: "http://127.0.0.1:9/api/v1.0".into(),
            client_id: None,
            client_secret: None,
            scope: "InvoicingAPI".into(),
            grant_type: "client_credentials".into(),
            timeout: std::time::Duration::from_secs(1),
            token_safety_margin: std::time::Duration::from_secs(30),
        };
        let client = UpstreamClient::new(&cfg).unwrap();
        let url = client.endpoint(&["taxpayer", "validate", "C1/../x"]);
        assert_eq!(url.path(), "/api/v1.0/taxpayer/validate/C1%2F..%2Fx");
    }
}
