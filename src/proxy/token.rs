//! OAuth client-credentials token cache for the MyInvois identity service.
//!
//! Holds a single bearer token and the instant the upstream says it expires.
//! A token is handed out only while `now < expires_at - safety_margin`;
//! otherwise a fresh grant is requested. The slot sits behind an async
//! mutex so concurrent callers that find it stale wait on one fetch instead
//! of each issuing their own.
//!
//! Grant requests first send the credentials in the form body. If the
//! identity service answers 400 or 401, one more attempt is made with HTTP
//! Basic authentication before giving up.

use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::MyInvoisConfig;
use crate::errors::UpstreamError;

// ── Types ────────────────────────────────────────────────────

/// Client credentials, normalised once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub grant_type: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("grant_type", &self.grant_type)
            .finish()
    }
}

impl Credentials {
    /// Returns `None` when the id or the secret is missing after normalisation.
    pub fn from_config(cfg: &MyInvoisConfig) -> Option<Self> {
        let client_id = normalize(cfg.client_id.as_deref()?);
        let client_secret = normalize(cfg.client_secret.as_deref()?);
        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
            scope: cfg.scope.trim().to_string(),
            grant_type: cfg.grant_type.trim().to_string(),
        })
    }

    /// Last four characters of the client id, for log lines.
    fn id_tail(&self) -> &str {
        let start = self
            .client_id
            .char_indices()
            .rev()
            .nth(3)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.client_id[start..]
    }
}

/// Strip whitespace and stray quotes that creep in from `.env` files.
fn normalize(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

/// Decoded token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct RawGrant {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    fn from_grant(grant: &TokenGrant, issued_at: Instant) -> Self {
        let lifetime = Duration::from_secs(grant.expires_in.max(0) as u64);
        Self {
            access_token: grant.access_token.clone(),
            expires_at: issued_at + lifetime,
        }
    }

    /// True while `now` is strictly before `expires_at - margin`.
    pub fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
        match self.expires_at.checked_sub(margin) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }
}

// ── Cache ────────────────────────────────────────────────────

pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    credentials: Option<Credentials>,
    safety_margin: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(http: reqwest::Client, cfg: &MyInvoisConfig) -> Self {
        let credentials = Credentials::from_config(cfg);
        if credentials.is_none() {
            tracing::warn!("MyInvois client credentials not configured; upstream calls will fail");
        }
        Self {
            http,
            token_url: cfg.token_url.clone(),
            credentials,
            safety_margin: cfg.token_safety_margin,
            slot: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Return the cached token if it is still fresh, otherwise fetch a new one.
    ///
    /// A token fetched by this call is returned even when its declared
    /// lifetime is shorter than the safety margin; it just won't be reused.
    pub async fn get_valid_token(&self) -> Result<String, UpstreamError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh(Instant::now(), self.safety_margin) {
                return Ok(cached.access_token.clone());
            }
            tracing::debug!("cached MyInvois token is stale, refreshing");
        }

        let issued_at = Instant::now();
        let grant = self.request_grant().await?;
        let cached = CachedToken::from_grant(&grant, issued_at);
        let token = cached.access_token.clone();
        *slot = Some(cached);
        Ok(token)
    }

    /// Drop the cached token so the next `get_valid_token` fetches a new one.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            tracing::debug!("MyInvois token invalidated");
        }
    }

    /// Fetch a new grant unconditionally, replacing whatever is cached.
    pub async fn fetch_token(&self) -> Result<TokenGrant, UpstreamError> {
        let mut slot = self.slot.lock().await;
        let issued_at = Instant::now();
        let grant = self.request_grant().await?;
        *slot = Some(CachedToken::from_grant(&grant, issued_at));
        Ok(grant)
    }

    /// Snapshot of the slot.
    pub async fn cached(&self) -> Option<CachedToken> {
        self.slot.lock().await.clone()
    }

    async fn request_grant(&self) -> Result<TokenGrant, UpstreamError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(UpstreamError::MissingCredentials)?;

        // Attempt 1: credentials in the form body.
        let form = [
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", creds.grant_type.as_str()),
            ("scope", creds.scope.as_str()),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(token_transport_error)?;

        let status = resp.status();
        tracing::info!(
            status = status.as_u16(),
            scope = %creds.scope,
            grant_type = %creds.grant_type,
            client_id_tail = %creds.id_tail(),
            "MyInvois token request (body credentials)"
        );
        if status == StatusCode::OK {
            return parse_grant(resp).await;
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            // Attempt 2: HTTP Basic, secret kept out of the body.
            let form = [
                ("grant_type", creds.grant_type.as_str()),
                ("scope", creds.scope.as_str()),
                ("client_id", creds.client_id.as_str()),
            ];
            let resp = self
                .http
                .post(&self.token_url)
                .header(ACCEPT, "application/json")
                .basic_auth(&creds.client_id, Some(&creds.client_secret))
                .form(&form)
                .send()
                .await
                .map_err(token_transport_error)?;

            let status = resp.status();
            tracing::info!(status = status.as_u16(), "MyInvois token request (basic auth)");
            if status == StatusCode::OK {
                return parse_grant(resp).await;
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::AuthRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), "MyInvois token unexpected error: {}", body);
        Err(UpstreamError::Protocol {
            status: status.as_u16(),
            body,
        })
    }
}

fn token_transport_error(err: reqwest::Error) -> UpstreamError {
    let mapped = UpstreamError::from_transport(err);
    match &mapped {
        UpstreamError::Timeout => tracing::error!("MyInvois token request timeout"),
        other => tracing::error!("MyInvois token request error: {}", other),
    }
    mapped
}

async fn parse_grant(resp: Response) -> Result<TokenGrant, UpstreamError> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(UpstreamError::from_transport)?;
    let raw: RawGrant = serde_json::from_str(&body).map_err(|e| {
        tracing::error!("MyInvois token response is not valid JSON: {}", e);
        UpstreamError::Protocol {
            status,
            body: body.clone(),
        }
    })?;

    let access_token = raw
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| UpstreamError::Protocol {
            status,
            body: body.clone(),
        })?;

    Ok(TokenGrant {
        access_token,
        expires_in: raw.expires_in.unwrap_or(0),
        token_type: raw.token_type,
        scope: raw.scope,
    })
}

// ── Tests ────────────────────────────────────────────────────
