use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_TOKEN_URL: &str = "https://preprod-api.myinvois.hasil.gov.my/connect/token";
pub const DEFAULT_API_BASE: &str = "https://preprod-api.myinvois.hasil.gov.my/api/v1.0";
pub const DEFAULT_SCOPE: &str = "InvoicingAPI";
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string, or `memory://` for the in-process store.
    pub database_url: String,
    pub myinvois: MyInvoisConfig,
    /// Origins allowed to call the API from a browser.
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
}

/// Upstream connection settings for the MyInvois platform.
#[derive(Clone)]
pub struct MyInvoisConfig {
    pub token_url: String,
    pub api_base: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: String,
    pub grant_type: String,
    /// Applied to every upstream call, token fetches included.
    pub timeout: Duration,
    /// Subtracted from the token lifetime the upstream declares.
    pub token_safety_margin: Duration,
}

impl std::fmt::Debug for MyInvoisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MyInvoisConfig")
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("grant_type", &self.grant_type)
            .field("timeout", &self.timeout)
            .field("token_safety_margin", &self.token_safety_margin)
            .finish()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &"<redacted>")
            .field("myinvois", &self.myinvois)
            .field("cors_origins", &self.cors_origins)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}

/// Load configuration from the process environment, honouring a `.env` file.
pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from an arbitrary variable lookup. Blank values count as unset.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let token_url = var("MYINVOIS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into());
    url::Url::parse(&token_url).with_context(|| format!("MYINVOIS_TOKEN_URL is not a valid URL: {token_url}"))?;

    let api_base = var("MYINVOIS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into());
    url::Url::parse(&api_base).with_context(|| format!("MYINVOIS_API_BASE is not a valid URL: {api_base}"))?;

    let timeout_secs: u64 = match var("LHDN_API_TIMEOUT") {
        Some(v) => v.trim().parse().context("LHDN_API_TIMEOUT must be a whole number of seconds")?,
        None => 30,
    };
    if timeout_secs == 0 {
        anyhow::bail!("LHDN_API_TIMEOUT must be greater than zero");
    }

    let margin_secs: u64 = match var("MYINVOIS_TOKEN_SAFETY_MARGIN") {
        Some(v) => v
            .trim()
            .parse()
            .context("MYINVOIS_TOKEN_SAFETY_MARGIN must be a whole number of seconds")?,
        None => 30,
    };

    let port: u16 = match var("BILCEKAP_PORT") {
        Some(v) => v.trim().parse().context("BILCEKAP_PORT must be a port number")?,
        None => 8000,
    };

    let log_format = match var("LOG_FORMAT").as_deref().map(str::trim) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };

    let cors_origins = match var("BACKEND_CORS_ORIGINS") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => vec![
            "http://localhost:3000".to_string(),
            "http://localhost:8080".to_string(),
            "http://localhost:5173".to_string(),
        ],
    };

    Ok(Config {
        port,
        database_url: var("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/bilcekap".into()),
        myinvois: MyInvoisConfig {
            token_url,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: var("MYINVOIS_CLIENT_ID"),
            client_secret: var("MYINVOIS_CLIENT_SECRET"),
            scope: var("MYINVOIS_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.into()),
            grant_type: var("MYINVOIS_GRANT_TYPE").unwrap_or_else(|| DEFAULT_GRANT_TYPE.into()),
            timeout: Duration::from_secs(timeout_secs),
            token_safety_margin: Duration::from_secs(margin_secs),
        },
        cors_origins,
        log_format,
    })
}
