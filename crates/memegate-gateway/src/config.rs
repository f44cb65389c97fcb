use memegate::DEFAULT_INITIAL_GRANT;
use std::env;
use url::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./client_tokens.db";
const DEFAULT_OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";
const DEFAULT_GIPHY_URL: &str = "https://api.giphy.com/v1/gifs/search";
const DEFAULT_GIPHY_LIMIT: u32 = 10;
const MAX_GIPHY_LIMIT: u32 = 50;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct GatewayConfig {
    /// Server port
    pub port: u16,
    /// SQLite ledger path (":memory:" for an ephemeral ledger)
    pub db_path: String,
    /// Credits granted to each newly issued token
    pub initial_grant: i64,
    /// OpenCage reverse-geocoding endpoint
    pub opencage_url: String,
    pub opencage_api_key: String,
    /// Giphy search endpoint
    pub giphy_url: String,
    pub giphy_api_key: String,
    /// Number of search results to pick a random meme from
    pub giphy_limit: u32,
    /// Timeout applied to each upstream request
    pub upstream_timeout_secs: u64,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Bearer token required for /update_tokens (None = open, trust boundary is external)
    pub admin_token: Option<String>,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("initial_grant", &self.initial_grant)
            .field("opencage_url", &self.opencage_url)
            .field("opencage_api_key", &"[REDACTED]")
            .field("giphy_url", &self.giphy_url)
            .field("giphy_api_key", &"[REDACTED]")
            .field("giphy_limit", &self.giphy_limit)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("allowed_origins", &self.allowed_origins)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Required: upstream API keys
        let opencage_api_key =
            var("OPENCAGE_API_KEY").ok_or(ConfigError::MissingRequired("OPENCAGE_API_KEY"))?;
        let giphy_api_key =
            var("GIPHY_API_KEY").ok_or(ConfigError::MissingRequired("GIPHY_API_KEY"))?;

        let opencage_url =
            var("OPENCAGE_URL").unwrap_or_else(|| DEFAULT_OPENCAGE_URL.to_string());
        Url::parse(&opencage_url).map_err(|_| ConfigError::InvalidUrl(opencage_url.clone()))?;

        let giphy_url = var("GIPHY_URL").unwrap_or_else(|| DEFAULT_GIPHY_URL.to_string());
        Url::parse(&giphy_url).map_err(|_| ConfigError::InvalidUrl(giphy_url.clone()))?;

        let port = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;
        let db_path = var("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let initial_grant = parse_or("INITIAL_GRANT", var("INITIAL_GRANT"), DEFAULT_INITIAL_GRANT)?;
        if initial_grant <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "INITIAL_GRANT",
                value: initial_grant.to_string(),
            });
        }

        let giphy_limit = parse_or("GIPHY_LIMIT", var("GIPHY_LIMIT"), DEFAULT_GIPHY_LIMIT)?
            .clamp(1, MAX_GIPHY_LIMIT);

        let upstream_timeout_secs = parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            var("UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?
        .max(1);

        let allowed_origins: Vec<String> = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        let admin_token = var("ADMIN_TOKEN");
        let metrics_token = var("METRICS_TOKEN");

        if admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set, /update_tokens accepts unauthenticated top-ups");
        }
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            port,
            db_path,
            initial_grant,
            opencage_url,
            opencage_api_key,
            giphy_url,
            giphy_api_key,
            giphy_limit,
            upstream_timeout_secs,
            allowed_origins,
            admin_token,
            metrics_token,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse();
            parsed.map_err(|_| ConfigError::InvalidValue { name, value })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
