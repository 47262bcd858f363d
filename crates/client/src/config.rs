//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BUYLIST_API_URL` - Base URL of the cart/offer/submission backend
//!
//! ## Optional
//! - `BUYLIST_API_TOKEN` - Bearer token sent with every request
//! - `BUYLIST_PERSIST_DEBOUNCE_MS` - Per-line write debounce window (default: 500)
//! - `BUYLIST_RETRY_BACKOFF_MS` - Delay before the single write retry (default: 250)
//! - `BUYLIST_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `BUYLIST_CONNECTED_VENDORS_TTL_SECS` - Connected-vendor cache TTL (default: 30)
//! - `BUYLIST_VENDOR_DIRECTORY` - Path to a JSON vendor directory
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Buylist client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend connection settings
    pub backend: BackendConfig,
    /// Cart write debounce and retry policy
    pub persist: PersistConfig,
    /// How long the connected-vendor list is trusted before refetching
    pub connected_vendors_ttl: Duration,
    /// Optional JSON file replacing the built-in vendor directory
    pub vendor_directory_path: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Backend connection settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL every endpoint path is resolved against
    pub base_url: Url,
    /// Bearer token, if the backend requires one
    pub api_token: Option<SecretString>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Debounce and retry policy for cart line writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistConfig {
    /// Quiet period after the last edit of a line before it is written
    pub debounce: Duration,
    /// Delay before the single retry of a transiently failed write
    pub retry_backoff: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = get_required_env("BUYLIST_API_URL")?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("BUYLIST_API_URL".to_string(), e.to_string()))?;

        let api_token = get_optional_env("BUYLIST_API_TOKEN")
            .map(|token| {
                validate_secret("BUYLIST_API_TOKEN", &token)?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let backend = BackendConfig {
            base_url,
            api_token,
            request_timeout: Duration::from_secs(parse_env_or("BUYLIST_REQUEST_TIMEOUT_SECS", 30)?),
        };

        let persist = PersistConfig {
            debounce: Duration::from_millis(parse_env_or("BUYLIST_PERSIST_DEBOUNCE_MS", 500)?),
            retry_backoff: Duration::from_millis(parse_env_or("BUYLIST_RETRY_BACKOFF_MS", 250)?),
        };

        Ok(Self {
            backend,
            persist,
            connected_vendors_ttl: Duration::from_secs(parse_env_or(
                "BUYLIST_CONNECTED_VENDORS_TTL_SECS",
                30,
            )?),
            vendor_directory_path: get_optional_env("BUYLIST_VENDOR_DIRECTORY").map(PathBuf::from),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Configuration for a backend at `base_url` with every other setting
    /// at its default.
    #[must_use]
    pub fn for_base_url(base_url: Url) -> Self {
        Self {
            backend: BackendConfig {
                base_url,
                api_token: None,
                request_timeout: Duration::from_secs(30),
            },
            persist: PersistConfig::default(),
            connected_vendors_ttl: Duration::from_secs(30),
            vendor_directory_path: None,
            sentry_dsn: None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating an empty value as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Reject tokens that are obviously copied from a template.
fn validate_secret(var_name: &str, secret: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}
