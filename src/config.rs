//! Provider configuration.
//!
//! Every key may be omitted from the host configuration and picked up from
//! the environment instead:
//!
//! | Key | Environment |
//! |---|---|
//! | `api_key` | `DD_API_KEY`, `DATADOG_API_KEY` |
//! | `app_key` | `DD_APP_KEY`, `DATADOG_APP_KEY` |
//! | `api_url` | `DD_HOST`, `DATADOG_HOST` |
//! | `http_client_retry_enabled` | `DD_HTTP_CLIENT_RETRY_ENABLED` |
//! | `http_client_retry_timeout` | `DD_HTTP_CLIENT_RETRY_TIMEOUT` |

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::validation::int_between;

/// Default Datadog API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.datadoghq.com/";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Host configuration as written; every key optional.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    api_key: Option<String>,
    app_key: Option<String>,
    api_url: Option<String>,
    validate: Option<bool>,
    http_timeout: Option<u64>,
    http_client_retry_enabled: Option<bool>,
    http_client_retry_timeout: Option<u64>,
}

/// Resolved provider configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Datadog API key.
    pub api_key: String,
    /// Datadog application key.
    pub app_key: String,
    /// Base URL of the API, e.g. `https://api.datadoghq.eu/`.
    pub api_url: String,
    /// Check the keys against the API during configure.
    pub validate: bool,
    /// Per-request timeout.
    pub http_timeout: Duration,
    /// Retry rate-limited and gateway-failed requests.
    pub retry_enabled: bool,
    /// Upper bound on the time spent retrying a single request.
    pub retry_timeout: Option<Duration>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("app_key", &redact(&self.app_key))
            .field("api_url", &self.api_url)
            .field("validate", &self.validate)
            .field("http_timeout", &self.http_timeout)
            .field("retry_enabled", &self.retry_enabled)
            .field("retry_timeout", &self.retry_timeout)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl ProviderConfig {
    /// The provider configuration schema.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Datadog credentials and HTTP client settings")
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Datadog API key. Falls back to DD_API_KEY, then DATADOG_API_KEY."),
            )
            .with_attribute(
                "app_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Datadog application key. Falls back to DD_APP_KEY, then DATADOG_APP_KEY."),
            )
            .with_attribute(
                "api_url",
                Attribute::optional_string()
                    .with_description("API base URL. Falls back to DD_HOST, then DATADOG_HOST."),
            )
            .with_attribute(
                "validate",
                Attribute::optional_bool()
                    .with_description("Check the keys against the API during configure. Defaults to true."),
            )
            .with_attribute(
                "http_timeout",
                Attribute::optional_int64()
                    .with_validator(int_between(1, 3600))
                    .with_description("Per-request timeout in seconds. Defaults to 60."),
            )
            .with_attribute(
                "http_client_retry_enabled",
                Attribute::optional_bool()
                    .with_description("Retry rate-limited and gateway-failed requests. Defaults to true."),
            )
            .with_attribute(
                "http_client_retry_timeout",
                Attribute::optional_int64()
                    .with_validator(int_between(1, 86400))
                    .with_description("Upper bound in seconds on retrying a single request."),
            )
    }

    /// Resolve a host configuration object against the environment.
    ///
    /// `env` looks up a variable; pass `|name| std::env::var(name).ok()` in
    /// production.
    pub fn resolve(
        config: &Value,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        let raw: RawConfig = if config.is_null() {
            RawConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                ProviderError::Configuration(format!("invalid provider configuration: {e}"))
            })?
        };

        let api_key = non_empty(raw.api_key)
            .or_else(|| first_env(env, &["DD_API_KEY", "DATADOG_API_KEY"]))
            .unwrap_or_default();
        let app_key = non_empty(raw.app_key)
            .or_else(|| first_env(env, &["DD_APP_KEY", "DATADOG_APP_KEY"]))
            .unwrap_or_default();
        let api_url = non_empty(raw.api_url)
            .or_else(|| first_env(env, &["DD_HOST", "DATADOG_HOST"]))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        check_api_url(&api_url)?;

        let validate = raw.validate.unwrap_or(true);
        if validate && (api_key.is_empty() || app_key.is_empty()) {
            return Err(ProviderError::Configuration(
                "api_key and app_key must be set unless validate = false".to_string(),
            ));
        }

        let retry_enabled = match raw.http_client_retry_enabled {
            Some(enabled) => enabled,
            None => match first_env(env, &["DD_HTTP_CLIENT_RETRY_ENABLED"]) {
                Some(value) => parse_env(&value, "DD_HTTP_CLIENT_RETRY_ENABLED")?,
                None => true,
            },
        };
        let retry_timeout = match raw.http_client_retry_timeout {
            Some(seconds) => Some(seconds),
            None => match first_env(env, &["DD_HTTP_CLIENT_RETRY_TIMEOUT"]) {
                Some(value) => Some(parse_env(&value, "DD_HTTP_CLIENT_RETRY_TIMEOUT")?),
                None => None,
            },
        };

        Ok(Self {
            api_key,
            app_key,
            api_url,
            validate,
            http_timeout: raw
                .http_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            retry_enabled,
            retry_timeout: retry_timeout.map(Duration::from_secs),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn first_env(env: &dyn Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_empty(env(name)))
}

fn parse_env<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, ProviderError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProviderError::Configuration(format!("invalid value {value:?} for {name}")))
}

fn check_api_url(api_url: &str) -> Result<(), ProviderError> {
    let url = Url::parse(api_url)
        .map_err(|e| ProviderError::Configuration(format!("invalid api_url {api_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProviderError::Configuration(format!(
            "api_url {api_url:?} must include an http(s) scheme and a host"
        )));
    }
    if url.path().trim_end_matches('/').ends_with("/api") {
        return Err(ProviderError::Configuration(format!(
            "api_url {api_url:?} must not end with /api/; use the site root, e.g. {DEFAULT_API_URL}"
        )));
    }
    Ok(())
}
