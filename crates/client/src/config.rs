//! Client configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::ws::ReconnectPolicy;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{key}: unsupported scheme `{scheme}` (expected http, https, ws or wss)")]
    UnsupportedScheme { key: &'static str, scheme: String },
    #[error("{key}: invalid value `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base for channel endpoints, always `ws` or `wss`.
    pub ws_base_url: Url,
    pub reconnect: ReconnectPolicy,
    /// Quiet window before a burst of widget edits is sent.
    pub debounce: Duration,
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FAMILYPLANNER_API_BASE_URL`: HTTP API base (default: "http://localhost:8000");
    ///   the WebSocket base is derived from it
    /// - `FAMILYPLANNER_WS_BASE_URL`: explicit WebSocket base, overrides the derived one
    /// - `FAMILYPLANNER_RECONNECT_BASE_MS`: first retry delay (default: 2000)
    /// - `FAMILYPLANNER_RECONNECT_GROWTH`: backoff multiplier (default: 1.5)
    /// - `FAMILYPLANNER_RECONNECT_MAX_MS`: delay cap (default: 30000)
    /// - `FAMILYPLANNER_RECONNECT_MAX_ATTEMPTS`: retries before giving up (default: 5)
    /// - `FAMILYPLANNER_DEBOUNCE_MS`: widget edit debounce (default: 500)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ws_base_url = match lookup("FAMILYPLANNER_WS_BASE_URL") {
            Some(raw) => ws_base_url("FAMILYPLANNER_WS_BASE_URL", &raw)?,
            None => {
                let api = lookup("FAMILYPLANNER_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
                ws_base_url("FAMILYPLANNER_API_BASE_URL", &api)?
            }
        };

        let defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            base_delay: parse(&lookup, "FAMILYPLANNER_RECONNECT_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            growth_factor: parse(&lookup, "FAMILYPLANNER_RECONNECT_GROWTH")?
                .unwrap_or(defaults.growth_factor),
            max_delay: parse(&lookup, "FAMILYPLANNER_RECONNECT_MAX_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            max_attempts: parse(&lookup, "FAMILYPLANNER_RECONNECT_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts),
        };
        if reconnect.growth_factor.is_nan() || reconnect.growth_factor < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "FAMILYPLANNER_RECONNECT_GROWTH",
                value: reconnect.growth_factor.to_string(),
            });
        }

        let debounce = Duration::from_millis(
            parse(&lookup, "FAMILYPLANNER_DEBOUNCE_MS")?.unwrap_or(DEFAULT_DEBOUNCE_MS),
        );

        Ok(Self {
            ws_base_url,
            reconnect,
            debounce,
        })
    }
}

/// Map an HTTP(S) or WS(S) base to the matching WebSocket base.
pub fn ws_base_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::UnsupportedScheme {
                key,
                scheme: other.to_string(),
            })
        }
    };
    if url.set_scheme(scheme).is_err() {
        return Err(ConfigError::UnsupportedScheme {
            key,
            scheme: url.scheme().to_string(),
        });
    }
    Ok(url)
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
