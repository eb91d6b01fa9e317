//! Environment-sourced runtime configuration. Values are trimmed; an empty
//! value counts as unset; the first non-empty key in a fallback list wins.
//! Invalid numerics are logged and replaced by the default rather than
//! failing startup.

use std::time::Duration;

pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 300;
pub const DEFAULT_AUTH_TTL_SECS: u64 = 300;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_HOST: &str = "github.com";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Credential for the auth validator. Absent is a valid startup state;
    /// authenticated tool calls then fail `AuthMissing` until supplied.
    pub token: Option<String>,
    /// TTL for the repository-context cache.
    pub context_ttl: Duration,
    /// TTL for the auth-decision cache. Deliberately a separate knob.
    pub auth_ttl: Duration,
    /// Forge instance host remotes must match.
    pub host: String,
    /// Base URL of the forge REST API.
    pub api_url: String,
    /// Maximum number of simultaneously executing handlers.
    pub max_concurrency: usize,
    /// Default per-call deadline.
    pub tool_timeout: Duration,
    /// Bound on one credential-validation call.
    pub auth_call_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            token: None,
            context_ttl: Duration::from_secs(DEFAULT_CONTEXT_TTL_SECS),
            auth_ttl: Duration::from_secs(DEFAULT_AUTH_TTL_SECS),
            host: DEFAULT_HOST.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            tool_timeout: Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
            auth_call_timeout: Duration::from_millis(DEFAULT_AUTH_TIMEOUT_MS),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            token: first_non_empty(&["FORGELINK_TOKEN", "FORGE_TOKEN"]),
            context_ttl: duration_secs("FORGELINK_CACHE_TTL_SECS", DEFAULT_CONTEXT_TTL_SECS),
            auth_ttl: duration_secs("FORGELINK_AUTH_TTL_SECS", DEFAULT_AUTH_TTL_SECS),
            host: first_non_empty(&["FORGELINK_HOST"]).unwrap_or(defaults.host),
            api_url: first_non_empty(&["FORGELINK_API_URL"])
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            max_concurrency: parsed("FORGELINK_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)
                .max(1),
            tool_timeout: duration_ms("FORGELINK_TOOL_TIMEOUT_MS", DEFAULT_TOOL_TIMEOUT_MS),
            auth_call_timeout: duration_ms("FORGELINK_AUTH_TIMEOUT_MS", DEFAULT_AUTH_TIMEOUT_MS),
        }
    }
}

fn first_non_empty(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    let Some(raw) = first_non_empty(&[key]) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Invalid {key}='{raw}', using the default");
            default
        }
    }
}

fn duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(parsed(key, default_secs))
}

fn duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(parsed(key, default_ms))
}
