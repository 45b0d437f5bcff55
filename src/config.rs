//! Configuration for the payment submitter.
//!
//! Settings are read from a JSON file. Missing fields fall back to environment variables,
//! then to the defaults in [`config_defaults`]. String values may reference the environment
//! directly as `"$VAR"` or `"${VAR}"` (see [`LiteralOrEnv`]), which keeps secrets such as the
//! gateway token out of the file:
//!
//! ```json
//! {
//!   "gateway_url": "$PAYMENT_GATEWAY_URL",
//!   "token": "${PAYMENT_GATEWAY_TOKEN}",
//!   "request_timeout_ms": 2500,
//!   "pool": { "max_idle_per_host": 500, "idle_timeout_secs": 90 },
//!   "backoff": { "initial_interval_ms": 50, "max_attempts": 5 }
//! }
//! ```

use clap::Parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::backoff::ExponentialBackoff;
use crate::gateway::PaymentGatewayClient;

/// CLI arguments for `ride-payment-submitter`.
#[derive(Parser, Debug)]
#[command(name = "ride-payment-submitter")]
#[command(about = "Submit one ride payment and reconcile it against the gateway ledger")]
pub struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,
    /// Amount to charge, in integer currency units
    #[arg(long)]
    pub amount: u64,
    /// JSON file holding the payer's billable rides
    #[arg(long)]
    pub rides: PathBuf,
    /// Only count rides of this user
    #[arg(long)]
    pub user_id: Option<String>,
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A value given either literally or as a `$VAR` / `${VAR}` environment reference,
/// resolved once during deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Returns the variable name if `s` is `$VAR` or `${VAR}`.
fn env_reference(s: &str) -> Option<&str> {
    if let Some(braced) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        return Some(braced);
    }
    let name = s.strip_prefix('$')?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let value = match env_reference(&raw) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, raw
                ))
            })?,
            None => raw,
        };
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Submitter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct Config {
    gateway_url: LiteralOrEnv<Url>,
    token: Option<LiteralOrEnv<String>>,
    request_timeout_ms: Option<u64>,
    pool: HttpPoolConfig,
    backoff: BackoffConfig,
}

/// Configuration as written in the file, before environment fallbacks that can fail.
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    gateway_url: Option<LiteralOrEnv<Url>>,
    #[serde(default = "config_defaults::default_token")]
    token: Option<LiteralOrEnv<String>>,
    #[serde(default = "config_defaults::default_request_timeout_ms")]
    request_timeout_ms: Option<u64>,
    #[serde(default)]
    pool: HttpPoolConfig,
    #[serde(default)]
    backoff: BackoffConfig,
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let gateway_url = match file.gateway_url {
            Some(url) => url,
            None => config_defaults::default_gateway_url()?,
        };
        Ok(Self {
            gateway_url,
            token: file.token,
            request_timeout_ms: file.request_timeout_ms,
            pool: file.pool,
            backoff: file.backoff,
        })
    }
}

/// Connection pool settings for the process-wide HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpPoolConfig {
    #[serde(default = "pool_defaults::max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "pool_defaults::idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

mod pool_defaults {
    pub fn max_idle_per_host() -> usize {
        500
    }

    pub fn idle_timeout_secs() -> u64 {
        90
    }
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: pool_defaults::max_idle_per_host(),
            idle_timeout_secs: pool_defaults::idle_timeout_secs(),
        }
    }
}

impl HttpPoolConfig {
    /// Builds the shared HTTP client. Call once per process and clone the result.
    pub fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .build()
    }
}

/// Retry settings; see [`ExponentialBackoff`] for their meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    #[serde(default = "backoff_defaults::initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "backoff_defaults::multiplier")]
    pub multiplier: f64,
    #[serde(default = "backoff_defaults::max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "backoff_defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "backoff_defaults::max_elapsed_ms")]
    pub max_elapsed_ms: Option<u64>,
}

mod backoff_defaults {
    use crate::backoff::ExponentialBackoff;

    pub fn initial_interval_ms() -> u64 {
        ExponentialBackoff::DEFAULT_INITIAL_INTERVAL.as_millis() as u64
    }

    pub fn multiplier() -> f64 {
        ExponentialBackoff::DEFAULT_MULTIPLIER
    }

    pub fn max_interval_ms() -> u64 {
        ExponentialBackoff::DEFAULT_MAX_INTERVAL.as_millis() as u64
    }

    pub fn max_attempts() -> u32 {
        ExponentialBackoff::DEFAULT_MAX_ATTEMPTS
    }

    pub fn max_elapsed_ms() -> Option<u64> {
        Some(ExponentialBackoff::DEFAULT_MAX_ELAPSED_TIME.as_millis() as u64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: backoff_defaults::initial_interval_ms(),
            multiplier: backoff_defaults::multiplier(),
            max_interval_ms: backoff_defaults::max_interval_ms(),
            max_attempts: backoff_defaults::max_attempts(),
            max_elapsed_ms: backoff_defaults::max_elapsed_ms(),
        }
    }
}

impl From<&BackoffConfig> for ExponentialBackoff {
    fn from(value: &BackoffConfig) -> Self {
        ExponentialBackoff::default()
            .with_initial_interval(Duration::from_millis(value.initial_interval_ms))
            .with_multiplier(value.multiplier)
            .with_max_interval(Duration::from_millis(value.max_interval_ms))
            .with_max_attempts(value.max_attempts)
            .with_max_elapsed_time(value.max_elapsed_ms.map(Duration::from_millis))
    }
}

pub mod config_defaults {
    use super::{ConfigError, LiteralOrEnv};
    use std::env::{self, VarError};
    use url::Url;

    pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:12345";
    pub const ENV_GATEWAY_URL: &str = "PAYMENT_GATEWAY_URL";
    pub const ENV_GATEWAY_TOKEN: &str = "PAYMENT_GATEWAY_TOKEN";
    pub const ENV_GATEWAY_TIMEOUT_MS: &str = "PAYMENT_GATEWAY_TIMEOUT_MS";

    /// Returns the gateway URL with fallback: $PAYMENT_GATEWAY_URL -> http://localhost:12345
    ///
    /// The default applies only when the variable is unset. A set but unparsable value is
    /// an error, never a silent switch to another host.
    pub fn default_gateway_url() -> Result<LiteralOrEnv<Url>, ConfigError> {
        let raw = match env::var(ENV_GATEWAY_URL) {
            Ok(raw) => raw,
            Err(VarError::NotPresent) => DEFAULT_GATEWAY_URL.to_string(),
            Err(VarError::NotUnicode(raw)) => raw.to_string_lossy().into_owned(),
        };
        raw.parse::<Url>()
            .map(LiteralOrEnv::from_literal)
            .map_err(|source| ConfigError::InvalidGatewayUrl { value: raw, source })
    }

    /// Returns the gateway token from $PAYMENT_GATEWAY_TOKEN, if set.
    pub fn default_token() -> Option<LiteralOrEnv<String>> {
        env::var(ENV_GATEWAY_TOKEN)
            .ok()
            .map(LiteralOrEnv::from_literal)
    }

    /// Returns the request timeout from $PAYMENT_GATEWAY_TIMEOUT_MS, if set and numeric.
    pub fn default_request_timeout_ms() -> Option<u64> {
        env::var(ENV_GATEWAY_TIMEOUT_MS)
            .ok()
            .and_then(|s| s.parse().ok())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid ${} value {value:?}: {source}", config_defaults::ENV_GATEWAY_URL)]
    InvalidGatewayUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Payment gateway token is not configured (set `token` or $PAYMENT_GATEWAY_TOKEN)")]
    MissingToken,
    #[error("Failed to build payment gateway client: {0}")]
    Gateway(#[from] crate::error::GatewayError),
}

impl Config {
    /// Get the gateway base URL.
    pub fn gateway_url(&self) -> &Url {
        self.gateway_url.inner()
    }

    /// Get the bearer token, if configured.
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.inner().as_str())
    }

    /// Get the per-request timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn pool(&self) -> &HttpPoolConfig {
        &self.pool
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::from(&self.backoff)
    }

    /// Builds a gateway client on top of the shared `http` client.
    pub fn gateway_client(&self, http: Client) -> Result<PaymentGatewayClient, ConfigError> {
        let token = self.token().ok_or(ConfigError::MissingToken)?;
        let client = PaymentGatewayClient::try_new(self.gateway_url().clone())?
            .with_client(http)
            .with_token(token);
        Ok(match self.request_timeout() {
            Some(timeout) => client.with_timeout(timeout),
            None => client,
        })
    }

    /// Load configuration from a JSON file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn restore_env(key: &str, original: Option<String>) {
        if let Some(value) = original {
            // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
            unsafe { env::set_var(key, value) };
        } else {
            // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn test_env_reference_syntax() {
        assert_eq!(env_reference("$TOKEN"), Some("TOKEN"));
        assert_eq!(env_reference("${GATEWAY_TOKEN}"), Some("GATEWAY_TOKEN"));
        assert_eq!(env_reference("$"), None);
        assert_eq!(env_reference("$not-a-var"), None);
        assert_eq!(env_reference("plain"), None);
    }

    #[test]
    fn test_literal_or_env_resolves_environment() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        let original = env::var("RPG_TEST_TOKEN").ok();
        // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
        unsafe { env::set_var("RPG_TEST_TOKEN", "from-env") };

        let braced: LiteralOrEnv<String> = serde_json::from_str(r#""${RPG_TEST_TOKEN}""#).unwrap();
        let simple: LiteralOrEnv<String> = serde_json::from_str(r#""$RPG_TEST_TOKEN""#).unwrap();
        let literal: LiteralOrEnv<String> = serde_json::from_str(r#""literal""#).unwrap();
        assert_eq!(braced.inner(), "from-env");
        assert_eq!(simple.inner(), "from-env");
        assert_eq!(literal.inner(), "literal");

        restore_env("RPG_TEST_TOKEN", original);
    }

    #[test]
    fn test_missing_env_reference_fails() {
        let result: Result<LiteralOrEnv<String>, _> =
            serde_json::from_str(r#""$RPG_TEST_SURELY_UNSET_VARIABLE""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_apply_to_empty_config() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        let original_url = env::var(config_defaults::ENV_GATEWAY_URL).ok();
        let original_token = env::var(config_defaults::ENV_GATEWAY_TOKEN).ok();
        let original_timeout = env::var(config_defaults::ENV_GATEWAY_TIMEOUT_MS).ok();
        // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
        unsafe {
            env::remove_var(config_defaults::ENV_GATEWAY_URL);
            env::remove_var(config_defaults::ENV_GATEWAY_TOKEN);
            env::remove_var(config_defaults::ENV_GATEWAY_TIMEOUT_MS);
        }

        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.gateway_url().as_str(), "http://localhost:12345/");
        assert_eq!(config.token(), None);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.pool(), &HttpPoolConfig::default());
        assert_eq!(config.backoff(), ExponentialBackoff::default());
        assert!(matches!(
            config.gateway_client(Client::new()),
            Err(ConfigError::MissingToken)
        ));

        restore_env(config_defaults::ENV_GATEWAY_URL, original_url);
        restore_env(config_defaults::ENV_GATEWAY_TOKEN, original_token);
        restore_env(config_defaults::ENV_GATEWAY_TIMEOUT_MS, original_timeout);
    }

    #[test]
    fn test_malformed_gateway_url_env_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        let original = env::var(config_defaults::ENV_GATEWAY_URL).ok();
        // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
        unsafe { env::set_var(config_defaults::ENV_GATEWAY_URL, "not a url") };

        let result: Result<Config, _> = serde_json::from_str(r#"{ "token": "secret" }"#);
        let explicit: Result<Config, _> =
            serde_json::from_str(r#"{ "gateway_url": "http://gateway.local", "token": "secret" }"#);

        restore_env(config_defaults::ENV_GATEWAY_URL, original);

        let err = result.unwrap_err().to_string();
        assert!(err.contains(config_defaults::ENV_GATEWAY_URL), "{err}");
        assert!(err.contains("not a url"), "{err}");
        assert_eq!(explicit.unwrap().gateway_url().as_str(), "http://gateway.local/");
    }

    #[test]
    fn test_full_config_builds_gateway_client() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway_url": "http://gateway.local:8080/v1",
                "token": "secret",
                "request_timeout_ms": 2500,
                "pool": { "max_idle_per_host": 64 },
                "backoff": { "initial_interval_ms": 10, "max_attempts": 3, "max_elapsed_ms": null }
            }"#,
        )
        .unwrap();
        assert_eq!(config.pool().max_idle_per_host, 64);
        assert_eq!(config.pool().idle_timeout_secs, 90);

        let backoff = config.backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(10));
        assert_eq!(backoff.max_attempts, 3);
        assert_eq!(backoff.max_elapsed_time, None);
        assert_eq!(backoff.multiplier, ExponentialBackoff::DEFAULT_MULTIPLIER);

        let client = config
            .gateway_client(config.pool().build_client().unwrap())
            .unwrap();
        assert_eq!(
            client.payments_url().as_str(),
            "http://gateway.local:8080/v1/payments"
        );
        assert_eq!(client.timeout(), &Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let result = Config::load_from_path(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::FileRead(..))));
    }
}
