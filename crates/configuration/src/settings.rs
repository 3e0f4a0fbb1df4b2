use crate::error::ConfigError;
use core_types::{AccountId, MarketType};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub accounts: Vec<AccountConfig>,
}

/// Where the telemetry store lives.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite file. Created on first start if missing.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Log sink settings. Output always goes to stdout and to a rolling file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_file")]
    pub file_name: String,
    #[serde(default)]
    pub rotation: LogRotation,
    /// How many rotated files to keep around.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// An `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// One monitored exchange account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Storage namespace and log label for this account.
    pub id: AccountId,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default)]
    pub market_type: MarketType,
    /// Use the exchange's test environment instead of production.
    #[serde(default)]
    pub sandbox: bool,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Name of the environment variable holding the API secret.
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    /// Seconds between two polls of this account.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Outbound HTTP(S) proxy, e.g. "http://127.0.0.1:7890".
    #[serde(default)]
    pub proxy: Option<String>,
    /// The currency whose balance total is recorded as equity.
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Escalate in the logs after this many consecutive failed polls.
    #[serde(default)]
    pub alert_after_failures: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A resolved API key pair. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeys {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// --- Default Implementations ---

fn default_database_path() -> PathBuf {
    PathBuf::from("trading_data.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file() -> String {
    "binance_monitor.log".to_string()
}

fn default_max_files() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_api_key_env() -> String {
    "BINANCE_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "BINANCE_API_SECRET".to_string()
}

fn default_interval_secs() -> u64 {
    15
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_name: default_log_file(),
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            level: default_log_level(),
        }
    }
}

impl Config {
    /// The accounts that should actually be polled.
    pub fn enabled_accounts(&self) -> impl Iterator<Item = &AccountConfig> {
        self.accounts.iter().filter(|a| a.enabled)
    }

    /// Looks up an account by id, enabled or not.
    pub fn account(&self, id: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.id.as_str() == id)
    }

    /// Checks the cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::ValidationError(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        if self.enabled_accounts().next().is_none() {
            return Err(ConfigError::ValidationError(
                "at least one enabled [[accounts]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate account id '{}'",
                    account.id
                )));
            }
            account.validate()?;
        }
        Ok(())
    }
}

impl AccountConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| {
            Err(ConfigError::ValidationError(format!(
                "account '{}': {}",
                self.id, msg
            )))
        };

        if !self.exchange.eq_ignore_ascii_case("binance") {
            return invalid(&format!("unsupported exchange '{}'", self.exchange));
        }
        if self.interval_secs == 0 {
            return invalid("interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be greater than zero");
        }
        if self.quote_currency.trim().is_empty() {
            return invalid("quote_currency must not be empty");
        }
        if self.sandbox && self.market_type == MarketType::PortfolioMargin {
            return invalid("portfolio_margin accounts have no sandbox environment");
        }
        if self.alert_after_failures == Some(0) {
            return invalid("alert_after_failures must be at least 1 when set");
        }
        Ok(())
    }

    /// Resolves the API key pair from the process environment.
    pub fn credentials(&self) -> Result<ApiKeys, ConfigError> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Resolves the API key pair through an arbitrary variable lookup.
    pub fn credentials_with<F>(&self, lookup: F) -> Result<ApiKeys, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(name.to_string()))
        };

        Ok(ApiKeys {
            key: read(&self.api_key_env)?,
            secret: read(&self.api_secret_env)?,
        })
    }
}
