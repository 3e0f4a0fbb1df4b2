use crate::error::ConfigError;
use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{AccountConfig, ApiKeys, DatabaseConfig, LogRotation, LoggingConfig};

/// Loads the application configuration from the `config.toml` file.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads and validates the configuration from `path`.
///
/// Values can be overridden through `MONITOR__`-prefixed environment
/// variables, e.g. `MONITOR__DATABASE__PATH=/var/lib/monitor.db`.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix("MONITOR")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    finish(builder)
}

/// Parses a TOML document directly. Used by tests and tooling.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    finish(builder)
}

fn finish(builder: config::Config) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::MarketType;
    use std::collections::HashMap;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [[accounts]]
        id = "binance1"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.database.path.to_str(), Some("trading_data.db"));
        assert_eq!(config.logging.file_name, "binance_monitor.log");
        assert_eq!(config.logging.rotation, LogRotation::Daily);

        let account = &config.accounts[0];
        assert_eq!(account.id.as_str(), "binance1");
        assert_eq!(account.market_type, MarketType::UsdmFutures);
        assert_eq!(account.interval_secs, 15);
        assert_eq!(account.quote_currency, "USDT");
        assert_eq!(account.api_key_env, "BINANCE_API_KEY");
        assert!(account.proxy.is_none());
        assert!(account.enabled);
    }

    #[test]
    fn full_account_block_parses() {
        let config = load_config_from_str(
            r#"
            [database]
            path = "/tmp/telemetry.db"

            [logging]
            directory = "/var/log/monitor"
            rotation = "hourly"
            max_files = 7
            level = "debug"

            [[accounts]]
            id = "binance1"
            market_type = "portfolio_margin"
            api_key_env = "UNI_KEY"
            api_secret_env = "UNI_SECRET"
            interval_secs = 30
            proxy = "http://127.0.0.1:7890"
            alert_after_failures = 5

            [[accounts]]
            id = "binance2"
            sandbox = true
            enabled = false
            "#,
        )
        .unwrap();

        let first = &config.accounts[0];
        assert_eq!(first.market_type, MarketType::PortfolioMargin);
        assert_eq!(first.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(first.alert_after_failures, Some(5));
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
        assert_eq!(config.enabled_accounts().count(), 1);
        assert!(config.account("binance2").is_some_and(|a| a.sandbox));
    }

    #[test]
    fn rejects_invalid_account_id() {
        let err = load_config_from_str(
            r#"
            [[accounts]]
            id = "binance-1; DROP TABLE x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)), "{err}");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = load_config_from_str(
            r#"
            [[accounts]]
            id = "binance1"
            [[accounts]]
            id = "binance1"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate account id"), "{err}");
    }

    #[test]
    fn rejects_zero_interval_and_sandboxed_portfolio_margin() {
        let zero = load_config_from_str(
            r#"
            [[accounts]]
            id = "a"
            interval_secs = 0
            "#,
        );
        assert!(matches!(zero, Err(ConfigError::ValidationError(_))));

        let pm = load_config_from_str(
            r#"
            [[accounts]]
            id = "a"
            market_type = "portfolio_margin"
            sandbox = true
            "#,
        );
        assert!(matches!(pm, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn requires_an_enabled_account() {
        let err = load_config_from_str(
            r#"
            [[accounts]]
            id = "a"
            enabled = false
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn credentials_come_from_the_named_variables() {
        let config = load_config_from_str(MINIMAL).unwrap();
        let env: HashMap<&str, &str> =
            HashMap::from([("BINANCE_API_KEY", "key-123"), ("BINANCE_API_SECRET", " s3cret ")]);

        let keys = config.accounts[0]
            .credentials_with(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(keys.key, "key-123");
        assert_eq!(keys.secret, "s3cret");
        assert!(!format!("{keys:?}").contains("s3cret"));
    }

    #[test]
    fn missing_or_blank_credential_names_the_variable() {
        let config = load_config_from_str(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([("BINANCE_API_KEY", "key"), ("BINANCE_API_SECRET", "  ")]);

        let err = config.accounts[0]
            .credentials_with(|name| env.get(name).map(|v| v.to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(ref v) if v == "BINANCE_API_SECRET"));
    }

    #[test]
    fn loads_from_a_file_on_disk() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.accounts.len(), 1);
    }
}
