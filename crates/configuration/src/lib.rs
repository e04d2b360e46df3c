use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use settings::{
    Config, DatabaseSettings, LoggingSettings, MarketDataSettings, MarketDataSource, PriceEntry,
    RuntimeSettings, ServerSettings,
};

/// Loads the application configuration.
///
/// Sources, lowest precedence first: built-in defaults, the TOML file (the given
/// path, which must exist, or an optional `arena.toml` in the working directory),
/// then `ARENA__SECTION__KEY` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder();
    let builder = match path {
        Some(path) => builder.add_source(config::File::from(path).required(true)),
        None => builder.add_source(config::File::with_name("arena").required(false)),
    };

    let settings = builder
        .add_source(
            config::Environment::with_prefix("ARENA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = settings.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;

    fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.market_data.source, MarketDataSource::Static);
        assert_eq!(config.runtime.default_agent_timeout_ms, 60_000);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let path = write_temp_config(
            "arena-config-override",
            r#"
            [database]
            primary_url = "sqlite://custom.db"

            [runtime]
            default_agent_timeout_ms = 1500

            [market_data]
            source = "static"

            [[market_data.prices]]
            symbol = "SOL/USD"
            price = 150.5
            "#,
        );

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.database.primary_url, "sqlite://custom.db");
        assert_eq!(config.runtime.default_agent_timeout_ms, 1500);
        assert_eq!(config.runtime.lease_ttl_secs, 600);
        assert_eq!(config.market_data.price_table().get("SOL/USD"), Some(&dec!(150.5)));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let path = write_temp_config(
            "arena-config-invalid",
            r#"
            [runtime]
            lease_ttl_secs = 0
            "#,
        );

        assert!(matches!(load_config(Some(&path)), Err(ConfigError::ValidationError(_))));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("arena-config-does-not-exist.toml");
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::LoadError(_))));
    }
}
