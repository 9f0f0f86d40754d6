//! Application configuration.
//!
//! Loaded in layers:
//! 1. Default values in code
//! 2. `config/<environment>.toml` (optional)
//! 3. Environment variables with the `STOCKLEDGER_` prefix, `__` between levels
//!    (e.g. `STOCKLEDGER_ENGINE__LOCK_TIMEOUT_MS=500`)

use std::path::PathBuf;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use stockledger_infra::EngineConfig;
use stockledger_observability::LogSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Current environment (development, production, test)
    pub environment: String,

    pub server: ServerConfig,

    pub store: StoreConfig,

    /// Required when `store.backend = "postgres"`.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    /// JSON seed for the in-memory catalog.
    pub seed_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("STOCKLEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("store.backend", "memory")?
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("STOCKLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.store.backend, &self.database) {
            (StoreBackend::Postgres, None) => Err(ConfigError::Message(
                "store.backend = postgres requires database.url".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<AppConfig, ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn engine_section_is_optional() {
        let cfg = parse(
            r#"
            environment = "test"
            [server]
            host = "127.0.0.1"
            port = 9000
            [store]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
        assert!(cfg.catalog.seed_path.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn engine_overrides_and_postgres_needs_database() {
        let cfg = parse(
            r#"
            environment = "test"
            [server]
            host = "0.0.0.0"
            port = 8080
            [store]
            backend = "postgres"
            [engine]
            lock_timeout_ms = 250
            adjustment_policy = "reject_on_drift"
            [engine.retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(cfg.engine.lock_timeout_ms, 250);
        assert_eq!(cfg.engine.retry.max_attempts, 2);
        assert_eq!(
            cfg.engine.adjustment_policy,
            stockledger_inventory::StalePolicy::RejectOnDrift
        );
        assert!(cfg.validate().is_err());
    }
}
