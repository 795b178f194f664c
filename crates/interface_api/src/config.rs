//! API configuration

use serde::Deserialize;
use std::time::Duration;

use core_kernel::{CoreError, Currency, Timezone};
use domain_ledger::LedgerSettings;

/// Where ledger entries are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process memory; lost on restart
    Memory,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    pub storage: StorageBackend,
    /// Upper bound on waiting for a customer's ledger lock
    pub lock_timeout_ms: u64,
    /// ISO 4217 code amounts are rounded to
    pub currency: String,
    /// IANA zone used for report periods
    pub timezone: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/brickbook".to_string(),
            log_level: "info".to_string(),
            storage: StorageBackend::Postgres,
            lock_timeout_ms: 5000,
            currency: "INR".to_string(),
            timezone: "Asia/Kolkata".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables
    ///
    /// Unset keys keep their defaults. `DATABASE_URL` is honoured when
    /// `API_DATABASE_URL` is absent.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("jwt_expiration_secs", defaults.jwt_expiration_secs)?
            .set_default(
                "database_url",
                std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            )?
            .set_default("log_level", defaults.log_level)?
            .set_default("storage", "postgres")?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms)?
            .set_default("currency", defaults.currency)?
            .set_default("timezone", defaults.timezone)?
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Ledger settings derived from this configuration
    pub fn ledger_settings(&self) -> Result<LedgerSettings, CoreError> {
        let currency: Currency = self.currency.parse()?;
        Ok(LedgerSettings {
            currency,
            lock_timeout: self.lock_timeout(),
        })
    }

    pub fn business_timezone(&self) -> Result<Timezone, CoreError> {
        Ok(self.timezone.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let config = ApiConfig::default();
        let settings = config.ledger_settings().unwrap();
        assert_eq!(settings.currency, Currency::INR);
        assert_eq!(settings.lock_timeout, Duration::from_millis(5000));
        assert_eq!(config.business_timezone().unwrap().to_string(), "Asia/Kolkata");
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_unknown_currency_is_rejected() {
        let config = ApiConfig {
            currency: "XYZ".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.ledger_settings().is_err());
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = ApiConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.business_timezone().is_err());
    }
}
