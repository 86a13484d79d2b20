//! Server configuration
//!
//! All environment access happens here, once, at startup. Provider
//! credentials are handed onward as an explicit [`ProviderConfig`] so the
//! delivery path never touches the environment itself.

use std::time::Duration;

use subwatch_notify::providers::{ProviderConfig, TELEGRAM_API_BASE};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret for the cron-facing workflow endpoints. Unset disables
    /// the check (local development).
    pub dispatch_token: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub send_timeout_secs: u64,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let bind_address = optional_var("BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let send_timeout_secs = optional_var("SEND_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SEND_TIMEOUT_SECS);

        Ok(Self {
            database_url,
            bind_address,
            dispatch_token: optional_var("DISPATCH_TOKEN"),
            telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
            email_api_url: optional_var("EMAIL_API_URL"),
            email_api_key: optional_var("EMAIL_API_KEY"),
            email_from: optional_var("EMAIL_FROM"),
            send_timeout_secs,
        })
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            telegram_bot_token: self.telegram_bot_token.clone(),
            telegram_api_base: TELEGRAM_API_BASE.to_string(),
            email_endpoint: self.email_api_url.clone(),
            email_api_key: self.email_api_key.clone(),
            email_from: self.email_from.clone(),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "DATABASE_URL",
            "BIND_ADDRESS",
            "DISPATCH_TOKEN",
            "TELEGRAM_BOT_TOKEN",
            "EMAIL_API_URL",
            "EMAIL_API_KEY",
            "EMAIL_FROM",
            "SEND_TIMEOUT_SECS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn requires_database_url() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/subwatch");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.send_timeout_secs, DEFAULT_SEND_TIMEOUT_SECS);
        assert!(config.dispatch_token.is_none());

        let providers = config.provider_config();
        assert!(providers.telegram_bot_token.is_none());
        assert_eq!(providers.send_timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn empty_optional_vars_count_as_unset() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/subwatch");
        std::env::set_var("TELEGRAM_BOT_TOKEN", "");
        let config = Config::from_env().unwrap();
        assert!(config.telegram_bot_token.is_none());
    }
}
