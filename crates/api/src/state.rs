//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use subwatch_notify::NotifyService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub notify: Arc<NotifyService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let notify = Arc::new(NotifyService::new(pool, config.provider_config()));

        if config.telegram_bot_token.is_some() {
            tracing::info!("Telegram notifications enabled");
        } else {
            tracing::warn!("Telegram notifications not configured (missing TELEGRAM_BOT_TOKEN)");
        }
        if config.email_api_url.is_some() {
            tracing::info!("Email notifications enabled");
        } else {
            tracing::warn!(
                "Email notifications not configured (missing EMAIL_API_URL) - running in no-op mode"
            );
        }
        if config.dispatch_token.is_none() {
            tracing::warn!("DISPATCH_TOKEN not set - workflow endpoints are unauthenticated");
        }

        Self { config, notify }
    }
}
