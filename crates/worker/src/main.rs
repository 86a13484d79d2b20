//! Subwatch Background Worker
//!
//! Handles scheduled jobs including:
//! - Notification dispatch cycle: renewal advancement + due-job delivery (every minute)
//! - Terminal notification cleanup based on the retention window (daily at 3:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use subwatch_notify::providers::{ProviderConfig, TELEGRAM_API_BASE};
use subwatch_notify::NotifyService;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Days to keep sent/failed notification rows before the daily purge.
const DEFAULT_RETENTION_DAYS: i32 = 90;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Assemble provider configuration from the environment, once, at startup.
fn provider_config_from_env() -> ProviderConfig {
    let send_timeout_secs = optional_var("SEND_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    ProviderConfig {
        telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
        telegram_api_base: TELEGRAM_API_BASE.to_string(),
        email_endpoint: optional_var("EMAIL_API_URL"),
        email_api_key: optional_var("EMAIL_API_KEY"),
        email_from: optional_var("EMAIL_FROM"),
        send_timeout: Duration::from_secs(send_timeout_secs),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Subwatch Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Create the notification service
    let notify = Arc::new(NotifyService::new(pool, provider_config_from_env()));

    let retention_days: i32 = optional_var("NOTIFICATION_RETENTION_DAYS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS);

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Dispatch cycle (every minute)
    // Renews overdue subscriptions, then delivers every due notification.
    let dispatch_notify = notify.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let notify = dispatch_notify.clone();
            Box::pin(async move {
                match notify.dispatcher.run_cycle().await {
                    Ok(summary) => {
                        if summary.renewed > 0 || summary.dispatched > 0 {
                            info!(
                                renewed = summary.renewed,
                                dispatched = summary.dispatched,
                                "Dispatch cycle complete"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Dispatch cycle failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Notification dispatch cycle (every minute)");

    // Job 2: Cleanup old terminal notifications (daily at 3:00 AM UTC)
    let cleanup_notify = notify.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let notify = cleanup_notify.clone();
            Box::pin(async move {
                info!("Running notification cleanup");
                match notify.jobs.purge_terminal_older_than(retention_days).await {
                    Ok(deleted) => info!(deleted = deleted, "Notification cleanup complete"),
                    Err(e) => error!(error = %e, "Notification cleanup failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Notification cleanup (daily at 3:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Subwatch Worker started successfully with 3 scheduled jobs");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
