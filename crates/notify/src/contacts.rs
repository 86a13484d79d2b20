//! Contact resolution and Telegram account linking
//!
//! Delivery needs a concrete recipient: a linked Telegram chat id or the
//! account email from the identity provider's profile row. Linking itself is
//! a short token handshake: the app issues a one-hour token, the Telegram
//! bot posts it back together with the chat id.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::NotifyResult;

/// Lifetime of a Telegram link token
const LINK_TOKEN_TTL_HOURS: i64 = 1;

/// Looks up delivery recipients and manages Telegram links
#[derive(Clone)]
pub struct ContactService {
    pool: PgPool,
}

impl ContactService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Linked Telegram chat id for a user, if any.
    pub async fn telegram_chat_id(&self, user_id: Uuid) -> NotifyResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT contact_id
            FROM user_contacts
            WHERE user_id = $1 AND provider = 'telegram'
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(chat_id,)| chat_id))
    }

    /// Registered email address for a user, if any.
    pub async fn email_address(&self, user_id: Uuid) -> NotifyResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT email FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(email,)| email))
    }

    /// Issue a fresh link token for a user, replacing any previous one.
    pub async fn create_link_token(&self, user_id: Uuid) -> NotifyResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::hours(LINK_TOKEN_TTL_HOURS);

        sqlx::query("DELETE FROM telegram_link_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO telegram_link_tokens (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Finalize a Telegram link: verify the token is unexpired, upsert the
    /// contact, and burn the token. Returns the linked user id, or `None`
    /// when the token is unknown or expired.
    pub async fn link_telegram(&self, token: &str, chat_id: &str) -> NotifyResult<Option<Uuid>> {
        let now = Utc::now();
        let row: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, expires_at
            FROM telegram_link_tokens
            WHERE token = $1 AND expires_at >= $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, _expires_at)) = row else {
            tracing::warn!("Invalid or expired Telegram link token");
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO user_contacts (user_id, provider, contact_type, contact_id)
            VALUES ($1, 'telegram', 'chat_id', $2)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                contact_type = EXCLUDED.contact_type,
                contact_id = EXCLUDED.contact_id
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM telegram_link_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        tracing::info!(user_id = %user_id, "Telegram contact linked");
        Ok(Some(user_id))
    }
}
