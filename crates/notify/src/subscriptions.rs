//! Subscription records
//!
//! The CRUD surface for subscriptions lives outside this service; here we
//! only read the columns the scheduling core needs and advance
//! `next_payment_date` during renewal. The enum-valued columns are stored as
//! TEXT and parsed at the boundary; rows that fail to parse are data errors,
//! skipped in batch paths and rejected in request paths.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{NotifyError, NotifyResult};
use crate::schedule::{self, BillingCycle, ReminderOffset};

/// Delivery channel for a subscription's reminders
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    Telegram,
    Email,
}

impl NotificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMode::Telegram => "telegram",
            NotificationMode::Email => "email",
        }
    }
}

impl std::fmt::Display for NotificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationMode {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(NotificationMode::Telegram),
            "email" => Ok(NotificationMode::Email),
            other => Err(NotifyError::InvalidNotificationMode(other.to_string())),
        }
    }
}

/// A subscription row, as the scheduling core sees it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_cycle: String,
    pub next_payment_date: NaiveDate,
    pub timezone: String,
    pub notification_mode: String,
    pub reminder_offset: String,
    pub service_url: Option<String>,
}

impl Subscription {
    pub fn cycle(&self) -> NotifyResult<BillingCycle> {
        self.billing_cycle.parse()
    }

    pub fn zone(&self) -> NotifyResult<Tz> {
        schedule::parse_zone(&self.timezone)
    }

    pub fn mode(&self) -> NotifyResult<NotificationMode> {
        self.notification_mode.parse()
    }

    pub fn offset(&self) -> NotifyResult<ReminderOffset> {
        self.reminder_offset.parse()
    }
}

/// Read/update access to the subscriptions table
#[derive(Clone)]
pub struct SubscriptionStore {
    pool: PgPool,
}

impl SubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Candidates for renewal: subscriptions whose payment date may have
    /// passed. The date column carries no zone, so the SQL filter
    /// over-fetches by one calendar day (no UTC offset exceeds 14 hours);
    /// callers make the precise zone-aware local-midnight check per row.
    pub async fn find_renewal_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> NotifyResult<Vec<Subscription>> {
        let cutoff = (now + Duration::hours(14)).date_naive();
        let rows: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT id, created_by, name, price_cents, currency, billing_cycle,
                   next_payment_date, timezone, notification_mode,
                   reminder_offset, service_url
            FROM subscriptions
            WHERE next_payment_date <= $1
            ORDER BY next_payment_date
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_by_id(&self, id: Uuid) -> NotifyResult<Option<Subscription>> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT id, created_by, name, price_cents, currency, billing_cycle,
                   next_payment_date, timezone, notification_mode,
                   reminder_offset, service_url
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn set_next_payment_date(&self, id: Uuid, date: NaiveDate) -> NotifyResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET next_payment_date = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_mode_round_trips() {
        assert_eq!(
            "telegram".parse::<NotificationMode>().unwrap(),
            NotificationMode::Telegram
        );
        assert_eq!(
            "email".parse::<NotificationMode>().unwrap(),
            NotificationMode::Email
        );
        assert!("sms".parse::<NotificationMode>().is_err());
    }

    #[test]
    fn typed_accessors_reject_bad_rows() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            name: "Streamflix".to_string(),
            price_cents: 1499,
            currency: "USD".to_string(),
            billing_cycle: "fortnightly".to_string(),
            next_payment_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            timezone: "Mars/Olympus".to_string(),
            notification_mode: "telegram".to_string(),
            reminder_offset: "1d".to_string(),
            service_url: None,
        };
        assert!(sub.cycle().is_err());
        assert!(sub.zone().is_err());
        assert!(sub.mode().is_ok());
        assert!(sub.offset().is_ok());
    }
}
