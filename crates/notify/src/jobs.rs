//! Notification job store
//!
//! One pending reminder job per subscription, kept in the `notifications`
//! table. The pending row is claimed by a partial unique index on
//! `(subscription_id) WHERE status = 'pending'`, and every reschedule is a
//! single upsert against that index, so the at-most-one-pending invariant
//! holds structurally. Terminal `sent`/`failed` rows stay behind as history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{NotifyError, NotifyResult};
use crate::schedule;
use crate::subscriptions::Subscription;

/// Lifecycle state of a notification job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "sent" => Ok(JobStatus::Sent),
            "failed" => Ok(JobStatus::Failed),
            other => Err(NotifyError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// Rendered message content plus recipient-resolution hints, stored as the
/// job's `payload_json` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub title: String,
    pub body: String,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    /// Explicit Telegram chat id; takes precedence over the contact lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Service link appended to the rendered message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl JobPayload {
    /// Build the renewal-reminder payload for a subscription.
    pub fn renewal_reminder(sub: &Subscription) -> Self {
        Self {
            title: format!("Subscription renewal: {}", sub.name),
            body: format!(
                "{} renews on {} ({})",
                sub.name, sub.next_payment_date, sub.timezone
            ),
            subscription_id: sub.id,
            user_id: sub.created_by,
            chat_id: None,
            url: sub.service_url.clone(),
        }
    }
}

/// What to do with a pending job after a failed delivery attempt.
///
/// The retry loop lives across dispatch cycles: each failure either pushes
/// `next_attempt_at` out by `2^attempts` minutes (2, 4, 8, 16 for attempts
/// 1 through 4 with the default `max_attempts` of 5) or, once the incremented
/// attempt count reaches `max_attempts`, gives up for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
    },
    GiveUp {
        attempts: i32,
    },
}

impl RetryDecision {
    pub fn after_failure(attempts_count: i32, max_attempts: i32, now: DateTime<Utc>) -> Self {
        let attempts = attempts_count + 1;
        if attempts >= max_attempts {
            RetryDecision::GiveUp { attempts }
        } else {
            let backoff_minutes = 2i64.saturating_pow(attempts.clamp(0, 30) as u32);
            RetryDecision::Retry {
                attempts,
                next_attempt_at: now + Duration::minutes(backoff_minutes),
            }
        }
    }
}

/// A notification job joined with the parent subscription's delivery columns
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobContext {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub status: String,
    pub scheduled_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub attempts_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub payload_json: serde_json::Value,
    pub notification_mode: String,
    pub subscription_name: String,
    pub service_url: Option<String>,
    pub created_by: Uuid,
}

impl JobContext {
    pub fn status(&self) -> NotifyResult<JobStatus> {
        self.status.parse()
    }

    pub fn payload(&self) -> NotifyResult<JobPayload> {
        serde_json::from_value(self.payload_json.clone())
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))
    }
}

/// Row shape for the monitoring endpoint
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobSummary {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub status: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub attempts_count: i32,
    pub last_error: Option<String>,
}

/// Persistence for notification jobs
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Schedule (or reschedule) the reminder for a subscription.
    ///
    /// Computes the due instant from the subscription's payment date, zone
    /// and offset, then upserts the single pending row: an existing pending
    /// job is rewritten in place with a reset attempt counter.
    pub async fn schedule_reminder(&self, sub: &Subscription) -> NotifyResult<Uuid> {
        let zone = sub.zone()?;
        let offset = sub.offset()?;
        let scheduled = schedule::scheduled_instant(sub.next_payment_date, zone, offset);
        let payload = serde_json::to_value(JobPayload::renewal_reminder(sub))
            .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO notifications
                (subscription_id, status, scheduled_at, next_attempt_at, payload_json)
            VALUES ($1, 'pending', $2, $2, $3)
            ON CONFLICT (subscription_id) WHERE status = 'pending' DO UPDATE SET
                scheduled_at = EXCLUDED.scheduled_at,
                next_attempt_at = EXCLUDED.next_attempt_at,
                attempts_count = 0,
                last_error = NULL,
                payload_json = EXCLUDED.payload_json,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(sub.id)
        .bind(scheduled)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            subscription_id = %sub.id,
            notification_id = %id,
            scheduled_at = %scheduled,
            "Reminder scheduled"
        );
        Ok(id)
    }

    /// Drop the pending job for a subscription, if any. Returns the number
    /// of rows removed.
    pub async fn cancel_pending(&self, subscription_id: Uuid) -> NotifyResult<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE subscription_id = $1 AND status = 'pending'",
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Ids of pending jobs whose next attempt is due.
    pub async fn due(&self, now: DateTime<Utc>, limit: i64) -> NotifyResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM notifications
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Load a job together with the parent subscription's delivery columns.
    pub async fn load_with_subscription(&self, id: Uuid) -> NotifyResult<Option<JobContext>> {
        let row: Option<JobContext> = sqlx::query_as(
            r#"
            SELECT n.id, n.subscription_id, n.status, n.scheduled_at,
                   n.next_attempt_at, n.attempts_count, n.max_attempts,
                   n.last_error, n.sent_at, n.payload_json,
                   s.notification_mode, s.name AS subscription_name,
                   s.service_url, s.created_by
            FROM notifications n
            JOIN subscriptions s ON s.id = n.subscription_id
            WHERE n.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> NotifyResult<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'sent', sent_at = $2, last_error = NULL,
                attempts_count = attempts_count + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_retry(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> NotifyResult<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET attempts_count = $2, next_attempt_at = $3, last_error = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, attempts: i32, last_error: &str) -> NotifyResult<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed', attempts_count = $2, last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent jobs, newest first, for the monitoring endpoint.
    pub async fn recent(&self, limit: i64) -> NotifyResult<Vec<JobSummary>> {
        let rows: Vec<JobSummary> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, status, scheduled_at, sent_at,
                   attempts_count, last_error
            FROM notifications
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Delete terminal rows older than the retention window. Returns the
    /// number of rows removed.
    pub async fn purge_terminal_older_than(&self, days: i32) -> NotifyResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE status IN ('sent', 'failed')
              AND created_at < NOW() - make_interval(days => $1)
            "#,
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn job_status_round_trips() {
        for status in [JobStatus::Pending, JobStatus::Sent, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("inflight".parse::<JobStatus>().is_err());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let now = utc("2025-06-01T10:00:00Z");
        for (attempts_before, expected_minutes) in [(0, 2), (1, 4), (2, 8), (3, 16)] {
            match RetryDecision::after_failure(attempts_before, 5, now) {
                RetryDecision::Retry {
                    attempts,
                    next_attempt_at,
                } => {
                    assert_eq!(attempts, attempts_before + 1);
                    assert_eq!(next_attempt_at, now + Duration::minutes(expected_minutes));
                }
                RetryDecision::GiveUp { .. } => panic!("should retry"),
            }
        }
    }

    #[test]
    fn final_attempt_gives_up() {
        let now = utc("2025-06-01T10:00:00Z");
        assert_eq!(
            RetryDecision::after_failure(4, 5, now),
            RetryDecision::GiveUp { attempts: 5 }
        );
    }

    #[test]
    fn single_attempt_jobs_never_retry() {
        let now = utc("2025-06-01T10:00:00Z");
        assert_eq!(
            RetryDecision::after_failure(0, 1, now),
            RetryDecision::GiveUp { attempts: 1 }
        );
    }

    #[test]
    fn payload_serde_round_trips() {
        let payload = JobPayload {
            title: "Subscription renewal: Streamflix".to_string(),
            body: "Streamflix renews on 2025-06-01 (America/New_York)".to_string(),
            subscription_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            chat_id: Some("123456".to_string()),
            url: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("url").is_none());
        let back: JobPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.title, payload.title);
        assert_eq!(back.chat_id, payload.chat_id);
    }
}
