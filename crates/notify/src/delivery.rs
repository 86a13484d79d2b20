//! Per-job delivery worker
//!
//! Loads one notification job, resolves its recipient, attempts exactly one
//! send, and persists the resulting state transition. Retries are not looped
//! here: a transient failure pushes `next_attempt_at` into the future and the
//! job is picked up again by a later dispatch cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::contacts::ContactService;
use crate::error::{NotifyError, NotifyResult};
use crate::jobs::{JobContext, JobPayload, JobStatus, JobStore, RetryDecision};
use crate::providers::{EmailClient, ProviderConfig, TelegramClient};
use crate::subscriptions::NotificationMode;

/// Resolved delivery target for one job
#[derive(Debug, Clone)]
enum Recipient {
    Telegram { chat_id: String },
    Email { address: String },
}

/// Outcome of one delivery invocation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent {
        method: NotificationMode,
    },
    /// The job was already sent; nothing was mutated or re-sent.
    AlreadySent,
    /// `next_attempt_at` is still in the future; nothing was mutated.
    NotYetDue {
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt failed transiently; retry state has been persisted.
    Retrying {
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
    },
    /// The job is permanently failed.
    Failed {
        reason: String,
    },
}

/// Delivers notification jobs over the configured providers
#[derive(Clone)]
pub struct DeliveryWorker {
    jobs: JobStore,
    contacts: ContactService,
    telegram: TelegramClient,
    email: EmailClient,
}

impl DeliveryWorker {
    pub fn new(pool: PgPool, config: &ProviderConfig) -> Self {
        Self {
            jobs: JobStore::new(pool.clone()),
            contacts: ContactService::new(pool),
            telegram: TelegramClient::new(config),
            email: EmailClient::new(config),
        }
    }

    /// Deliver one job by id, applying the job state machine.
    ///
    /// Database failures propagate; everything that goes wrong with the job
    /// itself (bad payload, unresolved recipient, provider failure) is
    /// written back onto the row before the outcome is returned.
    pub async fn deliver(&self, job_id: Uuid) -> NotifyResult<DeliveryOutcome> {
        let now = Utc::now();

        let Some(job) = self.jobs.load_with_subscription(job_id).await? else {
            return Err(NotifyError::JobNotFound(job_id));
        };

        match job.status()? {
            JobStatus::Sent => {
                tracing::debug!(notification_id = %job.id, "Notification already sent");
                return Ok(DeliveryOutcome::AlreadySent);
            }
            JobStatus::Failed => {
                return Ok(DeliveryOutcome::Failed {
                    reason: job
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "permanently failed".to_string()),
                });
            }
            JobStatus::Pending => {}
        }

        // The dispatcher's query already filters on next_attempt_at; this
        // guard defends against duplicate or early direct invocations.
        if job.next_attempt_at > now {
            return Ok(DeliveryOutcome::NotYetDue {
                next_attempt_at: job.next_attempt_at,
            });
        }

        let (mode, payload) = match self.parse_job(&job) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A row that cannot be interpreted will never deliver.
                let reason = format!("invalid job data: {e}");
                self.jobs
                    .mark_failed(job.id, job.attempts_count + 1, &reason)
                    .await?;
                return Ok(DeliveryOutcome::Failed { reason });
            }
        };

        let Some(recipient) = self.resolve_recipient(mode, &payload).await? else {
            // Permanent condition: no retry can fix a missing contact.
            let reason = "no recipient resolved".to_string();
            self.jobs
                .mark_failed(job.id, job.attempts_count + 1, &reason)
                .await?;
            tracing::warn!(
                notification_id = %job.id,
                subscription = %job.subscription_name,
                mode = %mode,
                "No recipient resolved; notification failed permanently"
            );
            return Ok(DeliveryOutcome::Failed { reason });
        };

        let text = render_message(&payload, job.service_url.as_deref());
        let send_error = self
            .attempt_send(&recipient, &payload.title, &text)
            .await
            .err();

        match send_error {
            None => {
                self.jobs.mark_sent(job.id, now).await?;
                tracing::info!(
                    notification_id = %job.id,
                    subscription = %job.subscription_name,
                    method = %mode,
                    "Notification delivered"
                );
                Ok(DeliveryOutcome::Sent { method: mode })
            }
            Some(error) => {
                match RetryDecision::after_failure(job.attempts_count, job.max_attempts, now) {
                    RetryDecision::Retry {
                        attempts,
                        next_attempt_at,
                    } => {
                        let message = format!(
                            "attempt {attempts} failed: {error}; next retry at {next_attempt_at}"
                        );
                        self.jobs
                            .record_retry(job.id, attempts, next_attempt_at, &message)
                            .await?;
                        tracing::warn!(
                            notification_id = %job.id,
                            attempts = attempts,
                            next_attempt_at = %next_attempt_at,
                            error = %error,
                            "Delivery attempt failed; will retry"
                        );
                        Ok(DeliveryOutcome::Retrying {
                            attempts,
                            next_attempt_at,
                        })
                    }
                    RetryDecision::GiveUp { attempts } => {
                        let message = format!(
                            "max attempts ({}) exhausted; last error: {error}",
                            job.max_attempts
                        );
                        self.jobs.mark_failed(job.id, attempts, &message).await?;
                        tracing::error!(
                            notification_id = %job.id,
                            attempts = attempts,
                            error = %error,
                            "Delivery failed permanently"
                        );
                        Ok(DeliveryOutcome::Failed { reason: message })
                    }
                }
            }
        }
    }

    fn parse_job(&self, job: &JobContext) -> NotifyResult<(NotificationMode, JobPayload)> {
        let mode: NotificationMode = job.notification_mode.parse()?;
        let payload = job.payload()?;
        Ok((mode, payload))
    }

    /// Resolve the delivery target for the job's notification mode.
    ///
    /// Telegram prefers an explicit chat id in the payload over the linked
    /// contact. `None` means the recipient cannot be resolved at all, which
    /// is a permanent failure.
    async fn resolve_recipient(
        &self,
        mode: NotificationMode,
        payload: &JobPayload,
    ) -> NotifyResult<Option<Recipient>> {
        match mode {
            NotificationMode::Telegram => {
                if let Some(chat_id) = payload.chat_id.clone() {
                    return Ok(Some(Recipient::Telegram { chat_id }));
                }
                Ok(self
                    .contacts
                    .telegram_chat_id(payload.user_id)
                    .await?
                    .map(|chat_id| Recipient::Telegram { chat_id }))
            }
            NotificationMode::Email => Ok(self
                .contacts
                .email_address(payload.user_id)
                .await?
                .map(|address| Recipient::Email { address })),
        }
    }

    /// Exactly one provider call. Non-2xx verdicts and transport errors both
    /// come back as a descriptive error string for the retry path.
    async fn attempt_send(
        &self,
        recipient: &Recipient,
        subject: &str,
        text: &str,
    ) -> Result<(), String> {
        let (channel, result) = match recipient {
            Recipient::Telegram { chat_id } => {
                ("telegram", self.telegram.send_message(chat_id, text).await)
            }
            Recipient::Email { address } => {
                ("email", self.email.send(address, subject, text).await)
            }
        };

        match result {
            Ok(response) if response.ok => Ok(()),
            Ok(response) => Err(format!(
                "{}_{}: {}",
                channel, response.status, response.body
            )),
            Err(e) => Err(format!("{channel} send error: {e}")),
        }
    }
}

/// Render the outbound message text: title, body, and an optional service
/// link, separated by blank lines.
pub fn render_message(payload: &JobPayload, fallback_url: Option<&str>) -> String {
    let mut lines: Vec<String> = Vec::new();
    if !payload.title.is_empty() {
        lines.push(payload.title.clone());
    }
    if !payload.body.is_empty() {
        lines.push(payload.body.clone());
    }
    if let Some(url) = payload.url.as_deref().or(fallback_url) {
        lines.push(format!("Link: {url}"));
    }
    let text = lines.join("\n\n");
    if text.is_empty() {
        "Subscription reminder".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> JobPayload {
        JobPayload {
            title: "Subscription renewal: Streamflix".to_string(),
            body: "Streamflix renews on 2025-06-01 (UTC)".to_string(),
            subscription_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            chat_id: None,
            url: None,
        }
    }

    #[test]
    fn render_joins_title_body_and_link() {
        let mut p = payload();
        p.url = Some("https://streamflix.example".to_string());
        let text = render_message(&p, None);
        assert_eq!(
            text,
            "Subscription renewal: Streamflix\n\n\
             Streamflix renews on 2025-06-01 (UTC)\n\n\
             Link: https://streamflix.example"
        );
    }

    #[test]
    fn render_falls_back_to_subscription_url() {
        let text = render_message(&payload(), Some("https://svc.example"));
        assert!(text.ends_with("Link: https://svc.example"));
    }

    #[test]
    fn render_never_produces_empty_text() {
        let mut p = payload();
        p.title.clear();
        p.body.clear();
        assert_eq!(render_message(&p, None), "Subscription reminder");
    }
}
