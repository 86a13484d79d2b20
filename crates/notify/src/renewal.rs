//! Renewal advancer
//!
//! Scans subscriptions whose payment date has passed, advances each to the
//! first future occurrence of its billing cycle, audits the change, and
//! reschedules the reminder job. One bad row never aborts the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::audit::AuditLogger;
use crate::error::NotifyResult;
use crate::jobs::JobStore;
use crate::schedule;
use crate::subscriptions::{Subscription, SubscriptionStore};

/// Subscriptions examined per dispatch cycle
const RENEWAL_BATCH_SIZE: i64 = 50;

/// Result of one renewal pass
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RenewalSummary {
    /// Rows matched by the (over-fetching) due query.
    pub scanned: usize,
    /// Subscriptions actually advanced.
    pub renewed: usize,
}

/// Advances overdue subscriptions and re-derives their reminder schedule
#[derive(Clone)]
pub struct RenewalService {
    subscriptions: SubscriptionStore,
    jobs: JobStore,
    audit: AuditLogger,
}

impl RenewalService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionStore::new(pool.clone()),
            jobs: JobStore::new(pool.clone()),
            audit: AuditLogger::new(pool),
        }
    }

    /// Run one renewal pass. The due query's failure propagates (the cycle
    /// cannot proceed without it); per-subscription failures are logged and
    /// the row is skipped.
    pub async fn run(&self, now: DateTime<Utc>) -> NotifyResult<RenewalSummary> {
        let candidates = self
            .subscriptions
            .find_renewal_due(now, RENEWAL_BATCH_SIZE)
            .await?;
        let scanned = candidates.len();

        if scanned > 0 {
            tracing::debug!(count = scanned, "Renewal candidates found");
        }

        let mut renewed = 0;
        for sub in candidates {
            match self.advance_one(&sub, now).await {
                Ok(true) => renewed += 1,
                Ok(false) => {} // not due once checked zone-aware
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %sub.id,
                        error = %e,
                        "Skipping subscription during renewal"
                    );
                }
            }
        }

        if renewed > 0 {
            tracing::info!(renewed = renewed, "Renewal pass complete");
        }
        Ok(RenewalSummary { scanned, renewed })
    }

    /// Advance a single subscription. Returns `Ok(false)` when the zone-aware
    /// check shows the payment date is still in the future.
    async fn advance_one(&self, sub: &Subscription, now: DateTime<Utc>) -> NotifyResult<bool> {
        // Unparseable cycle or zone is a data-integrity problem, not a
        // transient one; the error propagates to the skip-and-log path.
        let cycle = sub.cycle()?;
        let zone = sub.zone()?;

        if !schedule::is_due(sub.next_payment_date, zone, now) {
            return Ok(false);
        }

        let old_date = sub.next_payment_date;
        let new_date = schedule::first_future_date(old_date, cycle, zone, now);

        self.subscriptions
            .set_next_payment_date(sub.id, new_date)
            .await?;

        self.audit
            .record(
                sub.created_by,
                "auto_renew",
                "subscription",
                sub.id,
                serde_json::json!({
                    "old_date": old_date,
                    "new_date": new_date,
                    "name": sub.name,
                }),
            )
            .await;

        // Re-derive the reminder from the advanced date. If this insert
        // fails the subscription stays advanced; the gap is tolerated and
        // closed by the next update or renewal touching this subscription.
        let mut advanced = sub.clone();
        advanced.next_payment_date = new_date;
        if let Err(e) = self.jobs.schedule_reminder(&advanced).await {
            tracing::error!(
                subscription_id = %sub.id,
                error = %e,
                "Subscription advanced but reminder reschedule failed"
            );
        }

        tracing::info!(
            subscription_id = %sub.id,
            old_date = %old_date,
            new_date = %new_date,
            "Subscription auto-renewed"
        );
        Ok(true)
    }
}
