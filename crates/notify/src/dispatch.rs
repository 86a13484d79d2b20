//! Dispatch cycle
//!
//! One externally triggered pass: run the renewal advancer, query the due
//! jobs, deliver them concurrently, and report the aggregate. Jobs are
//! independent units of work; no ordering is guaranteed between them.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::delivery::{DeliveryOutcome, DeliveryWorker};
use crate::error::{NotifyError, NotifyResult};
use crate::jobs::JobStore;
use crate::renewal::RenewalService;

/// Due jobs processed per dispatch cycle
const DISPATCH_BATCH_SIZE: i64 = 100;

/// Per-job entry in the dispatch summary
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub notification_id: Uuid,
    #[serde(flatten)]
    pub result: DeliveryReportResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeliveryReportResult {
    Outcome(DeliveryOutcome),
    Error { outcome: &'static str, error: String },
}

/// Aggregate result of one dispatch cycle
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub renewed: usize,
    pub dispatched: usize,
    pub results: Vec<DeliveryReport>,
}

/// Runs dispatch cycles on an external trigger
#[derive(Clone)]
pub struct Dispatcher {
    jobs: JobStore,
    renewal: RenewalService,
    worker: Arc<DeliveryWorker>,
}

impl Dispatcher {
    pub fn new(pool: PgPool, worker: Arc<DeliveryWorker>) -> Self {
        Self {
            jobs: JobStore::new(pool.clone()),
            renewal: RenewalService::new(pool),
            worker,
        }
    }

    /// Run one cycle: renewal first, then due-job delivery.
    ///
    /// A renewal batch failure is logged and the cycle continues with zero
    /// renewals; a due-job query failure aborts the cycle (already-committed
    /// renewal effects stand, best-effort).
    pub async fn run_cycle(&self) -> NotifyResult<DispatchSummary> {
        let now = Utc::now();

        let renewed = match self.renewal.run(now).await {
            Ok(summary) => summary.renewed,
            Err(e) => {
                tracing::error!(error = %e, "Renewal pass failed; continuing with dispatch");
                0
            }
        };

        let due = self.jobs.due(now, DISPATCH_BATCH_SIZE).await?;
        let dispatched = due.len();

        if dispatched > 0 {
            tracing::info!(count = dispatched, "Dispatching due notifications");
        }

        let outcomes = join_all(due.iter().map(|&id| self.worker.deliver(id))).await;

        let results = due
            .into_iter()
            .zip(outcomes)
            .map(|(notification_id, outcome)| DeliveryReport {
                notification_id,
                result: match outcome {
                    Ok(outcome) => DeliveryReportResult::Outcome(outcome),
                    Err(e) => DeliveryReportResult::Error {
                        outcome: error_kind(&e),
                        error: e.to_string(),
                    },
                },
            })
            .collect();

        Ok(DispatchSummary {
            renewed,
            dispatched,
            results,
        })
    }
}

fn error_kind(e: &NotifyError) -> &'static str {
    match e {
        NotifyError::JobNotFound(_) => "not_found",
        _ => "error",
    }
}
