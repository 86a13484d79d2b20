// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Subwatch notification core
//!
//! Scheduling and delivery engine for subscription renewal reminders.
//!
//! ## Features
//!
//! - **Schedule arithmetic**: zone-aware local-midnight math for payment
//!   dates and reminder offsets, correct across DST transitions
//! - **Renewal advancer**: moves overdue subscriptions to the next future
//!   occurrence of their billing cycle
//! - **Job store**: one pending reminder per subscription, upserted in
//!   place, with terminal history
//! - **Dispatcher**: externally triggered cycle that renews, queries due
//!   jobs, and delivers them concurrently
//! - **Delivery worker**: recipient resolution, one send per invocation,
//!   bounded retries with exponential backoff persisted across cycles
//! - **Providers**: Telegram Bot API and HTTP email with bounded timeouts
//! - **Audit log**: append-only side effect, never fails the operation

pub mod audit;
pub mod contacts;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod renewal;
pub mod schedule;
pub mod subscriptions;


// Audit
pub use audit::AuditLogger;

// Contacts
pub use contacts::ContactService;

// Delivery
pub use delivery::{DeliveryOutcome, DeliveryWorker};

// Dispatch
pub use dispatch::{DeliveryReport, DispatchSummary, Dispatcher};

// Error
pub use error::{NotifyError, NotifyResult};

// Jobs
pub use jobs::{JobPayload, JobStatus, JobStore, JobSummary, RetryDecision};

// Providers
pub use providers::{EmailClient, ProviderConfig, ProviderResponse, TelegramClient};

// Renewal
pub use renewal::{RenewalService, RenewalSummary};

// Schedule
pub use schedule::{BillingCycle, ReminderOffset};

// Subscriptions
pub use subscriptions::{NotificationMode, Subscription, SubscriptionStore};

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

/// Main notification service combining the scheduling and delivery pieces
pub struct NotifyService {
    pub audit: AuditLogger,
    pub contacts: ContactService,
    pub delivery: Arc<DeliveryWorker>,
    pub dispatcher: Dispatcher,
    pub jobs: JobStore,
    pub renewal: RenewalService,
    pub subscriptions: SubscriptionStore,
}

impl NotifyService {
    /// Create the service with explicit provider configuration (built by the
    /// process entry point; nothing here reads the environment).
    pub fn new(pool: PgPool, providers: ProviderConfig) -> Self {
        let delivery = Arc::new(DeliveryWorker::new(pool.clone(), &providers));

        Self {
            audit: AuditLogger::new(pool.clone()),
            contacts: ContactService::new(pool.clone()),
            dispatcher: Dispatcher::new(pool.clone(), delivery.clone()),
            delivery,
            jobs: JobStore::new(pool.clone()),
            renewal: RenewalService::new(pool.clone()),
            subscriptions: SubscriptionStore::new(pool),
        }
    }

    /// Re-derive the reminder job for a subscription. This is the interface
    /// the CRUD layer calls after creating or updating a subscription.
    pub async fn reschedule(&self, subscription_id: Uuid) -> NotifyResult<Uuid> {
        let Some(sub) = self.subscriptions.find_by_id(subscription_id).await? else {
            return Err(NotifyError::SubscriptionNotFound(subscription_id));
        };
        self.jobs.schedule_reminder(&sub).await
    }

    /// Drop the pending reminder for a subscription (e.g. ahead of delete).
    /// Returns the number of jobs removed.
    pub async fn cancel(&self, subscription_id: Uuid) -> NotifyResult<u64> {
        self.jobs.cancel_pending(subscription_id).await
    }
}
