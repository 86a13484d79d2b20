//! Error types for the notification core

use uuid::Uuid;

/// Errors raised by the scheduling and delivery services
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("notification {0} not found")]
    JobNotFound(Uuid),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(Uuid),

    #[error("invalid billing cycle '{0}'")]
    InvalidBillingCycle(String),

    #[error("invalid reminder offset '{0}'")]
    InvalidReminderOffset(String),

    #[error("invalid notification mode '{0}'")]
    InvalidNotificationMode(String),

    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid job status '{0}'")]
    InvalidJobStatus(String),

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(&'static str),

    #[error("provider error: {0}")]
    Provider(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

impl NotifyError {
    /// Whether the error is a data-integrity problem on a stored row
    /// (as opposed to an infrastructure failure). Batch paths skip these
    /// rows instead of aborting the batch.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            NotifyError::InvalidBillingCycle(_)
                | NotifyError::InvalidReminderOffset(_)
                | NotifyError::InvalidNotificationMode(_)
                | NotifyError::InvalidTimezone(_)
                | NotifyError::InvalidJobStatus(_)
                | NotifyError::InvalidPayload(_)
        )
    }
}
