//! Workflow endpoints: the dispatcher trigger, the per-job delivery worker,
//! and the reschedule hook for the CRUD layer.
//!
//! Dispatch and delivery are invoked by an external scheduler (cron), so
//! they accept an optional shared-secret bearer token instead of a user
//! session.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use subwatch_notify::delivery::DeliveryOutcome;
use subwatch_notify::dispatch::DeliveryReport;
use subwatch_notify::subscriptions::NotificationMode;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Enforce the shared-secret guard when a dispatch token is configured.
fn require_dispatch_token(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.dispatch_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub ok: bool,
    pub renewed: usize,
    pub dispatched: usize,
    pub results: Vec<DeliveryReport>,
}

/// GET /api/workflows/dispatch
///
/// Runs one dispatch cycle: renewal advancer first, then delivery of every
/// due notification. A storage failure on the due-job query aborts the cycle
/// with a 500; renewal effects already committed are not rolled back.
pub async fn dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DispatchResponse>> {
    require_dispatch_token(&state, &headers)?;

    let summary = state.notify.dispatcher.run_cycle().await?;
    tracing::info!(
        renewed = summary.renewed,
        dispatched = summary.dispatched,
        "Dispatch cycle complete"
    );

    Ok(Json(DispatchResponse {
        ok: true,
        renewed: summary.renewed,
        dispatched: summary.dispatched,
        results: summary.results,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub notification_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeliverResponse {
    pub ok: bool,
    pub notification_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<NotificationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// POST /api/workflows/deliver { notification_id }
///
/// Invokes the delivery worker for one job. Sent, already-sent and
/// not-yet-due all answer 200; a failed or retrying attempt answers 500 with
/// details, after the retry state has been persisted on the job row.
pub async fn deliver(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeliverRequest>,
) -> ApiResult<Json<DeliverResponse>> {
    require_dispatch_token(&state, &headers)?;

    let outcome = state.notify.delivery.deliver(request.notification_id).await?;
    let notification_id = request.notification_id;

    match outcome {
        DeliveryOutcome::Sent { method } => Ok(Json(DeliverResponse {
            ok: true,
            notification_id,
            method: Some(method),
            message: None,
            next_attempt_at: None,
        })),
        DeliveryOutcome::AlreadySent => Ok(Json(DeliverResponse {
            ok: true,
            notification_id,
            method: None,
            message: Some("notification already sent".to_string()),
            next_attempt_at: None,
        })),
        DeliveryOutcome::NotYetDue { next_attempt_at } => Ok(Json(DeliverResponse {
            ok: true,
            notification_id,
            method: None,
            message: Some("not yet due".to_string()),
            next_attempt_at: Some(next_attempt_at),
        })),
        DeliveryOutcome::Retrying {
            attempts,
            next_attempt_at,
        } => Err(ApiError::DeliveryFailed {
            error: "delivery failed; retry scheduled".to_string(),
            details: format!("attempt {attempts} failed; next retry at {next_attempt_at}"),
        }),
        DeliveryOutcome::Failed { reason } => Err(ApiError::DeliveryFailed {
            error: "delivery failed permanently".to_string(),
            details: reason,
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub subscription_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RescheduleResponse {
    pub ok: bool,
    pub subscription_id: Uuid,
    pub notification_id: Uuid,
}

/// POST /api/workflows/reschedule { subscription_id }
///
/// Re-derives the pending reminder for a subscription. Called by the CRUD
/// layer after it creates or updates a subscription row.
pub async fn reschedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RescheduleRequest>,
) -> ApiResult<Json<RescheduleResponse>> {
    require_dispatch_token(&state, &headers)?;

    let notification_id = state.notify.reschedule(request.subscription_id).await?;
    Ok(Json(RescheduleResponse {
        ok: true,
        subscription_id: request.subscription_id,
        notification_id,
    }))
}
