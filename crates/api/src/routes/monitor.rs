//! Monitoring endpoint
//!
//! Read-only view of recent notification jobs so operators can see what was
//! delivered, what is retrying, and what failed permanently.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use subwatch_notify::jobs::JobSummary;

use crate::error::ApiResult;
use crate::state::AppState;

const RECENT_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub ok: bool,
    pub notifications: Vec<JobSummary>,
}

/// GET /api/monitor/status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<MonitorResponse>> {
    let notifications = state.notify.jobs.recent(RECENT_LIMIT).await?;
    Ok(Json(MonitorResponse {
        ok: true,
        notifications,
    }))
}
