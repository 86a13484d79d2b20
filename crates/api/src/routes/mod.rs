//! Route registration

pub mod contacts;
pub mod monitor;
pub mod workflows;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/workflows/dispatch", get(workflows::dispatch))
        .route("/api/workflows/deliver", post(workflows::deliver))
        .route("/api/workflows/reschedule", post(workflows::reschedule))
        .route("/api/monitor/status", get(monitor::status))
        .route("/api/contacts/telegram/token", post(contacts::create_link_token))
        .route("/api/contacts/telegram/link", post(contacts::link_telegram))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
