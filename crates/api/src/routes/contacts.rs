//! Telegram contact linking
//!
//! The app issues a short-lived token; the Telegram bot posts it back with
//! the chat id to finalize the link. The linked chat id is what the delivery
//! worker resolves for telegram-mode reminders.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub ok: bool,
    pub token: String,
}

/// POST /api/contacts/telegram/token { user_id }
pub async fn create_link_token(
    State(state): State<AppState>,
    Json(request): Json<CreateTokenRequest>,
) -> ApiResult<Json<CreateTokenResponse>> {
    let token = state.notify.contacts.create_link_token(request.user_id).await?;
    Ok(Json(CreateTokenResponse { ok: true, token }))
}

#[derive(Debug, Deserialize)]
pub struct LinkTelegramRequest {
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
pub struct LinkTelegramResponse {
    pub ok: bool,
    pub message: String,
}

/// POST /api/contacts/telegram/link { token, chat_id }
///
/// Called by the Telegram bot webhook to finalize the link. Rejects unknown
/// or expired tokens with 401.
pub async fn link_telegram(
    State(state): State<AppState>,
    Json(request): Json<LinkTelegramRequest>,
) -> ApiResult<Json<LinkTelegramResponse>> {
    if request.token.is_empty() || request.chat_id.is_empty() {
        return Err(ApiError::BadRequest("missing token or chat_id".to_string()));
    }

    let Some(user_id) = state
        .notify
        .contacts
        .link_telegram(&request.token, &request.chat_id)
        .await?
    else {
        return Err(ApiError::Unauthorized);
    };

    state
        .notify
        .audit
        .record(
            user_id,
            "link_telegram",
            "user_contact",
            user_id,
            serde_json::json!({ "chat_id": request.chat_id }),
        )
        .await;

    Ok(Json(LinkTelegramResponse {
        ok: true,
        message: "Telegram contact linked successfully".to_string(),
    }))
}
