//! Append-only audit log sink
//!
//! Audit writes are a fire-and-forget side effect: a failure here is logged
//! and swallowed, never propagated to the operation that triggered it.

use sqlx::PgPool;
use uuid::Uuid;

/// Writes audit entries for mutations performed by the core services
#[derive(Clone)]
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        user_id: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        diff: serde_json::Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, entity_type, entity_id, diff_json)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(diff)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                user_id = %user_id,
                action = action,
                entity_id = %entity_id,
                error = %e,
                "Failed to write audit log entry"
            );
        }
    }
}
