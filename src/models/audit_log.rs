use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: String, // e.g. "user_data_deleted"
    pub subject_user_id: Uuid,
    pub performed_by: Uuid,
    pub details: JsonValue, // JSONB field
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAuditLogData {
    pub action: String,
    pub subject_user_id: Uuid,
    pub performed_by: Uuid,
    pub details: JsonValue,
}

impl AuditLog {
    pub async fn create(pool: &PgPool, data: CreateAuditLogData) -> Result<Self, sqlx::Error> {
        let entry = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO audit_logs (action, subject_user_id, performed_by, details)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&data.action)
        .bind(data.subject_user_id)
        .bind(data.performed_by)
        .bind(&data.details)
        .fetch_one(pool)
        .await?;

        Ok(entry)
    }
}
