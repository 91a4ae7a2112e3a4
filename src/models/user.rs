use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserData {
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl User {
    /// Creates a new user profile
    pub async fn create(pool: &PgPool, data: CreateUserData) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (display_name, email, phone)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&data.display_name)
        .bind(&data.email)
        .bind(&data.phone)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by their ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
