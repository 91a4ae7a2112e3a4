use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::transfer::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthRecordType {
    Vaccination,
    Checkup,
    Treatment,
    Deworming,
    Other,
}

impl HealthRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthRecordType::Vaccination => "VACCINATION",
            HealthRecordType::Checkup => "CHECKUP",
            HealthRecordType::Treatment => "TREATMENT",
            HealthRecordType::Deworming => "DEWORMING",
            HealthRecordType::Other => "OTHER",
        }
    }
}

impl FromStr for HealthRecordType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VACCINATION" => Ok(HealthRecordType::Vaccination),
            "CHECKUP" => Ok(HealthRecordType::Checkup),
            "TREATMENT" => Ok(HealthRecordType::Treatment),
            "DEWORMING" => Ok(HealthRecordType::Deworming),
            "OTHER" => Ok(HealthRecordType::Other),
            other => Err(UnknownVariant::new("health record type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: Uuid,
    pub fowl_id: Uuid,
    pub record_type: HealthRecordType,
    pub description: String,
    pub veterinarian: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub next_due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateHealthRecordData {
    pub fowl_id: Uuid,
    pub record_type: HealthRecordType,
    pub description: String,
    pub veterinarian: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub next_due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct HealthRecordRow {
    id: Uuid,
    fowl_id: Uuid,
    record_type: String,
    description: String,
    veterinarian: Option<String>,
    recorded_at: DateTime<Utc>,
    next_due_at: Option<DateTime<Utc>>,
}

impl TryFrom<HealthRecordRow> for HealthRecord {
    type Error = sqlx::Error;

    fn try_from(row: HealthRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            fowl_id: row.fowl_id,
            record_type: row
                .record_type
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            description: row.description,
            veterinarian: row.veterinarian,
            recorded_at: row.recorded_at,
            next_due_at: row.next_due_at,
        })
    }
}

impl HealthRecord {
    pub async fn create(pool: &PgPool, data: CreateHealthRecordData) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, HealthRecordRow>(
            r#"
            INSERT INTO health_records (
                fowl_id, record_type, description, veterinarian, recorded_at, next_due_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.fowl_id)
        .bind(data.record_type.as_str())
        .bind(&data.description)
        .bind(&data.veterinarian)
        .bind(data.recorded_at)
        .bind(data.next_due_at)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    /// Lists a fowl's records, most recent first
    pub async fn list_by_fowl(pool: &PgPool, fowl_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, HealthRecordRow>(
            r#"
            SELECT * FROM health_records
            WHERE fowl_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(fowl_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(HealthRecord::try_from).collect()
    }
}
