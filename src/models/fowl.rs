use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::transfer::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FowlGender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl FowlGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            FowlGender::Male => "MALE",
            FowlGender::Female => "FEMALE",
            FowlGender::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for FowlGender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MALE" => Ok(FowlGender::Male),
            "FEMALE" => Ok(FowlGender::Female),
            "UNKNOWN" => Ok(FowlGender::Unknown),
            other => Err(UnknownVariant::new("fowl gender", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fowl {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub breed: String,
    pub color: Option<String>,
    pub gender: FowlGender,
    pub hatch_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
    pub is_for_sale: bool,
    pub asking_price: Option<i64>, // minor units
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFowlData {
    pub owner_id: Uuid,
    pub name: String,
    pub breed: String,
    pub color: Option<String>,
    #[serde(default)]
    pub gender: FowlGender,
    pub hatch_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
}

#[derive(Debug, FromRow)]
struct FowlRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    breed: String,
    color: Option<String>,
    gender: String,
    hatch_date: Option<NaiveDate>,
    registration_number: Option<String>,
    is_for_sale: bool,
    asking_price: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FowlRow> for Fowl {
    type Error = sqlx::Error;

    fn try_from(row: FowlRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            breed: row.breed,
            color: row.color,
            gender: row
                .gender
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            hatch_date: row.hatch_date,
            registration_number: row.registration_number,
            is_for_sale: row.is_for_sale,
            asking_price: row.asking_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Fowl {
    pub async fn create(pool: &PgPool, data: CreateFowlData) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, FowlRow>(
            r#"
            INSERT INTO fowls (
                owner_id, name, breed, color, gender, hatch_date, registration_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(&data.breed)
        .bind(&data.color)
        .bind(data.gender.as_str())
        .bind(data.hatch_date)
        .bind(&data.registration_number)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, FowlRow>(
            r#"
            SELECT * FROM fowls WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(Fowl::try_from).transpose()
    }

    /// Lists a user's flock
    pub async fn list_by_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FowlRow>(
            r#"
            SELECT * FROM fowls
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Fowl::try_from).collect()
    }

    /// Lists sale listings, optionally narrowed to one breed (case-insensitive)
    pub async fn list_for_sale(
        pool: &PgPool,
        breed: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FowlRow>(
            r#"
            SELECT * FROM fowls
            WHERE is_for_sale = TRUE
              AND ($1::TEXT IS NULL OR LOWER(breed) = LOWER($1))
            ORDER BY updated_at DESC
            "#,
        )
        .bind(breed)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Fowl::try_from).collect()
    }

    pub async fn update_listing(
        pool: &PgPool,
        id: Uuid,
        is_for_sale: bool,
        asking_price: Option<i64>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, FowlRow>(
            r#"
            UPDATE fowls
            SET is_for_sale = $2, asking_price = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(is_for_sale)
        .bind(asking_price)
        .fetch_optional(pool)
        .await?;

        row.map(Fowl::try_from).transpose()
    }

    /// Hands the fowl to its new owner and takes it off sale
    pub async fn change_owner(
        pool: &PgPool,
        id: Uuid,
        new_owner_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, FowlRow>(
            r#"
            UPDATE fowls
            SET owner_id = $2, is_for_sale = FALSE, asking_price = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_owner_id)
        .fetch_optional(pool)
        .await?;

        row.map(Fowl::try_from).transpose()
    }
}
