use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::transfer::TransferType;

/// Ownership certificate for a completed transfer.
///
/// Everything except `revoked_at` / `revoked_reason` is fixed at issuance
/// and covered by `signature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalCertificate {
    pub id: Uuid,
    pub certificate_number: String,
    pub transfer_id: Uuid,
    pub fowl_id: Uuid,
    pub previous_owner_id: Uuid,
    pub new_owner_id: Uuid,
    pub transfer_type: TransferType,
    pub transfer_price: i64,
    pub fowl_snapshot: JsonValue,  // JSONB field
    pub health_summary: JsonValue, // JSONB field
    pub signature: String,         // HMAC-SHA256 hex string
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

impl DigitalCertificate {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, FromRow)]
struct CertificateRow {
    id: Uuid,
    certificate_number: String,
    transfer_id: Uuid,
    fowl_id: Uuid,
    previous_owner_id: Uuid,
    new_owner_id: Uuid,
    transfer_type: String,
    transfer_price: i64,
    fowl_snapshot: JsonValue,
    health_summary: JsonValue,
    signature: String,
    issued_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_reason: Option<String>,
}

impl TryFrom<CertificateRow> for DigitalCertificate {
    type Error = sqlx::Error;

    fn try_from(row: CertificateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            certificate_number: row.certificate_number,
            transfer_id: row.transfer_id,
            fowl_id: row.fowl_id,
            previous_owner_id: row.previous_owner_id,
            new_owner_id: row.new_owner_id,
            transfer_type: row
                .transfer_type
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            transfer_price: row.transfer_price,
            fowl_snapshot: row.fowl_snapshot,
            health_summary: row.health_summary,
            signature: row.signature,
            issued_at: row.issued_at,
            revoked_at: row.revoked_at,
            revoked_reason: row.revoked_reason,
        })
    }
}

impl DigitalCertificate {
    /// Stores a freshly signed certificate.
    ///
    /// A second certificate for the same transfer fails on the unique
    /// `transfer_id` constraint.
    pub async fn insert(
        pool: &PgPool,
        certificate: &DigitalCertificate,
    ) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            INSERT INTO certificates (
                id, certificate_number, transfer_id, fowl_id, previous_owner_id,
                new_owner_id, transfer_type, transfer_price, fowl_snapshot,
                health_summary, signature, issued_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(certificate.id)
        .bind(&certificate.certificate_number)
        .bind(certificate.transfer_id)
        .bind(certificate.fowl_id)
        .bind(certificate.previous_owner_id)
        .bind(certificate.new_owner_id)
        .bind(certificate.transfer_type.as_str())
        .bind(certificate.transfer_price)
        .bind(&certificate.fowl_snapshot)
        .bind(&certificate.health_summary)
        .bind(&certificate.signature)
        .bind(certificate.issued_at)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT * FROM certificates WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(DigitalCertificate::try_from).transpose()
    }

    pub async fn find_by_number(
        pool: &PgPool,
        certificate_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT * FROM certificates WHERE certificate_number = $1
            "#,
        )
        .bind(certificate_number)
        .fetch_optional(pool)
        .await?;

        row.map(DigitalCertificate::try_from).transpose()
    }

    pub async fn find_by_transfer_id(
        pool: &PgPool,
        transfer_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT * FROM certificates WHERE transfer_id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(pool)
        .await?;

        row.map(DigitalCertificate::try_from).transpose()
    }

    /// Sets the revocation fields unless they are already set
    pub async fn mark_revoked(
        pool: &PgPool,
        id: Uuid,
        reason: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            UPDATE certificates
            SET revoked_at = $2, revoked_reason = $3
            WHERE id = $1 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(revoked_at)
        .bind(reason)
        .fetch_optional(pool)
        .await?;

        row.map(DigitalCertificate::try_from).transpose()
    }
}
