use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::repository::{
    AccountRepository, CascadeDeletion, CertificateRepository, FowlRepository,
    HealthRecordRepository, StoreHealth, TransferRepository, UserRepository,
};
use super::StoreError;
use crate::models::{
    audit_log::{AuditLog, CreateAuditLogData},
    certificate::DigitalCertificate,
    fowl::{CreateFowlData, Fowl},
    health_record::{CreateHealthRecordData, HealthRecord},
    transfer::OwnershipTransfer,
    user::{CreateUserData, User},
};

/// PostgreSQL-backed repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError> {
        Ok(User::create(&self.pool, data).await?)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }
}

#[async_trait]
impl FowlRepository for PgStore {
    async fn create_fowl(&self, data: CreateFowlData) -> Result<Fowl, StoreError> {
        Ok(Fowl::create(&self.pool, data).await?)
    }

    async fn find_fowl(&self, id: Uuid) -> Result<Option<Fowl>, StoreError> {
        Ok(Fowl::find_by_id(&self.pool, id).await?)
    }

    async fn list_fowls_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fowl>, StoreError> {
        Ok(Fowl::list_by_owner(&self.pool, owner_id).await?)
    }

    async fn list_fowls_for_sale(&self, breed: Option<&str>) -> Result<Vec<Fowl>, StoreError> {
        Ok(Fowl::list_for_sale(&self.pool, breed).await?)
    }

    async fn update_listing(
        &self,
        id: Uuid,
        is_for_sale: bool,
        asking_price: Option<i64>,
    ) -> Result<Fowl, StoreError> {
        Fowl::update_listing(&self.pool, id, is_for_sale, asking_price)
            .await?
            .ok_or(StoreError::NotFound("Fowl"))
    }

    async fn change_owner(&self, id: Uuid, new_owner_id: Uuid) -> Result<Fowl, StoreError> {
        Fowl::change_owner(&self.pool, id, new_owner_id)
            .await?
            .ok_or(StoreError::NotFound("Fowl"))
    }
}

#[async_trait]
impl HealthRecordRepository for PgStore {
    async fn create_health_record(
        &self,
        data: CreateHealthRecordData,
    ) -> Result<HealthRecord, StoreError> {
        Ok(HealthRecord::create(&self.pool, data).await?)
    }

    async fn list_health_records(&self, fowl_id: Uuid) -> Result<Vec<HealthRecord>, StoreError> {
        Ok(HealthRecord::list_by_fowl(&self.pool, fowl_id).await?)
    }
}

#[async_trait]
impl TransferRepository for PgStore {
    async fn insert_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError> {
        // idx_transfers_one_open_per_fowl rejects a second open transfer
        OwnershipTransfer::insert(&self.pool, transfer)
            .await
            .map_err(|e| StoreError::from_insert(e, "open transfer for this fowl"))
    }

    async fn find_transfer(&self, id: Uuid) -> Result<Option<OwnershipTransfer>, StoreError> {
        Ok(OwnershipTransfer::find_by_id(&self.pool, id).await?)
    }

    async fn find_open_transfer_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Option<OwnershipTransfer>, StoreError> {
        Ok(OwnershipTransfer::find_open_for_fowl(&self.pool, fowl_id).await?)
    }

    async fn list_transfers_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError> {
        Ok(OwnershipTransfer::list_for_user(&self.pool, user_id).await?)
    }

    async fn list_transfers_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError> {
        Ok(OwnershipTransfer::list_for_fowl(&self.pool, fowl_id).await?)
    }

    async fn update_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError> {
        OwnershipTransfer::update_if_version(&self.pool, transfer)
            .await?
            .ok_or(StoreError::Conflict)
    }
}

#[async_trait]
impl CertificateRepository for PgStore {
    async fn insert_certificate(
        &self,
        certificate: &DigitalCertificate,
    ) -> Result<DigitalCertificate, StoreError> {
        DigitalCertificate::insert(&self.pool, certificate)
            .await
            .map_err(|e| StoreError::from_insert(e, "certificate"))
    }

    async fn find_certificate(&self, id: Uuid) -> Result<Option<DigitalCertificate>, StoreError> {
        Ok(DigitalCertificate::find_by_id(&self.pool, id).await?)
    }

    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<DigitalCertificate>, StoreError> {
        Ok(DigitalCertificate::find_by_number(&self.pool, certificate_number).await?)
    }

    async fn find_certificate_by_transfer(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<DigitalCertificate>, StoreError> {
        Ok(DigitalCertificate::find_by_transfer_id(&self.pool, transfer_id).await?)
    }

    async fn revoke_certificate(
        &self,
        id: Uuid,
        reason: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<DigitalCertificate, StoreError> {
        if let Some(revoked) =
            DigitalCertificate::mark_revoked(&self.pool, id, reason, revoked_at).await?
        {
            return Ok(revoked);
        }

        // Nothing updated: either missing or already revoked
        match DigitalCertificate::find_by_id(&self.pool, id).await? {
            Some(_) => Err(StoreError::Conflict),
            None => Err(StoreError::NotFound("Certificate")),
        }
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeDeletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let fowl_ids: Vec<Uuid> =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM fowls WHERE owner_id = $1")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;

        let health_records = sqlx::query("DELETE FROM health_records WHERE fowl_id = ANY($1)")
            .bind(&fowl_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let open_transfers = sqlx::query(
            r#"
            DELETE FROM transfers
            WHERE (from_user_id = $1 OR to_user_id = $1 OR fowl_id = ANY($2))
              AND status IN ('PENDING', 'SELLER_CONFIRMED', 'BUYER_CONFIRMED')
            "#,
        )
        .bind(user_id)
        .bind(&fowl_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let fowls = sqlx::query("DELETE FROM fowls WHERE owner_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let payments = sqlx::query("DELETE FROM payments WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let users = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(CascadeDeletion {
            fowl_ids,
            fowls,
            health_records,
            payments,
            open_transfers,
            users,
        })
    }

    async fn record_audit(&self, data: CreateAuditLogData) -> Result<AuditLog, StoreError> {
        Ok(AuditLog::create(&self.pool, data).await?)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
