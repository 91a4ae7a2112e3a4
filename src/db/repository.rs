//! Storage traits the services are written against.
//!
//! [`PgStore`](super::PgStore) backs the running service and
//! [`MemoryStore`](super::MemoryStore) backs tests; both implement every
//! trait so a [`Repositories`] bundle can be built from either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{MemoryStore, PgStore, StoreError};
use crate::models::{
    audit_log::{AuditLog, CreateAuditLogData},
    certificate::DigitalCertificate,
    fowl::{CreateFowlData, Fowl},
    health_record::{CreateHealthRecordData, HealthRecord},
    transfer::OwnershipTransfer,
    user::{CreateUserData, User},
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait FowlRepository: Send + Sync {
    async fn create_fowl(&self, data: CreateFowlData) -> Result<Fowl, StoreError>;
    async fn find_fowl(&self, id: Uuid) -> Result<Option<Fowl>, StoreError>;
    async fn list_fowls_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fowl>, StoreError>;
    async fn list_fowls_for_sale(&self, breed: Option<&str>) -> Result<Vec<Fowl>, StoreError>;
    async fn update_listing(
        &self,
        id: Uuid,
        is_for_sale: bool,
        asking_price: Option<i64>,
    ) -> Result<Fowl, StoreError>;
    /// Moves ownership and clears any sale listing.
    async fn change_owner(&self, id: Uuid, new_owner_id: Uuid) -> Result<Fowl, StoreError>;
}

#[async_trait]
pub trait HealthRecordRepository: Send + Sync {
    async fn create_health_record(
        &self,
        data: CreateHealthRecordData,
    ) -> Result<HealthRecord, StoreError>;
    /// Most recent first.
    async fn list_health_records(&self, fowl_id: Uuid) -> Result<Vec<HealthRecord>, StoreError>;
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn insert_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError>;
    async fn find_transfer(&self, id: Uuid) -> Result<Option<OwnershipTransfer>, StoreError>;
    async fn find_open_transfer_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Option<OwnershipTransfer>, StoreError>;
    /// Newest first.
    async fn list_transfers_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError>;
    /// Newest first.
    async fn list_transfers_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError>;
    /// Persists `transfer` only if the stored version equals `transfer.version`.
    ///
    /// Returns the stored record with its version bumped, or
    /// [`StoreError::Conflict`] when the version is stale.
    async fn update_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError>;
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the transfer already has one.
    async fn insert_certificate(
        &self,
        certificate: &DigitalCertificate,
    ) -> Result<DigitalCertificate, StoreError>;
    async fn find_certificate(&self, id: Uuid) -> Result<Option<DigitalCertificate>, StoreError>;
    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<DigitalCertificate>, StoreError>;
    async fn find_certificate_by_transfer(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<DigitalCertificate>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when already revoked.
    async fn revoke_certificate(
        &self,
        id: Uuid,
        reason: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<DigitalCertificate, StoreError>;
}

/// Row counts removed by [`AccountRepository::delete_user_cascade`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeDeletion {
    pub fowl_ids: Vec<Uuid>,
    pub fowls: u64,
    pub health_records: u64,
    pub payments: u64,
    pub open_transfers: u64,
    pub users: u64,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Deletes everything owned by the user in one unit of work.
    ///
    /// Completed and cancelled transfers and all certificates are kept as
    /// ownership history.
    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeDeletion, StoreError>;
    async fn record_audit(&self, data: CreateAuditLogData) -> Result<AuditLog, StoreError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Every repository the services need, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub fowls: Arc<dyn FowlRepository>,
    pub health_records: Arc<dyn HealthRecordRepository>,
    pub transfers: Arc<dyn TransferRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::default()))
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + FowlRepository
            + HealthRecordRepository
            + TransferRepository
            + CertificateRepository
            + AccountRepository
            + StoreHealth
            + 'static,
    {
        Self {
            users: store.clone(),
            fowls: store.clone(),
            health_records: store.clone(),
            transfers: store.clone(),
            certificates: store.clone(),
            accounts: store.clone(),
            health: store,
        }
    }
}
