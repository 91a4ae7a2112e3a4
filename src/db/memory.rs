use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
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

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    fowls: HashMap<Uuid, Fowl>,
    health_records: HashMap<Uuid, HealthRecord>,
    transfers: HashMap<Uuid, OwnershipTransfer>,
    certificates: HashMap<Uuid, DigitalCertificate>,
    /// (payment id, user id); payments are only ever deleted here
    payments: Vec<(Uuid, Uuid)>,
    audit_logs: Vec<AuditLog>,
}

/// In-memory repositories (intended for tests).
///
/// Mirrors the constraints the Postgres schema enforces: one open
/// transfer per fowl, one certificate per transfer, versioned updates.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Seeds a payment row owned by `user_id`.
    pub async fn add_payment(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.payments.push((id, user_id));
        id
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.tables.read().await.audit_logs.clone()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, data: CreateUserData) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            display_name: data.display_name,
            email: data.email,
            phone: data.phone,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl FowlRepository for MemoryStore {
    async fn create_fowl(&self, data: CreateFowlData) -> Result<Fowl, StoreError> {
        let now = Utc::now();
        let fowl = Fowl {
            id: Uuid::new_v4(),
            owner_id: data.owner_id,
            name: data.name,
            breed: data.breed,
            color: data.color,
            gender: data.gender,
            hatch_date: data.hatch_date,
            registration_number: data.registration_number,
            is_for_sale: false,
            asking_price: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .fowls
            .insert(fowl.id, fowl.clone());
        Ok(fowl)
    }

    async fn find_fowl(&self, id: Uuid) -> Result<Option<Fowl>, StoreError> {
        Ok(self.tables.read().await.fowls.get(&id).cloned())
    }

    async fn list_fowls_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fowl>, StoreError> {
        let tables = self.tables.read().await;
        let fowls = tables
            .fowls
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(newest_first(fowls, |f| f.created_at))
    }

    async fn list_fowls_for_sale(&self, breed: Option<&str>) -> Result<Vec<Fowl>, StoreError> {
        let tables = self.tables.read().await;
        let fowls = tables
            .fowls
            .values()
            .filter(|f| f.is_for_sale)
            .filter(|f| breed.map_or(true, |b| f.breed.eq_ignore_ascii_case(b)))
            .cloned()
            .collect();
        Ok(newest_first(fowls, |f| f.updated_at))
    }

    async fn update_listing(
        &self,
        id: Uuid,
        is_for_sale: bool,
        asking_price: Option<i64>,
    ) -> Result<Fowl, StoreError> {
        let mut tables = self.tables.write().await;
        let fowl = tables
            .fowls
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Fowl"))?;
        fowl.is_for_sale = is_for_sale;
        fowl.asking_price = asking_price;
        fowl.updated_at = Utc::now();
        Ok(fowl.clone())
    }

    async fn change_owner(&self, id: Uuid, new_owner_id: Uuid) -> Result<Fowl, StoreError> {
        let mut tables = self.tables.write().await;
        let fowl = tables
            .fowls
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Fowl"))?;
        fowl.owner_id = new_owner_id;
        fowl.is_for_sale = false;
        fowl.asking_price = None;
        fowl.updated_at = Utc::now();
        Ok(fowl.clone())
    }
}

#[async_trait]
impl HealthRecordRepository for MemoryStore {
    async fn create_health_record(
        &self,
        data: CreateHealthRecordData,
    ) -> Result<HealthRecord, StoreError> {
        let record = HealthRecord {
            id: Uuid::new_v4(),
            fowl_id: data.fowl_id,
            record_type: data.record_type,
            description: data.description,
            veterinarian: data.veterinarian,
            recorded_at: data.recorded_at,
            next_due_at: data.next_due_at,
        };
        self.tables
            .write()
            .await
            .health_records
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_health_records(&self, fowl_id: Uuid) -> Result<Vec<HealthRecord>, StoreError> {
        let tables = self.tables.read().await;
        let records = tables
            .health_records
            .values()
            .filter(|r| r.fowl_id == fowl_id)
            .cloned()
            .collect();
        Ok(newest_first(records, |r| r.recorded_at))
    }
}

#[async_trait]
impl TransferRepository for MemoryStore {
    async fn insert_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError> {
        let mut tables = self.tables.write().await;
        let open_exists = tables
            .transfers
            .values()
            .any(|t| t.fowl_id == transfer.fowl_id && !t.status.is_terminal());
        if open_exists {
            return Err(StoreError::Duplicate("open transfer for this fowl"));
        }
        tables.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer.clone())
    }

    async fn find_transfer(&self, id: Uuid) -> Result<Option<OwnershipTransfer>, StoreError> {
        Ok(self.tables.read().await.transfers.get(&id).cloned())
    }

    async fn find_open_transfer_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Option<OwnershipTransfer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .transfers
            .values()
            .find(|t| t.fowl_id == fowl_id && !t.status.is_terminal())
            .cloned())
    }

    async fn list_transfers_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError> {
        let tables = self.tables.read().await;
        let transfers = tables
            .transfers
            .values()
            .filter(|t| t.from_user_id == user_id || t.to_user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(transfers, |t| t.created_at))
    }

    async fn list_transfers_for_fowl(
        &self,
        fowl_id: Uuid,
    ) -> Result<Vec<OwnershipTransfer>, StoreError> {
        let tables = self.tables.read().await;
        let transfers = tables
            .transfers
            .values()
            .filter(|t| t.fowl_id == fowl_id)
            .cloned()
            .collect();
        Ok(newest_first(transfers, |t| t.created_at))
    }

    async fn update_transfer(
        &self,
        transfer: &OwnershipTransfer,
    ) -> Result<OwnershipTransfer, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .transfers
            .get_mut(&transfer.id)
            .ok_or(StoreError::Conflict)?;
        if stored.version != transfer.version {
            return Err(StoreError::Conflict);
        }

        let mut updated = transfer.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn insert_certificate(
        &self,
        certificate: &DigitalCertificate,
    ) -> Result<DigitalCertificate, StoreError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.certificates.values().any(|c| {
            c.transfer_id == certificate.transfer_id
                || c.certificate_number == certificate.certificate_number
        });
        if duplicate {
            return Err(StoreError::Duplicate("certificate"));
        }
        tables
            .certificates
            .insert(certificate.id, certificate.clone());
        Ok(certificate.clone())
    }

    async fn find_certificate(&self, id: Uuid) -> Result<Option<DigitalCertificate>, StoreError> {
        Ok(self.tables.read().await.certificates.get(&id).cloned())
    }

    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<DigitalCertificate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.certificate_number == certificate_number)
            .cloned())
    }

    async fn find_certificate_by_transfer(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<DigitalCertificate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.transfer_id == transfer_id)
            .cloned())
    }

    async fn revoke_certificate(
        &self,
        id: Uuid,
        reason: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<DigitalCertificate, StoreError> {
        let mut tables = self.tables.write().await;
        let certificate = tables
            .certificates
            .get_mut(&id)
            .ok_or(StoreError::NotFound("Certificate"))?;
        if certificate.is_revoked() {
            return Err(StoreError::Conflict);
        }
        certificate.revoked_at = Some(revoked_at);
        certificate.revoked_reason = Some(reason.to_string());
        Ok(certificate.clone())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn delete_user_cascade(&self, user_id: Uuid) -> Result<CascadeDeletion, StoreError> {
        let mut tables = self.tables.write().await;

        let fowl_ids: Vec<Uuid> = tables
            .fowls
            .values()
            .filter(|f| f.owner_id == user_id)
            .map(|f| f.id)
            .collect();

        let records_before = tables.health_records.len();
        tables
            .health_records
            .retain(|_, r| !fowl_ids.contains(&r.fowl_id));
        let health_records = (records_before - tables.health_records.len()) as u64;

        let transfers_before = tables.transfers.len();
        tables.transfers.retain(|_, t| {
            let involved = t.from_user_id == user_id
                || t.to_user_id == user_id
                || fowl_ids.contains(&t.fowl_id);
            !(involved && !t.status.is_terminal())
        });
        let open_transfers = (transfers_before - tables.transfers.len()) as u64;

        let fowls_before = tables.fowls.len();
        tables.fowls.retain(|_, f| f.owner_id != user_id);
        let fowls = (fowls_before - tables.fowls.len()) as u64;

        let payments_before = tables.payments.len();
        tables.payments.retain(|(_, owner)| *owner != user_id);
        let payments = (payments_before - tables.payments.len()) as u64;

        let users = u64::from(tables.users.remove(&user_id).is_some());

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
        let entry = AuditLog {
            id: Uuid::new_v4(),
            action: data.action,
            subject_user_id: data.subject_user_id,
            performed_by: data.performed_by,
            details: data.details,
            created_at: Utc::now(),
        };
        self.tables.write().await.audit_logs.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
