use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{CascadeDeletion, Repositories, StoreError};
use crate::models::audit_log::CreateAuditLogData;
use crate::services::storage::{fowl_prefix, user_prefix, ObjectStore};

pub const USER_DATA_DELETED: &str = "user_data_deleted";

#[derive(thiserror::Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("User not found")]
    UserNotFound,

    #[error("You can only delete your own data")]
    Forbidden,
}

/// What a user-data deletion removed
#[derive(Debug, Clone, Serialize)]
pub struct DeletionSummary {
    pub user_id: Uuid,
    pub fowls: u64,
    pub health_records: u64,
    pub payments: u64,
    pub open_transfers: u64,
    pub stored_objects: u64,
    pub storage_failures: u64,
    pub audit_log_id: Option<Uuid>,
}

/// Deletes everything a user owns.
///
/// This function:
/// 1. Removes the user's rows in one database transaction
/// 2. Removes stored objects under the user's and each deleted fowl's prefix
/// 3. Writes a `user_data_deleted` audit entry with the counts
///
/// Completed and cancelled transfers and certificates are kept as ownership
/// history. Storage and audit failures are logged but do not fail the call
/// once the rows are gone.
#[tracing::instrument(skip(repos, storage))]
pub async fn delete_user_data(
    repos: &Repositories,
    storage: &dyn ObjectStore,
    user_id: Uuid,
    performed_by: Uuid,
) -> Result<DeletionSummary, CleanupError> {
    if user_id != performed_by {
        return Err(CleanupError::Forbidden);
    }

    repos
        .users
        .find_user(user_id)
        .await?
        .ok_or(CleanupError::UserNotFound)?;

    let deleted = repos.accounts.delete_user_cascade(user_id).await?;
    tracing::info!(
        fowls = deleted.fowls,
        health_records = deleted.health_records,
        payments = deleted.payments,
        open_transfers = deleted.open_transfers,
        "Deleted user records"
    );

    let (stored_objects, storage_failures) =
        delete_stored_objects(storage, user_id, &deleted).await;

    let details = json!({
        "fowls": deleted.fowls,
        "health_records": deleted.health_records,
        "payments": deleted.payments,
        "open_transfers": deleted.open_transfers,
        "users": deleted.users,
        "stored_objects": stored_objects,
        "storage_failures": storage_failures,
    });

    let audit_log_id = match repos
        .accounts
        .record_audit(CreateAuditLogData {
            action: USER_DATA_DELETED.to_string(),
            subject_user_id: user_id,
            performed_by,
            details,
        })
        .await
    {
        Ok(entry) => Some(entry.id),
        Err(e) => {
            tracing::error!(error = %e, "Failed to write audit log for user data deletion");
            None
        }
    };

    Ok(DeletionSummary {
        user_id,
        fowls: deleted.fowls,
        health_records: deleted.health_records,
        payments: deleted.payments,
        open_transfers: deleted.open_transfers,
        stored_objects,
        storage_failures,
        audit_log_id,
    })
}

async fn delete_stored_objects(
    storage: &dyn ObjectStore,
    user_id: Uuid,
    deleted: &CascadeDeletion,
) -> (u64, u64) {
    let prefixes = std::iter::once(user_prefix(user_id))
        .chain(deleted.fowl_ids.iter().map(|id| fowl_prefix(*id)));

    let mut removed = 0;
    let mut failures = 0;
    for prefix in prefixes {
        match storage.delete_prefix(&prefix).await {
            Ok(count) => removed += count,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Failed to delete stored objects");
                failures += 1;
            }
        }
    }
    (removed, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{
        fowl::{CreateFowlData, FowlGender},
        health_record::{CreateHealthRecordData, HealthRecordType},
        transfer::{CreateTransferData, OwnershipTransfer, TransferType, VerificationMethod},
        user::CreateUserData,
    };
    use crate::services::storage::MemoryObjectStore;
    use chrono::Utc;
    use std::sync::Arc;

    async fn user(repos: &Repositories, name: &str) -> Uuid {
        repos
            .users
            .create_user(CreateUserData {
                display_name: name.to_string(),
                email: None,
                phone: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_deletes_owned_records_and_objects() {
        let store = Arc::new(MemoryStore::default());
        let repos = Repositories::from_store(store.clone());
        let storage = MemoryObjectStore::default();

        let owner = user(&repos, "leaving").await;
        let other = user(&repos, "staying").await;

        let fowl = repos
            .fowls
            .create_fowl(CreateFowlData {
                owner_id: owner,
                name: "Pepper".to_string(),
                breed: "Silkie".to_string(),
                color: None,
                gender: FowlGender::Female,
                hatch_date: None,
                registration_number: None,
            })
            .await
            .unwrap();
        repos
            .health_records
            .create_health_record(CreateHealthRecordData {
                fowl_id: fowl.id,
                record_type: HealthRecordType::Vaccination,
                description: "Marek's".to_string(),
                veterinarian: None,
                recorded_at: Utc::now(),
                next_due_at: None,
            })
            .await
            .unwrap();
        repos
            .transfers
            .insert_transfer(&OwnershipTransfer::new(
                CreateTransferData {
                    fowl_id: fowl.id,
                    from_user_id: owner,
                    to_user_id: other,
                    transfer_type: TransferType::Gift,
                    transfer_price: 0,
                    verification_method: VerificationMethod::DualConfirmation,
                    verification_code: None,
                    notes: None,
                    initiated_by: owner,
                },
                Utc::now(),
            ))
            .await
            .unwrap();
        store.add_payment(owner).await;
        store.add_payment(other).await;

        storage.put(&format!("users/{}/avatar.jpg", owner), vec![1]).await.unwrap();
        storage.put(&format!("fowls/{}/photo.jpg", fowl.id), vec![2]).await.unwrap();
        storage.put(&format!("users/{}/avatar.jpg", other), vec![3]).await.unwrap();

        let summary = delete_user_data(&repos, &storage, owner, owner).await.unwrap();

        assert_eq!(summary.fowls, 1);
        assert_eq!(summary.health_records, 1);
        assert_eq!(summary.payments, 1);
        assert_eq!(summary.open_transfers, 1);
        assert_eq!(summary.stored_objects, 2);
        assert_eq!(summary.storage_failures, 0);

        assert!(repos.users.find_user(owner).await.unwrap().is_none());
        assert!(repos.fowls.find_fowl(fowl.id).await.unwrap().is_none());
        assert!(repos.users.find_user(other).await.unwrap().is_some());
        assert_eq!(
            storage.keys().await,
            vec![format!("users/{}/avatar.jpg", other)]
        );

        let logs = store.audit_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, USER_DATA_DELETED);
        assert_eq!(logs[0].details["fowls"], 1);
        assert_eq!(Some(logs[0].id), summary.audit_log_id);
    }

    #[tokio::test]
    async fn test_only_own_data() {
        let repos = Repositories::in_memory();
        let storage = MemoryObjectStore::default();
        let owner = user(&repos, "owner").await;

        let err = delete_user_data(&repos, &storage, owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CleanupError::Forbidden));
        assert!(repos.users.find_user(owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let repos = Repositories::in_memory();
        let storage = MemoryObjectStore::default();
        let id = Uuid::new_v4();

        let err = delete_user_data(&repos, &storage, id, id).await.unwrap_err();
        assert!(matches!(err, CleanupError::UserNotFound));
    }
}
