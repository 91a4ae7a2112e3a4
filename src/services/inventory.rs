use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{Repositories, StoreError};
use crate::models::{
    fowl::{CreateFowlData, Fowl, FowlGender},
    health_record::{CreateHealthRecordData, HealthRecord, HealthRecordType},
    user::{CreateUserData, User},
};

#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("Fowl not found")]
    FowlNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Only the fowl's owner can do that")]
    NotOwner,

    #[error("This fowl has a transfer in progress")]
    TransferInProgress,
}

fn required(field: &str, value: &str) -> Result<String, InventoryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InventoryError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_user(
    repos: &Repositories,
    data: CreateUserData,
) -> Result<User, InventoryError> {
    let data = CreateUserData {
        display_name: required("Display name", &data.display_name)?,
        email: optional(data.email),
        phone: optional(data.phone),
    };
    let user = repos.users.create_user(data).await?;
    tracing::info!(user_id = %user.id, "User profile created");
    Ok(user)
}

pub async fn get_user(repos: &Repositories, user_id: Uuid) -> Result<User, InventoryError> {
    repos
        .users
        .find_user(user_id)
        .await?
        .ok_or(InventoryError::UserNotFound)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFowl {
    pub name: String,
    pub breed: String,
    pub color: Option<String>,
    #[serde(default)]
    pub gender: FowlGender,
    pub hatch_date: Option<NaiveDate>,
    pub registration_number: Option<String>,
}

/// Adds a fowl to the caller's inventory
#[tracing::instrument(skip(repos, fowl))]
pub async fn register_fowl(
    repos: &Repositories,
    owner_id: Uuid,
    fowl: NewFowl,
) -> Result<Fowl, InventoryError> {
    if let Some(hatch_date) = fowl.hatch_date {
        if hatch_date > Utc::now().date_naive() {
            return Err(InventoryError::Validation(
                "Hatch date cannot be in the future".to_string(),
            ));
        }
    }

    repos
        .users
        .find_user(owner_id)
        .await?
        .ok_or(InventoryError::UserNotFound)?;

    let fowl = repos
        .fowls
        .create_fowl(CreateFowlData {
            owner_id,
            name: required("Name", &fowl.name)?,
            breed: required("Breed", &fowl.breed)?,
            color: optional(fowl.color),
            gender: fowl.gender,
            hatch_date: fowl.hatch_date,
            registration_number: optional(fowl.registration_number),
        })
        .await?;

    tracing::info!(fowl_id = %fowl.id, "Fowl registered");
    Ok(fowl)
}

pub async fn get_fowl(repos: &Repositories, fowl_id: Uuid) -> Result<Fowl, InventoryError> {
    repos
        .fowls
        .find_fowl(fowl_id)
        .await?
        .ok_or(InventoryError::FowlNotFound)
}

async fn owned_fowl(
    repos: &Repositories,
    fowl_id: Uuid,
    caller: Uuid,
) -> Result<Fowl, InventoryError> {
    let fowl = get_fowl(repos, fowl_id).await?;
    if fowl.owner_id != caller {
        return Err(InventoryError::NotOwner);
    }
    Ok(fowl)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingUpdate {
    pub is_for_sale: bool,
    pub asking_price: Option<i64>,
}

/// Puts a fowl on sale or takes it off
#[tracing::instrument(skip(repos))]
pub async fn update_listing(
    repos: &Repositories,
    fowl_id: Uuid,
    caller: Uuid,
    update: ListingUpdate,
) -> Result<Fowl, InventoryError> {
    if matches!(update.asking_price, Some(price) if price < 0) {
        return Err(InventoryError::Validation(
            "Asking price cannot be negative".to_string(),
        ));
    }

    let fowl = owned_fowl(repos, fowl_id, caller).await?;

    if update.is_for_sale
        && repos
            .transfers
            .find_open_transfer_for_fowl(fowl.id)
            .await?
            .is_some()
    {
        return Err(InventoryError::TransferInProgress);
    }

    let asking_price = if update.is_for_sale {
        update.asking_price
    } else {
        None
    };

    let fowl = repos
        .fowls
        .update_listing(fowl.id, update.is_for_sale, asking_price)
        .await?;
    tracing::info!(is_for_sale = fowl.is_for_sale, "Listing updated");
    Ok(fowl)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHealthRecord {
    pub record_type: HealthRecordType,
    pub description: String,
    pub veterinarian: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
}

#[tracing::instrument(skip(repos, record))]
pub async fn add_health_record(
    repos: &Repositories,
    fowl_id: Uuid,
    caller: Uuid,
    record: NewHealthRecord,
) -> Result<HealthRecord, InventoryError> {
    let fowl = owned_fowl(repos, fowl_id, caller).await?;
    let recorded_at = record.recorded_at.unwrap_or_else(Utc::now);

    if matches!(record.next_due_at, Some(due) if due < recorded_at) {
        return Err(InventoryError::Validation(
            "Next due date must be after the record date".to_string(),
        ));
    }

    let record = repos
        .health_records
        .create_health_record(CreateHealthRecordData {
            fowl_id: fowl.id,
            record_type: record.record_type,
            description: required("Description", &record.description)?,
            veterinarian: optional(record.veterinarian),
            recorded_at,
            next_due_at: record.next_due_at,
        })
        .await?;

    tracing::info!(record_type = record.record_type.as_str(), "Health record added");
    Ok(record)
}

pub async fn list_health_records(
    repos: &Repositories,
    fowl_id: Uuid,
) -> Result<Vec<HealthRecord>, InventoryError> {
    get_fowl(repos, fowl_id).await?;
    Ok(repos.health_records.list_health_records(fowl_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn owner(repos: &Repositories) -> User {
        create_user(
            repos,
            CreateUserData {
                display_name: "  Farmer Joe ".to_string(),
                email: Some(" ".to_string()),
                phone: None,
            },
        )
        .await
        .unwrap()
    }

    fn hen() -> NewFowl {
        NewFowl {
            name: "Henrietta".to_string(),
            breed: "Orpington".to_string(),
            color: Some("Buff".to_string()),
            gender: FowlGender::Female,
            hatch_date: None,
            registration_number: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_trims_fields() {
        let repos = Repositories::in_memory();
        let user = owner(&repos).await;
        assert_eq!(user.display_name, "Farmer Joe");
        assert!(user.email.is_none());

        let err = create_user(
            &repos,
            CreateUserData {
                display_name: "   ".to_string(),
                email: None,
                phone: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_listing_owner_only_and_price_checked() {
        let repos = Repositories::in_memory();
        let user = owner(&repos).await;
        let fowl = register_fowl(&repos, user.id, hen()).await.unwrap();

        let listing = ListingUpdate {
            is_for_sale: true,
            asking_price: Some(5_000),
        };
        let err = update_listing(&repos, fowl.id, Uuid::new_v4(), listing.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotOwner));

        let err = update_listing(
            &repos,
            fowl.id,
            user.id,
            ListingUpdate {
                is_for_sale: true,
                asking_price: Some(-1),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        let listed = update_listing(&repos, fowl.id, user.id, listing).await.unwrap();
        assert!(listed.is_for_sale);
        assert_eq!(listed.asking_price, Some(5_000));

        let for_sale = repos.fowls.list_fowls_for_sale(Some("orpington")).await.unwrap();
        assert_eq!(for_sale.len(), 1);
    }

    #[tokio::test]
    async fn test_future_hatch_date_rejected() {
        let repos = Repositories::in_memory();
        let user = owner(&repos).await;
        let mut fowl = hen();
        fowl.hatch_date = Some(Utc::now().date_naive() + Duration::days(2));

        let err = register_fowl(&repos, user.id, fowl).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_health_records_newest_first() {
        let repos = Repositories::in_memory();
        let user = owner(&repos).await;
        let fowl = register_fowl(&repos, user.id, hen()).await.unwrap();
        let now = Utc::now();

        for (days_ago, description) in [(10, "Checkup"), (1, "Booster")] {
            add_health_record(
                &repos,
                fowl.id,
                user.id,
                NewHealthRecord {
                    record_type: HealthRecordType::Vaccination,
                    description: description.to_string(),
                    veterinarian: None,
                    recorded_at: Some(now - Duration::days(days_ago)),
                    next_due_at: None,
                },
            )
            .await
            .unwrap();
        }

        let records = list_health_records(&repos, fowl.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].description, "Booster");

        let err = add_health_record(
            &repos,
            fowl.id,
            user.id,
            NewHealthRecord {
                record_type: HealthRecordType::Other,
                description: " ".to_string(),
                veterinarian: None,
                recorded_at: None,
                next_due_at: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }
}
