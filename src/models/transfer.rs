use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of an ownership transfer.
///
/// `Disputed` is only ever written by external arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    SellerConfirmed,
    BuyerConfirmed,
    Completed,
    Cancelled,
    Disputed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::SellerConfirmed => "SELLER_CONFIRMED",
            TransferStatus::BuyerConfirmed => "BUYER_CONFIRMED",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Disputed => "DISPUTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Cancelled | TransferStatus::Disputed
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "SELLER_CONFIRMED" => Ok(TransferStatus::SellerConfirmed),
            "BUYER_CONFIRMED" => Ok(TransferStatus::BuyerConfirmed),
            "COMPLETED" => Ok(TransferStatus::Completed),
            "CANCELLED" => Ok(TransferStatus::Cancelled),
            "DISPUTED" => Ok(TransferStatus::Disputed),
            other => Err(UnknownVariant::new("transfer status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    Sale,
    Gift,
    BreedingLoan,
    Inheritance,
    Trade,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Sale => "SALE",
            TransferType::Gift => "GIFT",
            TransferType::BreedingLoan => "BREEDING_LOAN",
            TransferType::Inheritance => "INHERITANCE",
            TransferType::Trade => "TRADE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransferType::Sale => "Sale",
            TransferType::Gift => "Gift",
            TransferType::BreedingLoan => "Breeding loan",
            TransferType::Inheritance => "Inheritance",
            TransferType::Trade => "Trade",
        }
    }
}

impl FromStr for TransferType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SALE" => Ok(TransferType::Sale),
            "GIFT" => Ok(TransferType::Gift),
            "BREEDING_LOAN" => Ok(TransferType::BreedingLoan),
            "INHERITANCE" => Ok(TransferType::Inheritance),
            "TRADE" => Ok(TransferType::Trade),
            other => Err(UnknownVariant::new("transfer type", other)),
        }
    }
}

/// How both parties prove consent to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    /// Each party confirms from their own account.
    DualConfirmation,
    /// Each party must enter the code generated at initiation.
    VerificationCode,
    /// Each party must attach a signature when confirming.
    DigitalSignature,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::DualConfirmation => "DUAL_CONFIRMATION",
            VerificationMethod::VerificationCode => "VERIFICATION_CODE",
            VerificationMethod::DigitalSignature => "DIGITAL_SIGNATURE",
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DUAL_CONFIRMATION" => Ok(VerificationMethod::DualConfirmation),
            "VERIFICATION_CODE" => Ok(VerificationMethod::VerificationCode),
            "DIGITAL_SIGNATURE" => Ok(VerificationMethod::DigitalSignature),
            other => Err(UnknownVariant::new("verification method", other)),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Seller,
    Buyer,
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyRole::Seller => f.write_str("seller"),
            PartyRole::Buyer => f.write_str("buyer"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Only the seller or buyer of this transfer can do that")]
    NotAParty,

    #[error("The {0} has already confirmed this transfer")]
    AlreadyConfirmed(PartyRole),

    #[error("Cannot {action} a transfer that is {status}")]
    InvalidState {
        status: TransferStatus,
        action: &'static str,
    },

    #[error("A cancellation reason is required")]
    ReasonRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    pub id: Uuid,
    pub fowl_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub transfer_type: TransferType,
    /// Minor currency units.
    pub transfer_price: i64,
    pub status: TransferStatus,
    pub verification_method: VerificationMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    pub notes: Option<String>,
    pub initiated_by: Uuid,
    pub seller_signature: Option<String>,
    pub buyer_signature: Option<String>,
    pub seller_confirmed_at: Option<DateTime<Utc>>,
    pub buyer_confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct CreateTransferData {
    pub fowl_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub transfer_type: TransferType,
    pub transfer_price: i64,
    pub verification_method: VerificationMethod,
    pub verification_code: Option<String>,
    pub notes: Option<String>,
    pub initiated_by: Uuid,
}

impl OwnershipTransfer {
    /// Builds a fresh PENDING transfer.
    pub fn new(data: CreateTransferData, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fowl_id: data.fowl_id,
            from_user_id: data.from_user_id,
            to_user_id: data.to_user_id,
            transfer_type: data.transfer_type,
            transfer_price: data.transfer_price,
            status: TransferStatus::Pending,
            verification_method: data.verification_method,
            verification_code: data.verification_code,
            notes: data.notes,
            initiated_by: data.initiated_by,
            seller_signature: None,
            buyer_signature: None,
            seller_confirmed_at: None,
            buyer_confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<PartyRole> {
        if user_id == self.from_user_id {
            Some(PartyRole::Seller)
        } else if user_id == self.to_user_id {
            Some(PartyRole::Buyer)
        } else {
            None
        }
    }

    pub fn has_confirmed(&self, role: PartyRole) -> bool {
        match role {
            PartyRole::Seller => self.seller_confirmed_at.is_some(),
            PartyRole::Buyer => self.buyer_confirmed_at.is_some(),
        }
    }

    pub fn is_fully_confirmed(&self) -> bool {
        self.seller_confirmed_at.is_some() && self.buyer_confirmed_at.is_some()
    }

    pub fn can_cancel(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Role `user_id` would confirm as, if confirming is allowed right now.
    pub fn confirmable_role(&self, user_id: Uuid) -> Result<PartyRole, TransitionError> {
        let role = self.role_of(user_id).ok_or(TransitionError::NotAParty)?;

        if self.status.is_terminal() {
            return Err(TransitionError::InvalidState {
                status: self.status,
                action: "confirm",
            });
        }
        if self.has_confirmed(role) {
            return Err(TransitionError::AlreadyConfirmed(role));
        }

        Ok(role)
    }

    /// Records `user_id`'s confirmation and advances the status.
    ///
    /// Returns the role that confirmed. Reaches `Completed` only once both
    /// timestamps are set.
    pub fn apply_confirmation(
        &mut self,
        user_id: Uuid,
        signature: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<PartyRole, TransitionError> {
        let role = self.confirmable_role(user_id)?;

        match role {
            PartyRole::Seller => {
                self.seller_confirmed_at = Some(at);
                self.seller_signature = signature;
            }
            PartyRole::Buyer => {
                self.buyer_confirmed_at = Some(at);
                self.buyer_signature = signature;
            }
        }

        self.status = if self.is_fully_confirmed() {
            self.completed_at = Some(at);
            TransferStatus::Completed
        } else {
            match role {
                PartyRole::Seller => TransferStatus::SellerConfirmed,
                PartyRole::Buyer => TransferStatus::BuyerConfirmed,
            }
        };
        self.updated_at = at;

        Ok(role)
    }

    pub fn apply_cancellation(
        &mut self,
        user_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.role_of(user_id).is_none() {
            return Err(TransitionError::NotAParty);
        }
        if !self.can_cancel() {
            return Err(TransitionError::InvalidState {
                status: self.status,
                action: "cancel",
            });
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransitionError::ReasonRequired);
        }

        self.status = TransferStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancelled_by = Some(user_id);
        self.cancel_reason = Some(reason.to_string());
        self.updated_at = at;

        Ok(())
    }

    /// Copy safe to show `viewer`: the verification code stays with the initiator.
    pub fn redacted_for(&self, viewer: Uuid) -> Self {
        let mut transfer = self.clone();
        if viewer != self.initiated_by {
            transfer.verification_code = None;
        }
        transfer
    }
}

/// Raw `transfers` row; enum columns are TEXT.
#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    fowl_id: Uuid,
    from_user_id: Uuid,
    to_user_id: Uuid,
    transfer_type: String,
    transfer_price: i64,
    status: String,
    verification_method: String,
    verification_code: Option<String>,
    notes: Option<String>,
    initiated_by: Uuid,
    seller_signature: Option<String>,
    buyer_signature: Option<String>,
    seller_confirmed_at: Option<DateTime<Utc>>,
    buyer_confirmed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<TransferRow> for OwnershipTransfer {
    type Error = sqlx::Error;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let decode = |e: UnknownVariant| sqlx::Error::Decode(Box::new(e));

        Ok(Self {
            id: row.id,
            fowl_id: row.fowl_id,
            from_user_id: row.from_user_id,
            to_user_id: row.to_user_id,
            transfer_type: row.transfer_type.parse().map_err(decode)?,
            transfer_price: row.transfer_price,
            status: row.status.parse().map_err(decode)?,
            verification_method: row.verification_method.parse().map_err(decode)?,
            verification_code: row.verification_code,
            notes: row.notes,
            initiated_by: row.initiated_by,
            seller_signature: row.seller_signature,
            buyer_signature: row.buyer_signature,
            seller_confirmed_at: row.seller_confirmed_at,
            buyer_confirmed_at: row.buyer_confirmed_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

fn collect(rows: Vec<TransferRow>) -> Result<Vec<OwnershipTransfer>, sqlx::Error> {
    rows.into_iter().map(OwnershipTransfer::try_from).collect()
}

impl OwnershipTransfer {
    /// Inserts a transfer built with [`OwnershipTransfer::new`]
    pub async fn insert(pool: &PgPool, transfer: &OwnershipTransfer) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            INSERT INTO transfers (
                id, fowl_id, from_user_id, to_user_id, transfer_type, transfer_price,
                status, verification_method, verification_code, notes, initiated_by,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.fowl_id)
        .bind(transfer.from_user_id)
        .bind(transfer.to_user_id)
        .bind(transfer.transfer_type.as_str())
        .bind(transfer.transfer_price)
        .bind(transfer.status.as_str())
        .bind(transfer.verification_method.as_str())
        .bind(&transfer.verification_code)
        .bind(&transfer.notes)
        .bind(transfer.initiated_by)
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .bind(transfer.version)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT * FROM transfers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(OwnershipTransfer::try_from).transpose()
    }

    /// Finds the transfer for a fowl that has not reached a terminal status
    pub async fn find_open_for_fowl(
        pool: &PgPool,
        fowl_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT * FROM transfers
            WHERE fowl_id = $1
              AND status IN ('PENDING', 'SELLER_CONFIRMED', 'BUYER_CONFIRMED')
            LIMIT 1
            "#,
        )
        .bind(fowl_id)
        .fetch_optional(pool)
        .await?;

        row.map(OwnershipTransfer::try_from).transpose()
    }

    /// Transfers where the user is seller or buyer, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT * FROM transfers
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        collect(rows)
    }

    pub async fn list_for_fowl(pool: &PgPool, fowl_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT * FROM transfers
            WHERE fowl_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(fowl_id)
        .fetch_all(pool)
        .await?;

        collect(rows)
    }

    /// Writes the mutable fields if the stored version still matches.
    ///
    /// Returns `None` when another writer got there first.
    pub async fn update_if_version(
        pool: &PgPool,
        transfer: &OwnershipTransfer,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            UPDATE transfers
            SET
                status = $3,
                seller_signature = $4,
                buyer_signature = $5,
                seller_confirmed_at = $6,
                buyer_confirmed_at = $7,
                completed_at = $8,
                cancelled_at = $9,
                cancelled_by = $10,
                cancel_reason = $11,
                updated_at = $12,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.version)
        .bind(transfer.status.as_str())
        .bind(&transfer.seller_signature)
        .bind(&transfer.buyer_signature)
        .bind(transfer.seller_confirmed_at)
        .bind(transfer.buyer_confirmed_at)
        .bind(transfer.completed_at)
        .bind(transfer.cancelled_at)
        .bind(transfer.cancelled_by)
        .bind(&transfer.cancel_reason)
        .bind(transfer.updated_at)
        .fetch_optional(pool)
        .await?;

        row.map(OwnershipTransfer::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(seller: Uuid, buyer: Uuid) -> OwnershipTransfer {
        OwnershipTransfer::new(
            CreateTransferData {
                fowl_id: Uuid::new_v4(),
                from_user_id: seller,
                to_user_id: buyer,
                transfer_type: TransferType::Sale,
                transfer_price: 15_000,
                verification_method: VerificationMethod::DualConfirmation,
                verification_code: None,
                notes: None,
                initiated_by: seller,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_buyer_then_seller_completes() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);

        let role = transfer.apply_confirmation(buyer, None, Utc::now()).unwrap();
        assert_eq!(role, PartyRole::Buyer);
        assert_eq!(transfer.status, TransferStatus::BuyerConfirmed);
        assert!(transfer.completed_at.is_none());

        transfer.apply_confirmation(seller, None, Utc::now()).unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert!(transfer.seller_confirmed_at.is_some());
        assert!(transfer.buyer_confirmed_at.is_some());
        assert!(transfer.completed_at.is_some());
    }

    #[test]
    fn test_seller_first_moves_to_seller_confirmed() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);

        transfer.apply_confirmation(seller, None, Utc::now()).unwrap();
        assert_eq!(transfer.status, TransferStatus::SellerConfirmed);
    }

    #[test]
    fn test_stranger_cannot_confirm() {
        let mut transfer = pending(Uuid::new_v4(), Uuid::new_v4());
        let before = transfer.clone();

        let err = transfer
            .apply_confirmation(Uuid::new_v4(), None, Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::NotAParty);
        assert_eq!(transfer, before);
    }

    #[test]
    fn test_double_confirmation_rejected() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);
        transfer.apply_confirmation(buyer, None, Utc::now()).unwrap();

        let err = transfer
            .apply_confirmation(buyer, None, Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::AlreadyConfirmed(PartyRole::Buyer));
        assert_eq!(transfer.status, TransferStatus::BuyerConfirmed);
    }

    #[test]
    fn test_cancel_stores_reason() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);

        transfer
            .apply_cancellation(buyer, "  changed mind ", Utc::now())
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Cancelled);
        assert_eq!(transfer.cancel_reason.as_deref(), Some("changed mind"));
        assert_eq!(transfer.cancelled_by, Some(buyer));
    }

    #[test]
    fn test_cancel_after_completion_rejected() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);
        transfer.apply_confirmation(buyer, None, Utc::now()).unwrap();
        transfer.apply_confirmation(seller, None, Utc::now()).unwrap();
        let before = transfer.clone();

        let err = transfer
            .apply_cancellation(seller, "too late", Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidState {
                status: TransferStatus::Completed,
                ..
            }
        ));
        assert_eq!(transfer, before);
    }

    #[test]
    fn test_cancel_twice_rejected() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);
        transfer.apply_cancellation(seller, "no", Utc::now()).unwrap();

        assert!(transfer.apply_cancellation(seller, "no", Utc::now()).is_err());
        assert!(transfer
            .apply_confirmation(buyer, None, Utc::now())
            .is_err());
    }

    #[test]
    fn test_blank_reason_rejected() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);

        let err = transfer
            .apply_cancellation(seller, "   ", Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::ReasonRequired);
        assert_eq!(transfer.status, TransferStatus::Pending);
    }

    #[test]
    fn test_disputed_is_terminal() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);
        transfer.status = TransferStatus::Disputed;

        assert!(!transfer.can_cancel());
        assert!(transfer
            .apply_confirmation(seller, None, Utc::now())
            .is_err());
    }

    #[test]
    fn test_code_hidden_from_counterparty() {
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let mut transfer = pending(seller, buyer);
        transfer.verification_code = Some("123456".to_string());

        assert!(transfer.redacted_for(buyer).verification_code.is_none());
        assert_eq!(
            transfer.redacted_for(seller).verification_code.as_deref(),
            Some("123456")
        );
    }

    #[test]
    fn test_status_strings_roundtrip() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::SellerConfirmed,
            TransferStatus::BuyerConfirmed,
            TransferStatus::Completed,
            TransferStatus::Cancelled,
            TransferStatus::Disputed,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<TransferStatus>().is_err());
    }
}
