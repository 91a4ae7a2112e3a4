use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Repositories, StoreError};
use crate::models::{
    certificate::DigitalCertificate,
    transfer::{
        CreateTransferData, OwnershipTransfer, PartyRole, TransferStatus, TransferType,
        TransitionError, VerificationMethod,
    },
};
use crate::services::{
    certificate_issuer,
    signature::CertificateSigner,
    verification_code::{self, CodeGenerationError},
};

const MAX_NOTES_LEN: usize = 500;

#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    CodeGeneration(#[from] CodeGenerationError),

    #[error("{0}")]
    Validation(String),

    #[error("Transfer not found")]
    TransferNotFound,

    #[error("Fowl not found")]
    FowlNotFound,

    #[error("Buyer not found")]
    BuyerNotFound,

    #[error("Only the fowl's owner can start a transfer")]
    NotFowlOwner,

    #[error("This fowl already has a transfer in progress")]
    FowlAlreadyInTransfer,

    #[error("A verification code is required to confirm this transfer")]
    VerificationCodeRequired,

    #[error("The verification code is incorrect")]
    InvalidVerificationCode,

    #[error("A signature is required to confirm this transfer")]
    SignatureRequired,

    #[error("This transfer was updated by someone else. Reload and try again.")]
    Conflict,
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => TransferError::Conflict,
            other => TransferError::Store(other),
        }
    }
}

/// Inputs collected by the transfer initiation screen
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateTransferRequest {
    pub fowl_id: Uuid,
    pub to_user_id: Uuid,
    pub transfer_type: TransferType,
    #[serde(default)]
    pub transfer_price: i64,
    pub verification_method: VerificationMethod,
    pub notes: Option<String>,
}

impl InitiateTransferRequest {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.transfer_price < 0 {
            return Err(TransferError::Validation(
                "Transfer price cannot be negative".to_string(),
            ));
        }
        if self.transfer_type == TransferType::Sale && self.transfer_price == 0 {
            return Err(TransferError::Validation(
                "A sale needs a transfer price".to_string(),
            ));
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(TransferError::Validation(format!(
                    "Notes must be at most {} characters",
                    MAX_NOTES_LEN
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmTransferRequest {
    pub verification_code: Option<String>,
    pub signature: Option<String>,
}

/// Result of a successful confirmation
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub transfer: OwnershipTransfer,
    pub role: PartyRole,
    pub certificate: Option<DigitalCertificate>,
    /// Set when the transfer completed but the certificate could not be issued
    pub certificate_error: Option<String>,
    /// Set when the transfer completed but the fowl's owner could not be updated
    pub ownership_error: Option<String>,
}

/// A transfer as seen by one of its parties
#[derive(Debug, Clone, Serialize)]
pub struct TransferView {
    pub transfer: OwnershipTransfer,
    pub role: PartyRole,
    pub certificate: Option<DigitalCertificate>,
    pub certificate_error: Option<String>,
    pub ownership_error: Option<String>,
}

/// Follow-up writes of a completed transfer
#[derive(Debug, Default)]
struct Settlement {
    certificate: Option<DigitalCertificate>,
    certificate_error: Option<String>,
    ownership_error: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Starts a transfer of one of the caller's fowls
#[tracing::instrument(skip(repos, request), fields(fowl_id = %request.fowl_id))]
pub async fn initiate_transfer(
    repos: &Repositories,
    caller: Uuid,
    request: InitiateTransferRequest,
) -> Result<OwnershipTransfer, TransferError> {
    request.validate()?;

    let fowl = repos
        .fowls
        .find_fowl(request.fowl_id)
        .await?
        .ok_or(TransferError::FowlNotFound)?;
    if fowl.owner_id != caller {
        return Err(TransferError::NotFowlOwner);
    }

    if request.to_user_id == caller {
        return Err(TransferError::Validation(
            "You cannot transfer a fowl to yourself".to_string(),
        ));
    }
    repos
        .users
        .find_user(request.to_user_id)
        .await?
        .ok_or(TransferError::BuyerNotFound)?;

    if repos
        .transfers
        .find_open_transfer_for_fowl(fowl.id)
        .await?
        .is_some()
    {
        return Err(TransferError::FowlAlreadyInTransfer);
    }

    let verification_code = match request.verification_method {
        VerificationMethod::VerificationCode => Some(verification_code::generate()?),
        _ => None,
    };

    let transfer = OwnershipTransfer::new(
        CreateTransferData {
            fowl_id: fowl.id,
            from_user_id: caller,
            to_user_id: request.to_user_id,
            transfer_type: request.transfer_type,
            transfer_price: request.transfer_price,
            verification_method: request.verification_method,
            verification_code,
            notes: non_blank(request.notes),
            initiated_by: caller,
        },
        Utc::now(),
    );

    let transfer = repos
        .transfers
        .insert_transfer(&transfer)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => TransferError::FowlAlreadyInTransfer,
            other => other.into(),
        })?;

    tracing::info!(
        transfer_id = %transfer.id,
        transfer_type = transfer.transfer_type.as_str(),
        verification_method = transfer.verification_method.as_str(),
        "Transfer initiated"
    );

    Ok(transfer)
}

/// Loads a transfer for one of its parties
///
/// A completed transfer whose owner change or certificate did not go
/// through is settled again here.
#[tracing::instrument(skip(repos, signer))]
pub async fn load_transfer(
    repos: &Repositories,
    signer: &CertificateSigner,
    transfer_id: Uuid,
    caller: Uuid,
) -> Result<TransferView, TransferError> {
    let transfer = repos
        .transfers
        .find_transfer(transfer_id)
        .await?
        .ok_or(TransferError::TransferNotFound)?;
    let role = transfer
        .role_of(caller)
        .ok_or(TransitionError::NotAParty)?;

    let settlement = if transfer.status == TransferStatus::Completed {
        settle_completed(repos, signer, &transfer).await
    } else {
        Settlement::default()
    };

    Ok(TransferView {
        transfer: transfer.redacted_for(caller),
        role,
        certificate: settlement.certificate,
        certificate_error: settlement.certificate_error,
        ownership_error: settlement.ownership_error,
    })
}

/// Moves the fowl to the buyer unless it already moved on.
///
/// Only the latest completed transfer of a fowl may change its owner, so a
/// stale transfer never pulls the fowl back from a later buyer.
async fn settle_ownership(
    repos: &Repositories,
    transfer: &OwnershipTransfer,
) -> Result<(), StoreError> {
    let Some(fowl) = repos.fowls.find_fowl(transfer.fowl_id).await? else {
        return Ok(());
    };
    if fowl.owner_id != transfer.from_user_id {
        return Ok(());
    }

    let latest_completed = repos
        .transfers
        .list_transfers_for_fowl(transfer.fowl_id)
        .await?
        .into_iter()
        .find(|t| t.status == TransferStatus::Completed);
    if latest_completed.map(|t| t.id) != Some(transfer.id) {
        return Ok(());
    }

    repos
        .fowls
        .change_owner(transfer.fowl_id, transfer.to_user_id)
        .await?;
    tracing::info!(fowl_id = %transfer.fowl_id, "Fowl ownership moved to buyer");
    Ok(())
}

/// Runs the writes that follow completion. Each is idempotent and none
/// undo the completed status; failures are logged and reported.
async fn settle_completed(
    repos: &Repositories,
    signer: &CertificateSigner,
    transfer: &OwnershipTransfer,
) -> Settlement {
    let mut settlement = Settlement::default();

    if let Err(e) = settle_ownership(repos, transfer).await {
        tracing::error!(
            fowl_id = %transfer.fowl_id,
            error = %e,
            "Transfer completed but fowl ownership was not updated"
        );
        settlement.ownership_error = Some(format!("Fowl ownership was not updated: {}", e));
    }

    match certificate_issuer::issue_certificate(repos, signer, transfer).await {
        Ok(certificate) => settlement.certificate = Some(certificate),
        Err(e) => {
            tracing::error!(error = %e, "Transfer completed but certificate generation failed");
            settlement.certificate_error =
                Some(format!("Certificate could not be generated: {}", e));
        }
    }

    settlement
}

/// Transfers where the caller is seller or buyer, newest first
pub async fn list_transfers_for_user(
    repos: &Repositories,
    caller: Uuid,
) -> Result<Vec<OwnershipTransfer>, TransferError> {
    let transfers = repos.transfers.list_transfers_for_user(caller).await?;
    Ok(transfers.iter().map(|t| t.redacted_for(caller)).collect())
}

/// Completed transfers of a fowl, newest first
pub async fn ownership_history(
    repos: &Repositories,
    fowl_id: Uuid,
) -> Result<Vec<OwnershipTransfer>, TransferError> {
    repos
        .fowls
        .find_fowl(fowl_id)
        .await?
        .ok_or(TransferError::FowlNotFound)?;

    let transfers = repos.transfers.list_transfers_for_fowl(fowl_id).await?;
    Ok(transfers
        .iter()
        .filter(|t| t.status == TransferStatus::Completed)
        .map(|t| t.redacted_for(Uuid::nil()))
        .collect())
}

/// Checks the consent proof the transfer's verification method asks for
fn check_verification(
    transfer: &OwnershipTransfer,
    request: &ConfirmTransferRequest,
) -> Result<(), TransferError> {
    match transfer.verification_method {
        VerificationMethod::DualConfirmation => Ok(()),
        VerificationMethod::VerificationCode => {
            let supplied = non_blank(request.verification_code.clone())
                .ok_or(TransferError::VerificationCodeRequired)?;
            let expected = transfer
                .verification_code
                .as_deref()
                .ok_or(TransferError::InvalidVerificationCode)?;
            if verification_code::matches(expected, &supplied) {
                Ok(())
            } else {
                Err(TransferError::InvalidVerificationCode)
            }
        }
        VerificationMethod::DigitalSignature => {
            if non_blank(request.signature.clone()).is_some() {
                Ok(())
            } else {
                Err(TransferError::SignatureRequired)
            }
        }
    }
}

/// Confirms a transfer on behalf of the caller's role
///
/// This function:
/// 1. Loads the transfer and works out whether the caller is seller or buyer
/// 2. Checks the verification code or signature when the method asks for one
/// 3. Records the confirmation with a version check
/// 4. When both parties have confirmed, moves the fowl to the buyer and
///    issues the certificate
///
/// Steps after the transfer is stored as COMPLETED never undo it; their
/// failures are logged and returned in the outcome, and [`load_transfer`]
/// retries them.
#[tracing::instrument(skip(repos, signer, request))]
pub async fn confirm_transfer(
    repos: &Repositories,
    signer: &CertificateSigner,
    transfer_id: Uuid,
    caller: Uuid,
    request: ConfirmTransferRequest,
) -> Result<ConfirmOutcome, TransferError> {
    let mut transfer = repos
        .transfers
        .find_transfer(transfer_id)
        .await?
        .ok_or(TransferError::TransferNotFound)?;

    let role = transfer.confirmable_role(caller)?;
    check_verification(&transfer, &request)?;

    transfer.apply_confirmation(caller, non_blank(request.signature), Utc::now())?;
    let transfer = repos.transfers.update_transfer(&transfer).await?;

    tracing::info!(
        role = %role,
        status = %transfer.status,
        "Transfer confirmed"
    );

    let settlement = if transfer.status == TransferStatus::Completed {
        settle_completed(repos, signer, &transfer).await
    } else {
        Settlement::default()
    };

    Ok(ConfirmOutcome {
        transfer: transfer.redacted_for(caller),
        role,
        certificate: settlement.certificate,
        certificate_error: settlement.certificate_error,
        ownership_error: settlement.ownership_error,
    })
}

/// Cancels a transfer that has not completed yet
#[tracing::instrument(skip(repos, reason))]
pub async fn cancel_transfer(
    repos: &Repositories,
    transfer_id: Uuid,
    caller: Uuid,
    reason: &str,
) -> Result<OwnershipTransfer, TransferError> {
    let mut transfer = repos
        .transfers
        .find_transfer(transfer_id)
        .await?
        .ok_or(TransferError::TransferNotFound)?;

    transfer.apply_cancellation(caller, reason, Utc::now())?;
    let transfer = repos.transfers.update_transfer(&transfer).await?;

    tracing::info!("Transfer cancelled");

    Ok(transfer.redacted_for(caller))
}
