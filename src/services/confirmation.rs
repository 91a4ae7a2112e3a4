use serde::Serialize;
use uuid::Uuid;

use crate::db::Repositories;
use crate::models::{
    certificate::DigitalCertificate,
    transfer::{OwnershipTransfer, PartyRole, TransferStatus},
};
use crate::services::signature::CertificateSigner;
use crate::services::transfers::{self, ConfirmTransferRequest, TransferError};

/// What the confirmation screen shows for one transfer
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfirmationState {
    pub transfer: Option<OwnershipTransfer>,
    pub role: Option<PartyRole>,
    pub can_confirm: bool,
    pub can_cancel: bool,
    pub certificate: Option<DigitalCertificate>,
    pub certificate_error: Option<String>,
    pub is_complete: bool,
    pub error: Option<String>,
}

/// Screen-facing wrapper around the transfer workflow for one caller.
///
/// Every action refreshes [`ConfirmationState`]. Failures are kept in
/// `state.error` and also returned so the HTTP layer can choose a status.
pub struct TransferConfirmation<'a> {
    repos: &'a Repositories,
    signer: &'a CertificateSigner,
    transfer_id: Uuid,
    caller: Uuid,
    state: ConfirmationState,
}

impl<'a> TransferConfirmation<'a> {
    pub fn new(
        repos: &'a Repositories,
        signer: &'a CertificateSigner,
        transfer_id: Uuid,
        caller: Uuid,
    ) -> Self {
        Self {
            repos,
            signer,
            transfer_id,
            caller,
            state: ConfirmationState::default(),
        }
    }

    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }

    pub fn into_state(self) -> ConfirmationState {
        self.state
    }

    fn show(&mut self, transfer: OwnershipTransfer, role: PartyRole) {
        self.state.can_confirm = transfer.confirmable_role(self.caller).is_ok();
        self.state.can_cancel = transfer.can_cancel();
        self.state.is_complete = transfer.status == TransferStatus::Completed;
        self.state.role = Some(role);
        self.state.transfer = Some(transfer);
    }

    fn fail(&mut self, err: TransferError) -> TransferError {
        tracing::warn!(transfer_id = %self.transfer_id, error = %err, "Transfer action failed");
        self.state.error = Some(err.to_string());
        err
    }

    pub async fn load_transfer(&mut self) -> Result<(), TransferError> {
        self.state.error = None;
        match transfers::load_transfer(self.repos, self.signer, self.transfer_id, self.caller)
            .await
        {
            Ok(view) => {
                self.state.certificate = view.certificate;
                self.state.certificate_error = view.certificate_error;
                self.state.error = view.ownership_error;
                self.show(view.transfer, view.role);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn confirm_transfer(
        &mut self,
        verification_code: Option<String>,
        signature: Option<String>,
    ) -> Result<(), TransferError> {
        self.state.error = None;
        let request = ConfirmTransferRequest {
            verification_code,
            signature,
        };

        match transfers::confirm_transfer(
            self.repos,
            self.signer,
            self.transfer_id,
            self.caller,
            request,
        )
        .await
        {
            Ok(outcome) => {
                self.state.certificate = outcome.certificate;
                self.state.certificate_error = outcome.certificate_error;
                if let Some(ownership_error) = outcome.ownership_error {
                    self.state.error = Some(ownership_error);
                }
                self.show(outcome.transfer, outcome.role);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn cancel_transfer(&mut self, reason: &str) -> Result<(), TransferError> {
        self.state.error = None;
        match transfers::cancel_transfer(self.repos, self.transfer_id, self.caller, reason).await {
            Ok(transfer) => {
                if let Some(role) = transfer.role_of(self.caller) {
                    self.show(transfer, role);
                }
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transfer::VerificationMethod;
    use crate::services::transfers::tests::{
        fixture, sale, FailingCertificates, FailingOwnerChanges,
    };
    use crate::services::transfers::initiate_transfer;

    #[tokio::test]
    async fn test_state_follows_confirmations() {
        let f = fixture().await;
        let transfer = initiate_transfer(
            &f.repos,
            f.seller.id,
            sale(&f, VerificationMethod::DualConfirmation),
        )
        .await
        .unwrap();

        let mut buyer =
            TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.buyer.id);
        buyer.load_transfer().await.unwrap();
        assert_eq!(buyer.state().role, Some(PartyRole::Buyer));
        assert!(buyer.state().can_confirm);
        assert!(buyer.state().can_cancel);

        buyer.confirm_transfer(None, None).await.unwrap();
        assert!(!buyer.state().can_confirm);
        assert!(!buyer.state().is_complete);

        let mut seller = TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.seller.id);
        seller.load_transfer().await.unwrap();
        assert!(seller.state().can_confirm);
        seller.confirm_transfer(None, None).await.unwrap();

        let state = seller.into_state();
        assert!(state.is_complete);
        assert!(!state.can_cancel);
        assert!(state.certificate.is_some());
        assert!(state.certificate_error.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_errors_are_kept_in_state() {
        let f = fixture().await;
        let transfer = initiate_transfer(
            &f.repos,
            f.seller.id,
            sale(&f, VerificationMethod::DualConfirmation),
        )
        .await
        .unwrap();

        let mut seller = TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.seller.id);
        let err = seller.cancel_transfer("   ").await.unwrap_err();
        assert!(matches!(err, TransferError::Transition(_)));
        assert_eq!(
            seller.state().error.as_deref(),
            Some("A cancellation reason is required")
        );

        seller.cancel_transfer("changed mind").await.unwrap();
        assert!(seller.state().error.is_none());
        let cancelled = seller.state().transfer.as_ref().unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);
        assert!(!seller.state().can_confirm);
    }

    #[tokio::test]
    async fn test_unknown_transfer() {
        let f = fixture().await;
        let mut presenter =
            TransferConfirmation::new(&f.repos, &f.signer, Uuid::new_v4(), f.seller.id);
        assert!(presenter.load_transfer().await.is_err());
        assert_eq!(presenter.state().error.as_deref(), Some("Transfer not found"));
    }

    #[tokio::test]
    async fn test_completion_failures_reported_then_settled() {
        let mut f = fixture().await;
        FailingCertificates::wrap(&mut f.repos, 1);
        FailingOwnerChanges::wrap(&mut f.repos, 1);
        let transfer = initiate_transfer(
            &f.repos,
            f.seller.id,
            sale(&f, VerificationMethod::DualConfirmation),
        )
        .await
        .unwrap();

        let mut buyer = TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.buyer.id);
        buyer.confirm_transfer(None, None).await.unwrap();
        let mut seller = TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.seller.id);
        seller.confirm_transfer(None, None).await.unwrap();

        let state = seller.into_state();
        assert!(state.is_complete);
        assert!(state.certificate.is_none());
        assert!(state.certificate_error.is_some());
        assert!(state
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Fowl ownership was not updated")));

        let mut reopened =
            TransferConfirmation::new(&f.repos, &f.signer, transfer.id, f.seller.id);
        reopened.load_transfer().await.unwrap();
        let state = reopened.into_state();
        assert!(state.is_complete);
        assert!(state.certificate.is_some());
        assert!(state.certificate_error.is_none());
        assert!(state.error.is_none());

        let fowl = f.repos.fowls.find_fowl(f.fowl.id).await.unwrap().unwrap();
        assert_eq!(fowl.owner_id, f.buyer.id);
    }
}
