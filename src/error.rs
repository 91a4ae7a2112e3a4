use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::models::transfer::TransitionError;
use crate::services::{
    account_cleanup::CleanupError, certificate_issuer::CertificateError,
    inventory::InventoryError, qr_generator::QrGenerationError, transfers::TransferError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_debug = format!("{:?}", self);

        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Internal(ref e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Conflict => AppError::Conflict(err.to_string()),
            StoreError::Duplicate(_) => AppError::Conflict(err.to_string()),
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotAParty => AppError::Forbidden(err.to_string()),
            TransitionError::AlreadyConfirmed(_) | TransitionError::InvalidState { .. } => {
                AppError::Conflict(err.to_string())
            }
            TransitionError::ReasonRequired => AppError::Validation(err.to_string()),
        }
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Store(e) => e.into(),
            TransferError::Transition(e) => e.into(),
            TransferError::CodeGeneration(e) => AppError::Internal(e.into()),
            TransferError::TransferNotFound
            | TransferError::FowlNotFound
            | TransferError::BuyerNotFound => AppError::NotFound(err.to_string()),
            TransferError::NotFowlOwner => AppError::Forbidden(err.to_string()),
            TransferError::FowlAlreadyInTransfer | TransferError::Conflict => {
                AppError::Conflict(err.to_string())
            }
            TransferError::Validation(msg) => AppError::Validation(msg),
            TransferError::VerificationCodeRequired
            | TransferError::InvalidVerificationCode
            | TransferError::SignatureRequired => AppError::Validation(err.to_string()),
        }
    }
}

impl From<CertificateError> for AppError {
    fn from(err: CertificateError) -> Self {
        match err {
            CertificateError::Store(e) => e.into(),
            CertificateError::Serialization(e) => AppError::Internal(e.into()),
            CertificateError::TransferNotCompleted(_) | CertificateError::AlreadyRevoked => {
                AppError::Conflict(err.to_string())
            }
            CertificateError::TransferNotFound
            | CertificateError::FowlNotFound
            | CertificateError::CertificateNotFound => AppError::NotFound(err.to_string()),
            CertificateError::NotAParty => AppError::Forbidden(err.to_string()),
            CertificateError::ReasonRequired => AppError::Validation(err.to_string()),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Store(e) => e.into(),
            InventoryError::Validation(msg) => AppError::Validation(msg),
            InventoryError::FowlNotFound | InventoryError::UserNotFound => {
                AppError::NotFound(err.to_string())
            }
            InventoryError::NotOwner => AppError::Forbidden(err.to_string()),
            InventoryError::TransferInProgress => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<CleanupError> for AppError {
    fn from(err: CleanupError) -> Self {
        match err {
            CleanupError::Store(e) => e.into(),
            CleanupError::UserNotFound => AppError::NotFound(err.to_string()),
            CleanupError::Forbidden => AppError::Forbidden(err.to_string()),
        }
    }
}

impl From<QrGenerationError> for AppError {
    fn from(err: QrGenerationError) -> Self {
        AppError::Internal(err.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transfer::{PartyRole, TransferStatus};

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_transfer_errors_map_to_statuses() {
        assert_eq!(
            status_of(TransferError::Transition(TransitionError::NotAParty)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(TransferError::Transition(TransitionError::AlreadyConfirmed(
                PartyRole::Seller
            ))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TransferError::Transition(TransitionError::InvalidState {
                status: TransferStatus::Completed,
                action: "cancel",
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TransferError::InvalidVerificationCode),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(TransferError::from(StoreError::Conflict)),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(TransferError::TransferNotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_certificate_errors_map_to_statuses() {
        assert_eq!(status_of(CertificateError::AlreadyRevoked), StatusCode::CONFLICT);
        assert_eq!(status_of(CertificateError::NotAParty), StatusCode::FORBIDDEN);
        assert_eq!(status_of(CertificateError::ReasonRequired), StatusCode::BAD_REQUEST);
    }
}
