use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::AuthenticatedUser, state::AppState};
use crate::error::Result;
use crate::models::transfer::OwnershipTransfer;
use crate::services::{
    confirmation::{ConfirmationState, TransferConfirmation},
    transfers::{self, ConfirmTransferRequest, InitiateTransferRequest},
};

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

async fn initiate(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<InitiateTransferRequest>,
) -> Result<(StatusCode, Json<OwnershipTransfer>)> {
    let transfer = transfers::initiate_transfer(&state.repos, caller.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

async fn list_mine(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<OwnershipTransfer>>> {
    let transfers = transfers::list_transfers_for_user(&state.repos, caller.user_id).await?;
    Ok(Json(transfers))
}

async fn show(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfirmationState>> {
    let mut confirmation =
        TransferConfirmation::new(&state.repos, &state.signer, id, caller.user_id);
    confirmation.load_transfer().await?;
    Ok(Json(confirmation.into_state()))
}

async fn confirm(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmTransferRequest>,
) -> Result<Json<ConfirmationState>> {
    let mut confirmation =
        TransferConfirmation::new(&state.repos, &state.signer, id, caller.user_id);
    confirmation
        .confirm_transfer(request.verification_code, request.signature)
        .await?;
    Ok(Json(confirmation.into_state()))
}

async fn cancel(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<ConfirmationState>> {
    let mut confirmation =
        TransferConfirmation::new(&state.repos, &state.signer, id, caller.user_id);
    confirmation.cancel_transfer(&request.reason).await?;
    Ok(Json(confirmation.into_state()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transfers", post(initiate).get(list_mine))
        .route("/transfers/:id", get(show))
        .route("/transfers/:id/confirm", post(confirm))
        .route("/transfers/:id/cancel", post(cancel))
}
