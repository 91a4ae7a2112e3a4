use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::middleware::{auth::AuthenticatedUser, state::AppState};
use crate::error::Result;
use crate::models::user::{CreateUserData, User};
use crate::services::{
    account_cleanup::{self, DeletionSummary},
    inventory,
};

async fn create(
    State(state): State<AppState>,
    Json(data): Json<CreateUserData>,
) -> Result<(StatusCode, Json<User>)> {
    let user = inventory::create_user(&state.repos, data).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn show(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<User>> {
    Ok(Json(inventory::get_user(&state.repos, id).await?))
}

/// Deletes the caller's account and everything they own
async fn delete_me(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<DeletionSummary>> {
    let summary = account_cleanup::delete_user_data(
        &state.repos,
        state.storage.as_ref(),
        caller.user_id,
        caller.user_id,
    )
    .await?;
    Ok(Json(summary))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create))
        .route("/users/me", delete(delete_me))
        .route("/users/:id", get(show))
}
