use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::AuthenticatedUser, state::AppState};
use crate::error::Result;
use crate::models::{fowl::Fowl, health_record::HealthRecord, transfer::OwnershipTransfer};
use crate::services::{
    inventory::{self, ListingUpdate, NewFowl, NewHealthRecord},
    transfers,
};

#[derive(Debug, Deserialize)]
pub struct ForSaleQuery {
    pub breed: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(fowl): Json<NewFowl>,
) -> Result<(StatusCode, Json<Fowl>)> {
    let fowl = inventory::register_fowl(&state.repos, caller.user_id, fowl).await?;
    Ok((StatusCode::CREATED, Json(fowl)))
}

async fn list_mine(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<Fowl>>> {
    let fowls = state.repos.fowls.list_fowls_by_owner(caller.user_id).await?;
    Ok(Json(fowls))
}

async fn for_sale(
    State(state): State<AppState>,
    Query(query): Query<ForSaleQuery>,
) -> Result<Json<Vec<Fowl>>> {
    let breed = query
        .breed
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());
    let fowls = state.repos.fowls.list_fowls_for_sale(breed).await?;
    Ok(Json(fowls))
}

async fn show(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Fowl>> {
    Ok(Json(inventory::get_fowl(&state.repos, id).await?))
}

async fn update_listing(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ListingUpdate>,
) -> Result<Json<Fowl>> {
    let fowl = inventory::update_listing(&state.repos, id, caller.user_id, update).await?;
    Ok(Json(fowl))
}

async fn add_health_record(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(record): Json<NewHealthRecord>,
) -> Result<(StatusCode, Json<HealthRecord>)> {
    let record = inventory::add_health_record(&state.repos, id, caller.user_id, record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_health_records(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<HealthRecord>>> {
    Ok(Json(inventory::list_health_records(&state.repos, id).await?))
}

async fn ownership_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OwnershipTransfer>>> {
    Ok(Json(transfers::ownership_history(&state.repos, id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fowls", post(create).get(list_mine))
        .route("/fowls/for-sale", get(for_sale))
        .route("/fowls/:id", get(show))
        .route("/fowls/:id/listing", put(update_listing))
        .route(
            "/fowls/:id/health-records",
            post(add_health_record).get(list_health_records),
        )
        .route("/fowls/:id/transfers", get(ownership_history))
}
