use askama::Template;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::middleware::{auth::AuthenticatedUser, state::AppState};
use crate::error::Result;
use crate::models::certificate::DigitalCertificate;
use crate::services::{
    certificate_issuer,
    certificate_verifier::{self, CertificateDetails, CertificateVerification},
    qr_generator,
};

#[derive(Template)]
#[template(path = "certificates/show.html")]
struct CertificateTemplate {
    certificate_number: String,
    fowl_name: String,
    fowl_breed: String,
    fowl_color: String,
    fowl_gender: String,
    hatch_date: String,
    registration_number: String,
    previous_owner_name: String,
    new_owner_name: String,
    transfer_type: String,
    transfer_price: String,
    health_record_count: u64,
    latest_vaccination: String,
    issued_on: String,
    is_revoked: bool,
    revoked_on: String,
    revoked_reason: String,
    verification_url: String,
    qr_data_uri: String,
    signature: String,
}

fn text(value: &JsonValue, key: &str) -> Option<String> {
    value.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn text_or_empty(value: &JsonValue, key: &str) -> String {
    text(value, key).unwrap_or_default()
}

/// Minor units rendered with two decimals
fn format_price(minor_units: i64) -> String {
    if minor_units == 0 {
        return "No charge".to_string();
    }
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}

impl CertificateTemplate {
    fn new(details: CertificateDetails, qr_data_uri: String) -> Self {
        let CertificateDetails {
            certificate,
            previous_owner_name,
            new_owner_name,
            verification_url,
        } = details;
        let snapshot = &certificate.fowl_snapshot;
        let health = &certificate.health_summary;

        let latest_vaccination = health
            .get("latest_vaccination")
            .and_then(|v| {
                let description = text(v, "description")?;
                match text(v, "recorded_at") {
                    Some(at) => Some(format!("{} ({})", description, at.get(..10).unwrap_or(&at))),
                    None => Some(description),
                }
            })
            .unwrap_or_default();

        Self {
            fowl_name: text_or_empty(snapshot, "name"),
            fowl_breed: text_or_empty(snapshot, "breed"),
            fowl_color: text_or_empty(snapshot, "color"),
            fowl_gender: text_or_empty(snapshot, "gender"),
            hatch_date: text_or_empty(snapshot, "hatch_date"),
            registration_number: text_or_empty(snapshot, "registration_number"),
            health_record_count: health
                .get("record_count")
                .and_then(JsonValue::as_u64)
                .unwrap_or(0),
            latest_vaccination,
            previous_owner_name,
            new_owner_name,
            transfer_type: certificate.transfer_type.label().to_string(),
            transfer_price: format_price(certificate.transfer_price),
            issued_on: certificate.issued_at.format("%B %-d, %Y").to_string(),
            is_revoked: certificate.is_revoked(),
            revoked_on: certificate
                .revoked_at
                .map(|at| at.format("%B %-d, %Y").to_string())
                .unwrap_or_default(),
            revoked_reason: certificate.revoked_reason.clone().unwrap_or_default(),
            verification_url,
            qr_data_uri,
            certificate_number: certificate.certificate_number,
            signature: certificate.signature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: String,
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CertificateDetails>> {
    let details =
        certificate_verifier::load_certificate_details(&state.repos, &state.config.base_url, id)
            .await?;
    Ok(Json(details))
}

/// Printable certificate page
async fn view(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let details =
        certificate_verifier::load_certificate_details(&state.repos, &state.config.base_url, id)
            .await?;
    let qr_data_uri = qr_generator::generate_qr_data_uri(&details.verification_url)?;

    Ok(CertificateTemplate::new(details, qr_data_uri))
}

async fn qr_code(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let details =
        certificate_verifier::load_certificate_details(&state.repos, &state.config.base_url, id)
            .await?;
    let svg = qr_generator::generate_qr_svg(&details.verification_url)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

async fn verify(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<CertificateVerification>> {
    let result =
        certificate_verifier::verify_certificate(&state.repos, &state.signer, &number).await?;
    tracing::info!(result = result.result_type(), "Certificate verification completed");
    Ok(Json(result))
}

async fn revoke(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<DigitalCertificate>> {
    let certificate =
        certificate_issuer::revoke_certificate(&state.repos, id, caller.user_id, &request.reason)
            .await?;
    Ok(Json(certificate))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/certificates/verify/:number", get(verify))
        .route("/certificates/:id", get(show))
        .route("/certificates/:id/view", get(view))
        .route("/certificates/:id/qr.svg", get(qr_code))
        .route("/certificates/:id/revoke", post(revoke))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0), "No charge");
        assert_eq!(format_price(12_005), "120.05");
        assert_eq!(format_price(99), "0.99");
    }
}
