use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use crate::db::{Repositories, StoreError};
use crate::models::{
    certificate::DigitalCertificate,
    fowl::Fowl,
    health_record::{HealthRecord, HealthRecordType},
    transfer::{OwnershipTransfer, TransferStatus, TransferType},
};
use crate::services::signature::CertificateSigner;

#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Certificate payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Certificates are only issued for completed transfers (transfer is {0})")]
    TransferNotCompleted(TransferStatus),

    #[error("Transfer not found")]
    TransferNotFound,

    #[error("Fowl not found")]
    FowlNotFound,

    #[error("Certificate not found")]
    CertificateNotFound,

    #[error("Only the parties to the transfer can revoke its certificate")]
    NotAParty,

    #[error("A revocation reason is required")]
    ReasonRequired,

    #[error("Certificate has already been revoked")]
    AlreadyRevoked,
}

/// Fields covered by the certificate signature, in signing order.
#[derive(Serialize)]
struct SignedFields<'a> {
    certificate_number: &'a str,
    transfer_id: Uuid,
    fowl_id: Uuid,
    previous_owner_id: Uuid,
    new_owner_id: Uuid,
    transfer_type: TransferType,
    transfer_price: i64,
    fowl_snapshot: JsonValue,
    health_summary: JsonValue,
    issued_at: i64,
}

/// Rebuilds objects with sorted keys so JSONB storage cannot change the bytes we sign.
fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub(crate) fn signing_bytes(
    certificate: &DigitalCertificate,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SignedFields {
        certificate_number: &certificate.certificate_number,
        transfer_id: certificate.transfer_id,
        fowl_id: certificate.fowl_id,
        previous_owner_id: certificate.previous_owner_id,
        new_owner_id: certificate.new_owner_id,
        transfer_type: certificate.transfer_type,
        transfer_price: certificate.transfer_price,
        fowl_snapshot: canonicalize(&certificate.fowl_snapshot),
        health_summary: canonicalize(&certificate.health_summary),
        issued_at: certificate.issued_at.timestamp(),
    })
}

/// `FWL-<issue date>-<first 8 hex digits of the transfer id>`
pub fn certificate_number(transfer_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let short = transfer_id.simple().to_string()[..8].to_uppercase();
    format!("FWL-{}-{}", issued_at.format("%Y%m%d"), short)
}

fn fowl_snapshot(fowl: &Fowl) -> JsonValue {
    json!({
        "name": fowl.name,
        "breed": fowl.breed,
        "color": fowl.color,
        "gender": fowl.gender.as_str(),
        "hatch_date": fowl.hatch_date.map(|d| d.to_string()),
        "registration_number": fowl.registration_number,
    })
}

/// Summarises health history; `records` must be newest first.
fn health_summary(records: &[HealthRecord]) -> JsonValue {
    let latest = |kind: HealthRecordType| {
        records.iter().find(|r| r.record_type == kind).map(|r| {
            json!({
                "description": r.description,
                "recorded_at": r.recorded_at.to_rfc3339(),
            })
        })
    };

    json!({
        "record_count": records.len(),
        "latest_vaccination": latest(HealthRecordType::Vaccination),
        "latest_checkup": latest(HealthRecordType::Checkup),
        "last_recorded_at": records.first().map(|r| r.recorded_at.to_rfc3339()),
    })
}

/// Issues the ownership certificate for a completed transfer.
///
/// Idempotent: if the transfer already has a certificate, or a concurrent
/// request stores one first, that certificate is returned.
#[tracing::instrument(skip(repos, signer, transfer), fields(transfer_id = %transfer.id))]
pub async fn issue_certificate(
    repos: &Repositories,
    signer: &CertificateSigner,
    transfer: &OwnershipTransfer,
) -> Result<DigitalCertificate, CertificateError> {
    if transfer.status != TransferStatus::Completed || !transfer.is_fully_confirmed() {
        return Err(CertificateError::TransferNotCompleted(transfer.status));
    }

    if let Some(existing) = repos
        .certificates
        .find_certificate_by_transfer(transfer.id)
        .await?
    {
        tracing::debug!(certificate_id = %existing.id, "Certificate already issued");
        return Ok(existing);
    }

    let fowl = repos
        .fowls
        .find_fowl(transfer.fowl_id)
        .await?
        .ok_or(CertificateError::FowlNotFound)?;
    let health_records = repos.health_records.list_health_records(fowl.id).await?;

    let issued_at = Utc::now().trunc_subsecs(0);
    let mut certificate = DigitalCertificate {
        id: Uuid::new_v4(),
        certificate_number: certificate_number(transfer.id, issued_at),
        transfer_id: transfer.id,
        fowl_id: fowl.id,
        previous_owner_id: transfer.from_user_id,
        new_owner_id: transfer.to_user_id,
        transfer_type: transfer.transfer_type,
        transfer_price: transfer.transfer_price,
        fowl_snapshot: fowl_snapshot(&fowl),
        health_summary: health_summary(&health_records),
        signature: String::new(),
        issued_at,
        revoked_at: None,
        revoked_reason: None,
    };
    certificate.signature = signer.sign(&signing_bytes(&certificate)?);

    match repos.certificates.insert_certificate(&certificate).await {
        Ok(stored) => {
            tracing::info!(
                certificate_id = %stored.id,
                certificate_number = %stored.certificate_number,
                "Certificate issued"
            );
            Ok(stored)
        }
        Err(StoreError::Duplicate(_)) => {
            tracing::warn!("Certificate inserted concurrently, returning stored copy");
            repos
                .certificates
                .find_certificate_by_transfer(transfer.id)
                .await?
                .ok_or(CertificateError::CertificateNotFound)
        }
        Err(e) => Err(e.into()),
    }
}

/// Revokes a certificate on behalf of one of the transfer's parties
#[tracing::instrument(skip(repos, reason))]
pub async fn revoke_certificate(
    repos: &Repositories,
    certificate_id: Uuid,
    caller: Uuid,
    reason: &str,
) -> Result<DigitalCertificate, CertificateError> {
    let certificate = repos
        .certificates
        .find_certificate(certificate_id)
        .await?
        .ok_or(CertificateError::CertificateNotFound)?;

    if caller != certificate.previous_owner_id && caller != certificate.new_owner_id {
        return Err(CertificateError::NotAParty);
    }

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CertificateError::ReasonRequired);
    }
    if certificate.is_revoked() {
        return Err(CertificateError::AlreadyRevoked);
    }

    let revoked = repos
        .certificates
        .revoke_certificate(certificate_id, reason, Utc::now())
        .await
        .map_err(|e| match e {
            StoreError::Conflict => CertificateError::AlreadyRevoked,
            other => other.into(),
        })?;

    tracing::info!(
        certificate_number = %revoked.certificate_number,
        "Certificate revoked"
    );

    Ok(revoked)
}
