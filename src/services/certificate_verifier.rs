use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::db::Repositories;
use crate::models::certificate::DigitalCertificate;
use crate::services::certificate_issuer::{signing_bytes, CertificateError};
use crate::services::signature::CertificateSigner;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CertificateVerification {
    Valid { certificate: DigitalCertificate },
    NotFound { certificate_number: String },
    Revoked { certificate: DigitalCertificate },
    SignatureMismatch { certificate_number: String },
}

impl CertificateVerification {
    /// Returns the result type as a string for logging
    pub fn result_type(&self) -> &'static str {
        match self {
            CertificateVerification::Valid { .. } => "valid",
            CertificateVerification::NotFound { .. } => "not_found",
            CertificateVerification::Revoked { .. } => "revoked",
            CertificateVerification::SignatureMismatch { .. } => "signature_mismatch",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CertificateVerification::Valid { .. })
    }
}

/// Verifies a certificate by its public number
///
/// This function:
/// 1. Looks up the certificate
/// 2. Recomputes the HMAC over the signed fields
/// 3. Checks whether it has been revoked
#[tracing::instrument(skip(repos, signer))]
pub async fn verify_certificate(
    repos: &Repositories,
    signer: &CertificateSigner,
    certificate_number: &str,
) -> Result<CertificateVerification, CertificateError> {
    let certificate = match repos
        .certificates
        .find_certificate_by_number(certificate_number.trim())
        .await?
    {
        Some(c) => c,
        None => {
            tracing::warn!("Certificate not found");
            return Ok(CertificateVerification::NotFound {
                certificate_number: certificate_number.to_string(),
            });
        }
    };

    // A tampered record is reported as such even if it was also revoked
    if signer
        .verify(&signing_bytes(&certificate)?, &certificate.signature)
        .is_err()
    {
        tracing::error!(certificate_id = %certificate.id, "Certificate signature mismatch");
        return Ok(CertificateVerification::SignatureMismatch {
            certificate_number: certificate.certificate_number,
        });
    }

    let result = if certificate.is_revoked() {
        tracing::info!(certificate_id = %certificate.id, "Certificate revoked");
        CertificateVerification::Revoked { certificate }
    } else {
        tracing::info!(certificate_id = %certificate.id, "Certificate verified successfully");
        CertificateVerification::Valid { certificate }
    };

    Ok(result)
}

/// Public link printed on the certificate and encoded in its QR code
pub fn verification_url(base_url: &str, certificate_number: &str) -> Result<Url, url::ParseError> {
    let base = Url::parse(base_url)?;
    let mut url = base.join("certificates/verify/")?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .push(certificate_number);
    Ok(url)
}

/// Certificate plus the names needed to render it
#[derive(Debug, Clone, Serialize)]
pub struct CertificateDetails {
    pub certificate: DigitalCertificate,
    pub previous_owner_name: String,
    pub new_owner_name: String,
    pub verification_url: String,
}

const FORMER_MEMBER: &str = "Former member";

pub async fn load_certificate_details(
    repos: &Repositories,
    base_url: &str,
    certificate_id: Uuid,
) -> Result<CertificateDetails, CertificateError> {
    let certificate = repos
        .certificates
        .find_certificate(certificate_id)
        .await?
        .ok_or(CertificateError::CertificateNotFound)?;

    let previous_owner_name = repos
        .users
        .find_user(certificate.previous_owner_id)
        .await?
        .map(|u| u.display_name)
        .unwrap_or_else(|| FORMER_MEMBER.to_string());
    let new_owner_name = repos
        .users
        .find_user(certificate.new_owner_id)
        .await?
        .map(|u| u.display_name)
        .unwrap_or_else(|| FORMER_MEMBER.to_string());

    let verification_url = verification_url(base_url, &certificate.certificate_number)
        .map(|u| u.to_string())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "BASE_URL is not a valid URL");
            format!("/certificates/verify/{}", certificate.certificate_number)
        });

    Ok(CertificateDetails {
        certificate,
        previous_owner_name,
        new_owner_name,
        verification_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transfer::TransferType;
    use chrono::{SubsecRound, Utc};

    async fn stored_certificate(
        repos: &Repositories,
        signer: &CertificateSigner,
    ) -> DigitalCertificate {
        let mut certificate = DigitalCertificate {
            id: Uuid::new_v4(),
            certificate_number: "FWL-20250101-ABCDEF12".to_string(),
            transfer_id: Uuid::new_v4(),
            fowl_id: Uuid::new_v4(),
            previous_owner_id: Uuid::new_v4(),
            new_owner_id: Uuid::new_v4(),
            transfer_type: TransferType::Trade,
            transfer_price: 0,
            fowl_snapshot: serde_json::json!({"name": "Rusty"}),
            health_summary: serde_json::json!({"record_count": 0}),
            signature: String::new(),
            issued_at: Utc::now().trunc_subsecs(0),
            revoked_at: None,
            revoked_reason: None,
        };
        certificate.signature = signer.sign(&signing_bytes(&certificate).unwrap());
        repos
            .certificates
            .insert_certificate(&certificate)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_then_revoked() {
        let repos = Repositories::in_memory();
        let signer = CertificateSigner::new(b"key");
        let certificate = stored_certificate(&repos, &signer).await;

        let result = verify_certificate(&repos, &signer, &certificate.certificate_number)
            .await
            .unwrap();
        assert!(result.is_valid());

        repos
            .certificates
            .revoke_certificate(certificate.id, "lost", Utc::now())
            .await
            .unwrap();
        let result = verify_certificate(&repos, &signer, &certificate.certificate_number)
            .await
            .unwrap();
        assert_eq!(result.result_type(), "revoked");
    }

    #[tokio::test]
    async fn test_wrong_key_reports_mismatch() {
        let repos = Repositories::in_memory();
        let certificate = stored_certificate(&repos, &CertificateSigner::new(b"key")).await;

        let result = verify_certificate(
            &repos,
            &CertificateSigner::new(b"other-key"),
            &certificate.certificate_number,
        )
        .await
        .unwrap();
        assert_eq!(result.result_type(), "signature_mismatch");
    }

    #[tokio::test]
    async fn test_unknown_number() {
        let repos = Repositories::in_memory();
        let result = verify_certificate(&repos, &CertificateSigner::new(b"key"), "FWL-NOPE")
            .await
            .unwrap();
        assert_eq!(result.result_type(), "not_found");
    }

    #[test]
    fn test_verification_url() {
        let url = verification_url("https://fowlmart.example", "FWL-20250101-ABCDEF12").unwrap();
        assert_eq!(
            url.as_str(),
            "https://fowlmart.example/certificates/verify/FWL-20250101-ABCDEF12"
        );

        let url = verification_url("https://fowlmart.example/app/", "FWL-1").unwrap();
        assert_eq!(url.as_str(), "https://fowlmart.example/app/certificates/verify/FWL-1");
    }
}
