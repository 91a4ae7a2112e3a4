use ring::hmac;

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not valid hex")]
    InvalidEncoding(#[from] hex::FromHexError),

    #[error("Signature does not match payload")]
    Mismatch,
}

/// HMAC-SHA256 signer for certificate payloads.
#[derive(Clone)]
pub struct CertificateSigner {
    key: hmac::Key,
}

impl CertificateSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Returns the lowercase hex tag for `payload`
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(hmac::sign(&self.key, payload).as_ref())
    }

    /// Constant-time check of a hex tag produced by [`CertificateSigner::sign`]
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError> {
        let tag = hex::decode(signature)?;
        hmac::verify(&self.key, payload, &tag).map_err(|_| SignatureError::Mismatch)
    }
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_hex_sha256() {
        let signer = CertificateSigner::new(b"test-signing-key");
        let signature = signer.sign(b"payload");

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(signer.verify(b"payload", &signature).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let signer = CertificateSigner::new(b"test-signing-key");
        let signature = signer.sign(b"payload");

        assert!(matches!(
            signer.verify(b"payload!", &signature),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_other_key_fails() {
        let signature = CertificateSigner::new(b"key-one").sign(b"payload");
        let other = CertificateSigner::new(b"key-two");

        assert!(other.verify(b"payload", &signature).is_err());
        assert!(matches!(
            other.verify(b"payload", "not-hex"),
            Err(SignatureError::InvalidEncoding(_))
        ));
    }
}
