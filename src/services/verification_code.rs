use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
};

const CODE_SPACE: u32 = 1_000_000;
// Largest multiple of CODE_SPACE that fits in u32; draws above it are rejected
const ACCEPT_BELOW: u32 = u32::MAX - (u32::MAX % CODE_SPACE);

#[derive(thiserror::Error, Debug)]
#[error("Failed to generate verification code")]
pub struct CodeGenerationError;

/// Generates a uniformly distributed 6-digit code
pub fn generate() -> Result<String, CodeGenerationError> {
    let rng = SystemRandom::new();
    loop {
        let mut bytes = [0u8; 4];
        rng.fill(&mut bytes).map_err(|_| CodeGenerationError)?;
        let value = u32::from_be_bytes(bytes);
        if value < ACCEPT_BELOW {
            return Ok(format!("{:06}", value % CODE_SPACE));
        }
    }
}

/// Compares a user-entered code against the stored one, ignoring surrounding whitespace.
///
/// Both sides go through HMAC under a one-off key so the comparison runs in
/// constant time.
pub fn matches(expected: &str, supplied: &str) -> bool {
    let Ok(key) = hmac::Key::generate(hmac::HMAC_SHA256, &SystemRandom::new()) else {
        return false;
    };
    let tag = hmac::sign(&key, expected.as_bytes());
    hmac::verify(&key, supplied.trim().as_bytes(), tag.as_ref()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_six_digits() {
        for _ in 0..50 {
            let code = generate().unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_matches_trims_input() {
        assert!(matches("042917", " 042917\n"));
        assert!(!matches("042917", "42917"));
        assert!(!matches("042917", ""));
        assert!(!matches("042917", "042918"));
        assert!(!matches("042917", "0429170"));
    }
}
