// Services module - Business logic

pub mod account_cleanup;
pub mod certificate_issuer;
pub mod certificate_verifier;
pub mod confirmation;
pub mod inventory;
pub mod qr_generator;
pub mod signature;
pub mod storage;
pub mod transfers;
pub mod verification_code;
