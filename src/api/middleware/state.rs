use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Repositories;
use crate::services::{signature::CertificateSigner, storage::ObjectStore};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub config: Config,
    pub signer: CertificateSigner,
    pub storage: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn new(repos: Repositories, config: Config, storage: Arc<dyn ObjectStore>) -> Self {
        let signer =
            CertificateSigner::new(config.certificate_signing_key.expose_secret().as_bytes());
        Self {
            repos,
            config,
            signer,
            storage,
        }
    }
}
