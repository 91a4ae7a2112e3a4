use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Certificates are signed with HMAC-SHA256 under this key
    pub certificate_signing_key: Secret<String>,

    // Root directory of the local object store (photos, documents)
    pub storage_root: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            database_max_connections: config.get("database_max_connections").unwrap_or(20),
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            certificate_signing_key: Secret::new(config.get("certificate_signing_key")?),

            storage_root: config
                .get("storage_root")
                .unwrap_or_else(|_| "./storage".to_string()),
        })
    }
}
