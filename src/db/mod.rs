use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{
    AccountRepository, CascadeDeletion, CertificateRepository, FowlRepository,
    HealthRecordRepository, Repositories, StoreHealth, TransferRepository, UserRepository,
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record was modified by another request")]
    Conflict,

    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl StoreError {
    /// Maps a unique-constraint violation to `Duplicate`.
    pub fn from_insert(err: sqlx::Error, what: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(what)
            }
            _ => StoreError::Database(err),
        }
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
