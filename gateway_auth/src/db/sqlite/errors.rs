use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not apply database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}
