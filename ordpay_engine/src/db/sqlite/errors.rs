use thiserror::Error;

use crate::db::traits::StorageError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Payment transaction {0} disappeared during the update")]
    TransactionNotFound(String),
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

impl From<SqliteDatabaseError> for StorageError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DriverError(e) => StorageError::from(e),
            SqliteDatabaseError::OrderNotFound(_) | SqliteDatabaseError::TransactionNotFound(_) => {
                StorageError::NotFound(e.to_string())
            },
            SqliteDatabaseError::InvalidUrl(_) => StorageError::Unavailable(e.to_string()),
            _ => StorageError::DatabaseError(e.to_string()),
        }
    }
}
