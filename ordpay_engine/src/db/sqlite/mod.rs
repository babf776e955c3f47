pub mod db;
mod errors;

pub mod catalog;
pub mod idempotency;
pub mod incidents;
pub mod orders;
pub mod promotions;
pub mod rate_limits;
pub mod transactions;
pub mod webhooks;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

const SQLITE_DB_URL: &str = "sqlite://data/ordpay_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("ORDPAY_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ORDPAY_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Creates a connection pool. Writers wait up to [`BUSY_TIMEOUT`] for the database lock rather than failing
/// immediately, which is what lets concurrent confirmations of the same order serialise on the status swap.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| SqliteDatabaseError::InvalidUrl(format!("{url}: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
