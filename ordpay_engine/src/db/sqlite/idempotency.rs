use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{db::sqlite::SqliteDatabaseError, db_types::IdempotencyRecord};

/// Claims the idempotency key for the order. Returns `false` (and writes nothing) if the key is already taken.
pub async fn claim_key(
    key: &str,
    request_hash: &str,
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        "INSERT INTO idempotency_keys (key, request_hash, order_id, created_at) VALUES (?, ?, ?, ?) ON CONFLICT (key) \
         DO NOTHING",
    )
    .bind(key)
    .bind(request_hash)
    .bind(order_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn fetch_record(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, SqliteDatabaseError> {
    let record = sqlx::query_as::<_, IdempotencyRecord>(
        "SELECT key, request_hash, order_id, created_at FROM idempotency_keys WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn remove_if_older_than(
    key: &str,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query("DELETE FROM idempotency_keys WHERE key = ? AND created_at < ?")
        .bind(key)
        .bind(cutoff)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn purge_older_than(cutoff: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, SqliteDatabaseError> {
    let res = sqlx::query("DELETE FROM idempotency_keys WHERE created_at < ?").bind(cutoff).execute(conn).await?;
    Ok(res.rows_affected())
}
