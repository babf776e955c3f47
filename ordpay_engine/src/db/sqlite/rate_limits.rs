use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{IdentifierType, RateLimitKey, RateLimitReputation, RateLimitWindow, ReputationTier},
};

/// Admits a request into the window if its count is below `ceiling`, as one UPSERT. Returns the new count, or `None`
/// when the request is over the limit.
pub async fn try_increment(
    key: &RateLimitKey,
    window_start: i64,
    window_end: i64,
    ceiling: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, SqliteDatabaseError> {
    // A fresh window would otherwise admit its first request unconditionally
    if ceiling <= 0 {
        return Ok(None);
    }
    let count: Option<i64> = sqlx::query_scalar(
        r#"
            INSERT INTO rate_limit_windows
                (identifier, identifier_type, operation, window_start, window_end, request_count, violation_count)
            VALUES (?, ?, ?, ?, ?, 1, 0)
            ON CONFLICT (identifier, identifier_type, operation, window_start)
            DO UPDATE SET request_count = request_count + 1 WHERE request_count < ?
            RETURNING request_count;
        "#,
    )
    .bind(&key.identifier)
    .bind(key.identifier_type)
    .bind(key.operation)
    .bind(window_start)
    .bind(window_end)
    .bind(ceiling)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Rate limit window {key}@{window_start}: {count:?} of {ceiling}");
    Ok(count)
}

pub async fn increment_window_violations(
    key: &RateLimitKey,
    window_start: i64,
    window_end: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO rate_limit_windows
                (identifier, identifier_type, operation, window_start, window_end, request_count, violation_count)
            VALUES (?, ?, ?, ?, ?, 0, 1)
            ON CONFLICT (identifier, identifier_type, operation, window_start)
            DO UPDATE SET violation_count = violation_count + 1;
        "#,
    )
    .bind(&key.identifier)
    .bind(key.identifier_type)
    .bind(key.operation)
    .bind(window_start)
    .bind(window_end)
    .execute(conn)
    .await?;
    Ok(())
}

/// Bumps the cumulative violation count for the identifier and returns the new total.
pub async fn increment_reputation_violations(
    identifier: &str,
    identifier_type: IdentifierType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let count: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO rate_limit_reputations (identifier, identifier_type, violation_count, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT (identifier, identifier_type)
            DO UPDATE SET violation_count = violation_count + 1, updated_at = excluded.updated_at
            RETURNING violation_count;
        "#,
    )
    .bind(identifier)
    .bind(identifier_type)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn fetch_window(
    key: &RateLimitKey,
    window_start: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<RateLimitWindow>, SqliteDatabaseError> {
    let window = sqlx::query_as::<_, RateLimitWindow>(
        "SELECT identifier, identifier_type, operation, window_start, window_end, request_count, violation_count FROM \
         rate_limit_windows WHERE identifier = ? AND identifier_type = ? AND operation = ? AND window_start = ?",
    )
    .bind(&key.identifier)
    .bind(key.identifier_type)
    .bind(key.operation)
    .bind(window_start)
    .fetch_optional(conn)
    .await?;
    Ok(window)
}

pub async fn fetch_reputation(
    identifier: &str,
    identifier_type: IdentifierType,
    conn: &mut SqliteConnection,
) -> Result<Option<RateLimitReputation>, SqliteDatabaseError> {
    let reputation = sqlx::query_as::<_, RateLimitReputation>(
        "SELECT identifier, identifier_type, violation_count, flagged_tier, updated_at FROM rate_limit_reputations \
         WHERE identifier = ? AND identifier_type = ?",
    )
    .bind(identifier)
    .bind(identifier_type)
    .fetch_optional(conn)
    .await?;
    Ok(reputation)
}

pub async fn set_flag(
    identifier: &str,
    identifier_type: IdentifierType,
    tier: Option<ReputationTier>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO rate_limit_reputations (identifier, identifier_type, violation_count, flagged_tier, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT (identifier, identifier_type)
            DO UPDATE SET flagged_tier = excluded.flagged_tier, updated_at = excluded.updated_at;
        "#,
    )
    .bind(identifier)
    .bind(identifier_type)
    .bind(tier)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn purge_windows(cutoff: i64, conn: &mut SqliteConnection) -> Result<u64, SqliteDatabaseError> {
    let res = sqlx::query("DELETE FROM rate_limit_windows WHERE window_end < ?").bind(cutoff).execute(conn).await?;
    Ok(res.rows_affected())
}
