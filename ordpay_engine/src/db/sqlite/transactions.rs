use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::InsertTransactionResult},
    db_types::{Money, NewPaymentTransaction, PaymentTransaction, TransactionKind, TransactionStatus},
};

const TX_COLUMNS: &str = "id, order_id, provider_reference, kind, amount, currency, status, channel, provider_response, \
                          created_at, processed_at, settled_at";

/// Inserts the transaction unless one with the same provider reference already exists, in which case the existing
/// record is returned untouched.
pub async fn idempotent_insert(
    tx: &NewPaymentTransaction,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertTransactionResult, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO payment_transactions (order_id, provider_reference, kind, amount, currency, status, channel, \
         provider_response, created_at, processed_at, settled_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON \
         CONFLICT (provider_reference) DO NOTHING RETURNING {TX_COLUMNS}"
    );
    let inserted = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(tx.order_id)
        .bind(&tx.provider_reference)
        .bind(tx.kind)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.status)
        .bind(&tx.channel)
        .bind(&tx.provider_response)
        .bind(now)
        .bind(now)
        .bind(tx.settled_at)
        .fetch_optional(&mut *conn)
        .await?;
    match inserted {
        Some(record) => {
            trace!("🗃️ Transaction [{}] saved as {}", record.provider_reference, record.status);
            Ok(InsertTransactionResult::Inserted(record))
        },
        None => {
            let existing = fetch_by_reference(&tx.provider_reference, conn)
                .await?
                .ok_or_else(|| SqliteDatabaseError::TransactionNotFound(tx.provider_reference.clone()))?;
            trace!("🗃️ Transaction [{}] already exists with status {}", existing.provider_reference, existing.status);
            Ok(InsertTransactionResult::AlreadyExists(existing))
        },
    }
}

/// Inserts the transaction, or, if the provider reference is already known, overwrites its status, settlement time
/// and raw provider payload. Used when a payment is confirmed, since an earlier delivery may have left a pending or
/// failed record behind for the same reference.
pub async fn upsert(
    tx: &NewPaymentTransaction,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO payment_transactions (order_id, provider_reference, kind, amount, currency, status, channel, \
         provider_response, created_at, processed_at, settled_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON \
         CONFLICT (provider_reference) DO UPDATE SET status = excluded.status, amount = excluded.amount, channel = \
         excluded.channel, provider_response = excluded.provider_response, processed_at = excluded.processed_at, \
         settled_at = excluded.settled_at RETURNING {TX_COLUMNS}"
    );
    let record = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(tx.order_id)
        .bind(&tx.provider_reference)
        .bind(tx.kind)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.status)
        .bind(&tx.channel)
        .bind(&tx.provider_response)
        .bind(now)
        .bind(now)
        .bind(tx.settled_at)
        .fetch_one(conn)
        .await?;
    trace!("🗃️ Transaction [{}] upserted as {}", record.provider_reference, record.status);
    Ok(record)
}

pub async fn fetch_by_reference(
    provider_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, SqliteDatabaseError> {
    let sql = format!("SELECT {TX_COLUMNS} FROM payment_transactions WHERE provider_reference = ?");
    let record = sqlx::query_as::<_, PaymentTransaction>(&sql).bind(provider_reference).fetch_optional(conn).await?;
    Ok(record)
}

pub async fn fetch_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, SqliteDatabaseError> {
    let sql = format!("SELECT {TX_COLUMNS} FROM payment_transactions WHERE order_id = ? ORDER BY id ASC");
    let records = sqlx::query_as::<_, PaymentTransaction>(&sql).bind(order_id).fetch_all(conn).await?;
    Ok(records)
}

/// The sum of all settled refunds against the order.
pub async fn refunded_total(order_id: i64, conn: &mut SqliteConnection) -> Result<Money, SqliteDatabaseError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_transactions WHERE order_id = ? AND kind = ? AND status = ?",
    )
    .bind(order_id)
    .bind(TransactionKind::Refund)
    .bind(TransactionStatus::Refunded)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total))
}
