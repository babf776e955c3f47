use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::WebhookRecordResult},
    db_types::{NewWebhookEvent, WebhookEvent},
};

/// Writes the event to the ledger if its id has not been seen before. If it has, reports whether the earlier delivery
/// finished processing.
pub async fn record_event(
    event: &NewWebhookEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WebhookRecordResult, SqliteDatabaseError> {
    let res = sqlx::query(
        "INSERT INTO webhook_events (event_id, provider, event_type, payload, signature, processed, received_at) \
         VALUES (?, ?, ?, ?, ?, FALSE, ?) ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(&event.event_id)
    .bind(&event.provider)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(&event.signature)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 1 {
        trace!("🗃️ Webhook event [{}] recorded", event.event_id);
        return Ok(WebhookRecordResult::New);
    }
    let processed: bool = sqlx::query_scalar("SELECT processed FROM webhook_events WHERE event_id = ?")
        .bind(&event.event_id)
        .fetch_one(conn)
        .await?;
    trace!("🗃️ Webhook event [{}] seen before. Processed: {processed}", event.event_id);
    if processed {
        Ok(WebhookRecordResult::AlreadyProcessed)
    } else {
        Ok(WebhookRecordResult::Unprocessed)
    }
}

pub async fn mark_processed(
    event_id: &str,
    result: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE webhook_events SET processed = TRUE, result = ?, processed_at = ? WHERE event_id = ?")
        .bind(result)
        .bind(now)
        .bind(event_id)
        .execute(conn)
        .await?;
    trace!("🗃️ Webhook event [{event_id}] marked processed: {result}");
    Ok(())
}

pub async fn fetch_event(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, SqliteDatabaseError> {
    let event = sqlx::query_as::<_, WebhookEvent>(
        "SELECT event_id, provider, event_type, payload, signature, processed, result, received_at, processed_at FROM \
         webhook_events WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?;
    Ok(event)
}
