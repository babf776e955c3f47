use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db::traits::{
        CatalogManagement,
        ConfirmPayment,
        ConfirmPaymentOutcome,
        GeocodingManagement,
        InsertOrderResult,
        InsertTransactionResult,
        PaymentAttempt,
        PromotionManagement,
        RateLimitManagement,
        RecordRefund,
        RefundOutcome,
        WebhookRecordResult,
    },
    db_types::{
        IdempotencyRecord,
        Incident,
        IncidentKind,
        NewIncident,
        NewOrder,
        NewOrderItem,
        NewWebhookEvent,
        Order,
        OrderItem,
        OrderNumber,
        OrderState,
        PaymentReference,
        PaymentTransaction,
        WebhookEvent,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the order and payment engine.
///
/// This behaviour includes:
/// * Atomic, idempotent order creation.
/// * The webhook ledger and incident log.
/// * Payment confirmation and refunds, expressed as compare-and-swap transitions on the order state.
///
/// Every method that mutates more than one table does so in a single storage transaction.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase:
    Clone + CatalogManagement + GeocodingManagement + PromotionManagement + RateLimitManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores the order, its items and (if given) the idempotency key in a single transaction.
    ///
    /// If the idempotency key is already present, nothing is written and the id of the order it points to is returned
    /// as [`InsertOrderResult::AlreadyExists`].
    async fn insert_order(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
        idempotency: Option<(String, String)>,
    ) -> Result<InsertOrderResult, StorageError>;

    async fn fetch_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Deletes the idempotency key if it was created before `cutoff`. Returns true if a record was removed.
    async fn remove_stale_idempotency_key(&self, key: &str, cutoff: DateTime<Utc>) -> Result<bool, StorageError>;

    /// Removes every idempotency key created before `cutoff`, returning the number removed.
    async fn purge_idempotency_keys(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    async fn order_number_exists(&self, order_number: &OrderNumber) -> Result<bool, StorageError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StorageError>;

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, StorageError>;

    async fn fetch_order_by_payment_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Order>, StorageError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StorageError>;

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<PaymentTransaction>, StorageError>;

    async fn fetch_transaction(&self, provider_reference: &str) -> Result<Option<PaymentTransaction>, StorageError>;

    /// Records a webhook delivery in the ledger if it has not been seen before.
    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookRecordResult, StorageError>;

    async fn mark_webhook_processed(&self, event_id: &str, result: &str) -> Result<(), StorageError>;

    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError>;

    async fn record_incident(&self, incident: NewIncident) -> Result<Incident, StorageError>;

    async fn fetch_incidents(&self, kind: Option<IncidentKind>) -> Result<Vec<Incident>, StorageError>;

    /// Stores a payment attempt that does not change the order state (failed charges, flagged payments) along with an
    /// optional incident, and marks the webhook event processed, all in one transaction. Idempotent on the provider
    /// reference: if the transaction was already recorded, no incident is written and `None` is returned in its place.
    async fn record_payment_attempt(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<(InsertTransactionResult, Option<Incident>), StorageError>;

    /// Confirms a payment atomically:
    /// 1. compare-and-swap the order from `pending/pending` to `confirmed/paid`,
    /// 2. upsert the successful payment transaction,
    /// 3. increment the promotion usage counter, respecting its caps, and record the usage,
    /// 4. mark the webhook event processed.
    ///
    /// If any step fails, nothing is written.
    async fn confirm_payment(&self, confirmation: ConfirmPayment) -> Result<ConfirmPaymentOutcome, StorageError>;

    /// Records a refund transaction and moves the order along the refund transitions in one transaction. The order
    /// must still be at `expected_version`, and the refunds recorded against it may never exceed its total; otherwise
    /// nothing is written and [`RefundOutcome::StateConflict`] carries the current order.
    async fn apply_refund(&self, refund: RecordRefund) -> Result<RefundOutcome, StorageError>;

    /// The single compare-and-swap primitive for order state. The update only happens if the order is currently in
    /// state `from`. Returns the updated order, or `None` if the order was not in the expected state.
    async fn transition_order(&self, order_id: i64, from: OrderState, to: OrderState)
        -> Result<Option<Order>, StorageError>;

    /// Orders still awaiting payment that were created before `cutoff`.
    async fn fetch_stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, StorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("The database is unavailable: {0}")]
    Unavailable(String),
    #[error("The database is busy: {0}")]
    Busy(String),
    #[error("A storage constraint was violated: {0}")]
    ConstraintViolation(String),
    #[error("The requested record does not exist: {0}")]
    NotFound(String),
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
}

impl StorageError {
    /// Transient errors may succeed if the operation is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Busy(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(e.to_string())
            },
            sqlx::Error::RowNotFound => StorageError::NotFound(e.to_string()),
            sqlx::Error::Database(ref db) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                let busy = db.code().and_then(|c| c.parse::<i32>().ok()).map(|c| matches!(c & 0xff, 5 | 6));
                if busy.unwrap_or(false) {
                    StorageError::Busy(db.message().to_string())
                } else if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() {
                    StorageError::ConstraintViolation(db.message().to_string())
                } else {
                    StorageError::DatabaseError(e.to_string())
                }
            },
            _ => StorageError::DatabaseError(e.to_string()),
        }
    }
}
