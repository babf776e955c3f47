use crate::db_types::{Money, NewIncident, NewPaymentTransaction, Order, OrderState, PaymentTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOrderResult {
    Inserted(i64),
    /// The idempotency key was already taken. Carries the id of the order that owns it.
    AlreadyExists(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertTransactionResult {
    Inserted(PaymentTransaction),
    AlreadyExists(PaymentTransaction),
}

impl InsertTransactionResult {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            Self::Inserted(tx) | Self::AlreadyExists(tx) => tx,
        }
    }
}

/// The result of writing a webhook delivery to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRecordResult {
    /// First time this event id has been seen
    New,
    /// The event was recorded before, but its processing never completed (e.g. a crash or a transient error).
    Unprocessed,
    AlreadyProcessed,
}

/// A payment attempt that is recorded without touching the order state.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub transaction: NewPaymentTransaction,
    pub incident: Option<NewIncident>,
    /// The webhook event (if any) to mark as processed, with its processing result.
    pub webhook: Option<(String, String)>,
}

/// Reserve a use of a promotion for an order while confirming its payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionClaim {
    pub promotion_id: i64,
    pub customer_ref: String,
    pub discount_amount: Money,
    pub per_customer_limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub order_id: i64,
    pub transaction: NewPaymentTransaction,
    pub promotion: Option<PromotionClaim>,
    /// The webhook event (if any) to mark as processed, with its processing result.
    pub webhook: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPaymentOutcome {
    Confirmed { order: Order, transaction: PaymentTransaction },
    /// The order was not `pending/pending` when the swap was attempted. Nothing was written. Carries the state the
    /// order was found in.
    StateConflict(Option<Order>),
    /// The promotion's global or per-customer cap would be exceeded. Nothing was written.
    PromotionCapExceeded(i64),
}

#[derive(Debug, Clone)]
pub struct RecordRefund {
    pub order_id: i64,
    pub from: OrderState,
    pub to: OrderState,
    /// The order version the refund was validated against. Any concurrent change to the order voids the refund.
    pub expected_version: i64,
    pub transaction: NewPaymentTransaction,
    pub webhook: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Applied(Order),
    /// The refund reference was already recorded; nothing changed.
    AlreadyRecorded,
    StateConflict(Option<Order>),
}
