use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, Order},
    engine_api::rate_limiter::RateLimit,
    helpers::RetryPolicy,
};

/// What happened to a webhook delivery. Every variant is acknowledged to the provider with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// Unauthenticated or unreadable. Nothing about the reason is revealed to the caller.
    Ignored,
    /// The event was already processed
    Duplicate,
    Processed(ReconciliationOutcome),
}

/// The result of applying a provider report (webhook or verification) to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Confirmed(Order),
    /// The order was already paid by this same charge
    AlreadyPaid(Order),
    AmountMismatch { order: Order, expected: Money, received: Money },
    OrderNotFound,
    /// A failed charge was recorded; the order is still awaiting payment.
    PaymentFailed(Order),
    /// Money arrived for an order that is closed or already paid by another charge
    PaymentOnClosedOrder(Order),
    PromotionCapExceeded(Order),
    IntegrityViolation(Order),
    Refunded(Order),
    RefundRejected(Order),
    /// A refund that was already applied
    RefundDuplicate,
    Unsupported,
}

impl ReconciliationOutcome {
    /// Written to the webhook ledger as the processing result.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "confirmed",
            Self::AlreadyPaid(_) => "already_paid",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::OrderNotFound => "order_not_found",
            Self::PaymentFailed(_) => "payment_failed",
            Self::PaymentOnClosedOrder(_) => "payment_on_closed_order",
            Self::PromotionCapExceeded(_) => "promotion_cap_exceeded",
            Self::IntegrityViolation(_) => "price_integrity_violation",
            Self::Refunded(_) => "refunded",
            Self::RefundRejected(_) => "refund_rejected",
            Self::RefundDuplicate => "refund_duplicate",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Paid,
    /// The customer has not completed the payment yet
    Pending,
    Failed,
    /// The payment needs manual review. The order was not confirmed.
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub order: Order,
}

impl VerificationResult {
    pub fn new(status: VerificationStatus, order: Order) -> Self {
        Self { status, order }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Bound on each provider call
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
    pub verify_limit: RateLimit,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            verify_limit: RateLimit::per_hour(60),
        }
    }
}
