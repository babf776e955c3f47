//! Order Pricing & Payment Reconciliation Engine
//!
//! This library holds the core logic behind a restaurant's online checkout: it prices carts, stores orders, and
//! reconciles what the payment provider says it collected against what the order should have cost. It is
//! transport-agnostic; the HTTP surface lives in `ordpay_server`.
//!
//! The library is divided into these sections:
//! 1. Database management ([`mod@db`]). SQLite is the supported backend. The storage contracts are the traits
//!    re-exported at the crate root; the persisted data types live in [`db_types`].
//! 2. The pure pricing engine ([`pricing`]). No I/O happens in there.
//! 3. The public API ([`mod@engine_api`]): order creation, quoting, payment reconciliation and rate limiting.
//! 4. The payment provider boundary ([`provider`]), with a Paystack-compatible codec.
//!
//! The engine also emits events after state changes have been committed, e.g. [`events::OrderPaidEvent`] when a
//! payment is confirmed. Subscribe to them through [`events::EventHooks`].
mod db;

pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod pricing;
pub mod provider;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{orders::OrderQueryFilter, SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{
    CatalogManagement,
    ConfirmPayment,
    ConfirmPaymentOutcome,
    GeocodingManagement,
    InsertOrderResult,
    InsertTransactionResult,
    PaymentAttempt,
    PaymentGatewayDatabase,
    PromotionClaim,
    PromotionManagement,
    RateLimitManagement,
    RecordRefund,
    RefundOutcome,
    StorageError,
    WebhookRecordResult,
};
pub use engine_api::{
    errors::{OrderFlowError, PricingApiError, RateLimitError, ReconciliationError},
    order_flow_api::OrderFlowApi,
    order_objects,
    pricing_api::PricingApi,
    rate_limiter::{RateLimit, RateLimitDecision, RateLimiter, ReputationPolicy},
    reconciliation_api::ReconciliationApi,
    reconciliation_objects,
};
