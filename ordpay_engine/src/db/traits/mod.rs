//! #  Storage contracts
//!
//! This module provides the interfaces that define the contracts of the engine's database *backends*.
//!
//! * [`PaymentGatewayDatabase`] defines the highest level of behavior for backends: order persistence, the webhook
//!   ledger, incidents and the atomic payment transitions.
//! * [`CatalogManagement`] gives read-only access to products and delivery zones.
//! * [`GeocodingManagement`] reads the delivery distances resolved by the geocoding service.
//! * [`PromotionManagement`] reads promotions and their usage ledger.
//! * [`RateLimitManagement`] stores the rate-limit windows and identifier reputation.
mod catalog_management;
mod data_objects;
mod geocoding_management;
mod payment_gateway_database;
mod promotion_management;
mod rate_limit_management;

pub use catalog_management::CatalogManagement;
pub use data_objects::{
    ConfirmPayment,
    ConfirmPaymentOutcome,
    InsertOrderResult,
    InsertTransactionResult,
    PaymentAttempt,
    PromotionClaim,
    RecordRefund,
    RefundOutcome,
    WebhookRecordResult,
};
pub use geocoding_management::GeocodingManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, StorageError};
pub use promotion_management::PromotionManagement;
pub use rate_limit_management::RateLimitManagement;
