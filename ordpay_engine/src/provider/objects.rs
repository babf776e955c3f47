use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Money, PaymentReference};

/// A charge as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeDetails {
    /// Our payment reference, echoed back by the provider
    pub reference: PaymentReference,
    /// The provider's own id for this charge attempt
    pub provider_reference: String,
    pub amount: Money,
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// The provider payload, verbatim. Kept for audit only.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDetails {
    /// The payment reference of the charge being refunded
    pub reference: PaymentReference,
    pub provider_reference: String,
    pub amount: Money,
    pub currency: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    ChargeSucceeded(ChargeDetails),
    ChargeFailed(ChargeDetails),
    RefundProcessed(RefundDetails),
    /// A well-formed event that the engine has no use for
    Unsupported,
}

/// A webhook payload that has been authenticated and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// Unique per provider event, used to deduplicate deliveries
    pub event_id: String,
    pub event_type: String,
    pub event: ProviderEvent,
}

/// What the provider says about a charge when asked directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Succeeded(ChargeDetails),
    Failed(ChargeDetails),
    /// The customer has not completed the payment yet
    Pending,
}
