//! Data types that are persisted by the storage backends, along with their "new record" counterparts.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use ordpay_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

/// Implements `as_str`, `Display` and `FromStr` for the snake_case string enums stored in the database.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(ConversionError(stringify!($name), other.to_string())),
                }
            }
        }
    };
}

//--------------------------------------     OrderNumber     ---------------------------------------------------------
/// The human-readable order identifier, e.g. `ORD-240611-7K3QZD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderNumber {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   PaymentReference  ---------------------------------------------------------
/// The unique reference handed to the payment provider when the customer is sent to pay. Webhooks and verification
/// polls are matched to orders using this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentReference(pub String);

impl Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PaymentReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PaymentReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PaymentReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting payment
    Pending,
    /// Payment has been confirmed
    Confirmed,
    /// Cancelled by the customer, failed payment or expired
    Cancelled,
    /// Payment was refunded in full
    Refunded,
}

string_enum!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    PartiallyRefunded,
    Refunded,
}

string_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    PartiallyRefunded => "partially_refunded",
    Refunded => "refunded",
});

impl PaymentStatus {
    /// No further payment transition is possible from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

/// The (order status, payment status) pair that every order transition is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl OrderState {
    pub const fn new(status: OrderStatus, payment_status: PaymentStatus) -> Self {
        Self { status, payment_status }
    }

    pub const AWAITING_PAYMENT: OrderState = OrderState::new(OrderStatus::Pending, PaymentStatus::Pending);
    pub const PAID: OrderState = OrderState::new(OrderStatus::Confirmed, PaymentStatus::Paid);
    pub const PARTIALLY_REFUNDED: OrderState =
        OrderState::new(OrderStatus::Confirmed, PaymentStatus::PartiallyRefunded);
    pub const REFUNDED: OrderState = OrderState::new(OrderStatus::Refunded, PaymentStatus::Refunded);
    pub const FAILED: OrderState = OrderState::new(OrderStatus::Cancelled, PaymentStatus::Failed);

    /// Whether the payment state machine permits moving from `self` to `to`.
    ///
    /// `pending -> paid | failed`, `paid -> partially_refunded | refunded`, `partially_refunded -> refunded` (and
    /// repeated partial refunds).
    pub fn can_transition_to(&self, to: &OrderState) -> bool {
        use PaymentStatus::*;
        matches!(
            (self.payment_status, to.payment_status),
            (Pending, Paid) |
                (Pending, Failed) |
                (Paid, PartiallyRefunded) |
                (Paid, Refunded) |
                (PartiallyRefunded, PartiallyRefunded) |
                (PartiallyRefunded, Refunded)
        )
    }
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.status, self.payment_status)
    }
}

//--------------------------------------   FulfillmentType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentType {
    Delivery,
    Pickup,
    DineIn,
}

string_enum!(FulfillmentType { Delivery => "delivery", Pickup => "pickup", DineIn => "dine_in" });

//--------------------------------------   CustomerIdentity  ---------------------------------------------------------
/// Who placed an order. Registered customers carry their account id, guests the id of their checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum CustomerIdentity {
    Registered(String),
    Guest(String),
}

impl CustomerIdentity {
    pub fn id(&self) -> &str {
        match self {
            Self::Registered(id) | Self::Guest(id) => id.as_str(),
        }
    }

    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Self::Registered(id) => Some(id),
            Self::Guest(_) => None,
        }
    }

    pub fn guest_session_id(&self) -> Option<&str> {
        match self {
            Self::Guest(id) => Some(id),
            Self::Registered(_) => None,
        }
    }

    /// A stable key used for per-customer promotion caps, e.g. `customer:42` or `guest:abc`.
    pub fn usage_key(&self) -> String {
        match self {
            Self::Registered(id) => format!("customer:{id}"),
            Self::Guest(id) => format!("guest:{id}"),
        }
    }

    pub fn identifier_type(&self) -> IdentifierType {
        match self {
            Self::Registered(_) => IdentifierType::Customer,
            Self::Guest(_) => IdentifierType::GuestSession,
        }
    }
}

impl Display for CustomerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.usage_key())
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub payment_reference: PaymentReference,
    pub customer_id: Option<String>,
    pub guest_session_id: Option<String>,
    pub customer_contact: Option<String>,
    pub fulfillment_type: FulfillmentType,
    pub delivery_zone_id: Option<i64>,
    pub delivery_distance_m: Option<i64>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub delivery_fee: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub promotion_id: Option<i64>,
    pub promotion_discount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn state(&self) -> OrderState {
        OrderState::new(self.status, self.payment_status)
    }

    pub fn customer(&self) -> Option<CustomerIdentity> {
        match (&self.customer_id, &self.guest_session_id) {
            (Some(id), _) => Some(CustomerIdentity::Registered(id.clone())),
            (None, Some(id)) => Some(CustomerIdentity::Guest(id.clone())),
            (None, None) => None,
        }
    }

    pub fn is_awaiting_payment(&self) -> bool {
        self.state() == OrderState::AWAITING_PAYMENT
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub payment_reference: PaymentReference,
    pub customer: CustomerIdentity,
    pub customer_contact: Option<String>,
    pub fulfillment_type: FulfillmentType,
    pub delivery_zone_id: Option<i64>,
    pub delivery_distance_m: Option<i64>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub delivery_fee: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub promotion_id: Option<i64>,
    pub promotion_discount: Money,
}

//--------------------------------------      OrderItem      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub paid_quantity: i64,
    pub free_quantity: i64,
    pub unit_price: Money,
    pub vat_rate_bps: i64,
    pub vat_amount: Money,
    pub discount_amount: Money,
    pub total_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub paid_quantity: i64,
    pub free_quantity: i64,
    pub unit_price: Money,
    pub vat_rate_bps: i64,
    pub vat_amount: Money,
    pub discount_amount: Money,
    pub total_price: Money,
}

//--------------------------------------       Catalog       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Money,
    pub vat_rate_bps: i64,
    pub is_active: bool,
    /// `None` when stock is not tracked for the product
    pub stock_quantity: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Money,
    pub vat_rate_bps: i64,
    pub is_active: bool,
    pub stock_quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: i64,
    pub name: String,
    pub base_fee: Money,
    pub per_km_fee: Money,
    pub free_delivery_threshold: Option<Money>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewDeliveryZone {
    pub name: String,
    pub base_fee: Money,
    pub per_km_fee: Money,
    pub free_delivery_threshold: Option<Money>,
}

/// A delivery address resolved by the geocoding service: the road distance from the kitchen serving `zone_id`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub id: i64,
    pub zone_id: i64,
    pub label: String,
    pub distance_m: i64,
    pub geocoded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGeocodedAddress {
    pub zone_id: i64,
    pub label: String,
    pub distance_m: i64,
}

//--------------------------------------      Promotion      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    /// `value` is a rate in basis points
    Percentage,
    /// `value` is an amount in minor units
    FixedAmount,
    BuyOneGetOne,
    FreeDelivery,
}

string_enum!(PromotionKind {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
    BuyOneGetOne => "buy_one_get_one",
    FreeDelivery => "free_delivery",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Promotion {
    pub id: i64,
    pub code: Option<String>,
    pub name: String,
    pub kind: PromotionKind,
    pub value: i64,
    pub max_discount: Option<Money>,
    pub min_order_amount: Option<Money>,
    pub buy_quantity: Option<i64>,
    pub get_quantity: Option<i64>,
    /// Empty means every product qualifies
    pub applicable_product_ids: Json<Vec<i64>>,
    pub applicable_categories: Json<Vec<String>>,
    /// Automatic promotions apply without a code
    pub is_automatic: bool,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub per_customer_limit: Option<i64>,
}

impl Promotion {
    pub fn applies_to(&self, product: &Product) -> bool {
        let by_id = self.applicable_product_ids.is_empty() || self.applicable_product_ids.contains(&product.id);
        let by_category = self.applicable_categories.is_empty() ||
            product.category.as_ref().map(|c| self.applicable_categories.contains(c)).unwrap_or(false);
        by_id && by_category
    }
}

#[derive(Debug, Clone)]
pub struct NewPromotion {
    pub code: Option<String>,
    pub name: String,
    pub kind: PromotionKind,
    pub value: i64,
    pub max_discount: Option<Money>,
    pub min_order_amount: Option<Money>,
    pub buy_quantity: Option<i64>,
    pub get_quantity: Option<i64>,
    pub applicable_product_ids: Vec<i64>,
    pub applicable_categories: Vec<String>,
    pub is_automatic: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub per_customer_limit: Option<i64>,
}

impl NewPromotion {
    pub fn new<S: Into<String>>(name: S, kind: PromotionKind, value: i64) -> Self {
        Self {
            code: None,
            name: name.into(),
            kind,
            value,
            max_discount: None,
            min_order_amount: None,
            buy_quantity: None,
            get_quantity: None,
            applicable_product_ids: vec![],
            applicable_categories: vec![],
            is_automatic: false,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            per_customer_limit: None,
        }
    }

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn automatic(mut self) -> Self {
        self.is_automatic = true;
        self
    }

    pub fn with_bogo(mut self, buy: i64, get: i64) -> Self {
        self.buy_quantity = Some(buy);
        self.get_quantity = Some(get);
        self
    }

    pub fn with_usage_limit(mut self, limit: i64) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_per_customer_limit(mut self, limit: i64) -> Self {
        self.per_customer_limit = Some(limit);
        self
    }

    pub fn with_min_order_amount(mut self, amount: Money) -> Self {
        self.min_order_amount = Some(amount);
        self
    }

    pub fn with_max_discount(mut self, amount: Money) -> Self {
        self.max_discount = Some(amount);
        self
    }

    pub fn with_products(mut self, products: Vec<i64>) -> Self {
        self.applicable_product_ids = products;
        self
    }

    pub fn with_validity(mut self, starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PromotionUsage {
    pub id: i64,
    pub promotion_id: i64,
    pub order_id: i64,
    pub customer_ref: String,
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  PaymentTransaction ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Charge,
    Refund,
}

string_enum!(TransactionKind { Charge => "charge", Refund => "refund" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    /// Recorded, but held for manual review (amount mismatch, promotion cap overrun, payment on a closed order)
    Flagged,
    Refunded,
}

string_enum!(TransactionStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Flagged => "flagged",
    Refunded => "refunded",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub order_id: i64,
    pub provider_reference: String,
    pub kind: TransactionKind,
    pub amount: Money,
    pub currency: String,
    pub status: TransactionStatus,
    pub channel: Option<String>,
    /// The raw provider payload. Kept for audit only.
    pub provider_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub order_id: i64,
    pub provider_reference: String,
    pub kind: TransactionKind,
    pub amount: Money,
    pub currency: String,
    pub status: TransactionStatus,
    pub channel: Option<String>,
    pub provider_response: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

//--------------------------------------     WebhookEvent    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub provider: String,
    pub event_type: String,
    pub payload: String,
    pub signature: Option<String>,
    pub processed: bool,
    pub result: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub provider: String,
    pub event_type: String,
    pub payload: String,
    pub signature: Option<String>,
}

//--------------------------------------       Incident      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    AmountMismatch,
    OrderNotFound,
    InvalidSignature,
    MalformedPayload,
    PriceIntegrityViolation,
    PromotionCapExceeded,
    PaymentOnClosedOrder,
    RefundMismatch,
}

string_enum!(IncidentKind {
    AmountMismatch => "amount_mismatch",
    OrderNotFound => "order_not_found",
    InvalidSignature => "invalid_signature",
    MalformedPayload => "malformed_payload",
    PriceIntegrityViolation => "price_integrity_violation",
    PromotionCapExceeded => "promotion_cap_exceeded",
    PaymentOnClosedOrder => "payment_on_closed_order",
    RefundMismatch => "refund_mismatch",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub kind: IncidentKind,
    pub order_id: Option<i64>,
    pub reference: Option<String>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncident {
    pub kind: IncidentKind,
    pub order_id: Option<i64>,
    pub reference: Option<String>,
    pub details: String,
}

impl NewIncident {
    pub fn new<S: Into<String>>(kind: IncidentKind, details: S) -> Self {
        Self { kind, order_id: None, reference: None, details: details.into() }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

//--------------------------------------    IdempotencyKey   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub request_hash: String,
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Rate limits    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Ip,
    Customer,
    GuestSession,
}

string_enum!(IdentifierType { Ip => "ip", Customer => "customer", GuestSession => "guest_session" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOperation {
    CreateOrder,
    VerifyPayment,
    PaymentWebhook,
}

string_enum!(RateLimitOperation {
    CreateOrder => "create_order",
    VerifyPayment => "verify_payment",
    PaymentWebhook => "payment_webhook",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    Trusted,
    Normal,
    Suspicious,
    Blocked,
}

string_enum!(ReputationTier {
    Trusted => "trusted",
    Normal => "normal",
    Suspicious => "suspicious",
    Blocked => "blocked",
});

/// Identifies a rate-limit counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub operation: RateLimitOperation,
}

impl RateLimitKey {
    pub fn new<S: Into<String>>(identifier: S, identifier_type: IdentifierType, operation: RateLimitOperation) -> Self {
        Self { identifier: identifier.into(), identifier_type, operation }
    }

    pub fn for_customer(customer: &CustomerIdentity, operation: RateLimitOperation) -> Self {
        Self::new(customer.id(), customer.identifier_type(), operation)
    }
}

impl Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.identifier_type, self.identifier, self.operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RateLimitWindow {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub operation: RateLimitOperation,
    /// Unix timestamp (seconds) of the start of the window
    pub window_start: i64,
    pub window_end: i64,
    pub request_count: i64,
    pub violation_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RateLimitReputation {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub violation_count: i64,
    pub flagged_tier: Option<ReputationTier>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_enums_round_trip_through_their_database_names() {
        assert_eq!(PaymentStatus::PartiallyRefunded.to_string(), "partially_refunded");
        assert_eq!("dine_in".parse::<FulfillmentType>().unwrap(), FulfillmentType::DineIn);
        assert!("settled".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn payment_state_machine() {
        assert!(OrderState::AWAITING_PAYMENT.can_transition_to(&OrderState::PAID));
        assert!(OrderState::AWAITING_PAYMENT.can_transition_to(&OrderState::FAILED));
        assert!(OrderState::PAID.can_transition_to(&OrderState::PARTIALLY_REFUNDED));
        assert!(OrderState::PARTIALLY_REFUNDED.can_transition_to(&OrderState::REFUNDED));
        assert!(!OrderState::PAID.can_transition_to(&OrderState::AWAITING_PAYMENT));
        assert!(!OrderState::FAILED.can_transition_to(&OrderState::PAID));
        assert!(!OrderState::REFUNDED.can_transition_to(&OrderState::PAID));
        assert!(!OrderState::AWAITING_PAYMENT.can_transition_to(&OrderState::REFUNDED));
    }

    #[test]
    fn customer_identity_keys() {
        let guest = CustomerIdentity::Guest("s-1".into());
        assert_eq!(guest.usage_key(), "guest:s-1");
        assert_eq!(guest.identifier_type(), IdentifierType::GuestSession);
        assert_eq!(guest.customer_id(), None);
        let key = RateLimitKey::for_customer(&CustomerIdentity::Registered("42".into()), RateLimitOperation::CreateOrder);
        assert_eq!(key.to_string(), "customer:42/create_order");
    }
}
