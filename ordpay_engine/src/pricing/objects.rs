use serde::{Deserialize, Serialize};

use crate::db_types::{CustomerIdentity, FulfillmentType, Money, NewOrderItem, Promotion, PromotionKind};

/// A line as submitted by the client. Only the product and quantity are trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
    /// The price the client displayed. Used only to detect stale carts or tampering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price_snapshot: Option<Money>,
}

impl CartLine {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self { product_id, quantity, unit_price_snapshot: None }
    }

    pub fn with_snapshot(mut self, price: Money) -> Self {
        self.unit_price_snapshot = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub kind: FulfillmentType,
    #[serde(default)]
    pub zone_id: Option<i64>,
    /// A delivery address that the geocoding service has already resolved. The distance is looked up from it.
    #[serde(default)]
    pub address_id: Option<i64>,
}

impl Fulfillment {
    pub fn pickup() -> Self {
        Self { kind: FulfillmentType::Pickup, zone_id: None, address_id: None }
    }

    pub fn dine_in() -> Self {
        Self { kind: FulfillmentType::DineIn, zone_id: None, address_id: None }
    }

    pub fn delivery(zone_id: i64, address_id: i64) -> Self {
        Self { kind: FulfillmentType::Delivery, zone_id: Some(zone_id), address_id: Some(address_id) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub promotion_code: Option<String>,
    pub fulfillment: Fulfillment,
    #[serde(default)]
    pub customer: Option<CustomerIdentity>,
}

/// A promotion along with how many times the current customer has already used it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCandidate {
    pub promotion: Promotion,
    pub customer_uses: i64,
}

impl PromotionCandidate {
    pub fn new(promotion: Promotion, customer_uses: i64) -> Self {
        Self { promotion, customer_uses }
    }
}

/// The promotions the pure pricing engine gets to choose from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PromotionSelection {
    #[default]
    None,
    /// The customer entered this code. It applies or pricing fails.
    Code(String, Option<PromotionCandidate>),
    /// The best eligible automatic promotion (if any) applies.
    Automatic(Vec<PromotionCandidate>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub promotion_id: i64,
    pub code: Option<String>,
    pub kind: PromotionKind,
    /// The full benefit granted: free-item discounts, the order-level discount and any waived delivery fee
    pub discount: Money,
    pub per_customer_limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub lines: Vec<NewOrderItem>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub delivery_fee: Money,
    /// The geocoded distance the delivery fee was computed from
    pub delivery_distance_m: Option<i64>,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub promotion: Option<AppliedPromotion>,
}

impl PriceBreakdown {
    pub fn promotion_discount(&self) -> Money {
        self.promotion.as_ref().map(|p| p.discount).unwrap_or_default()
    }

    pub fn promotion_id(&self) -> Option<i64> {
        self.promotion.as_ref().map(|p| p.promotion_id)
    }
}
