use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CustomerIdentity, NewOrder, Order, OrderItem, OrderNumber, PaymentReference},
    engine_api::rate_limiter::RateLimit,
    pricing::{CartLine, Fulfillment, PriceBreakdown, PricingRequest},
};

/// A checkout submission. Everything in here is client-supplied and untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer: CustomerIdentity,
    #[serde(default)]
    pub customer_contact: Option<String>,
    pub items: Vec<CartLine>,
    pub fulfillment: Fulfillment,
    #[serde(default)]
    pub promotion_code: Option<String>,
}

impl CreateOrderRequest {
    pub fn new(customer: CustomerIdentity, items: Vec<CartLine>, fulfillment: Fulfillment) -> Self {
        Self { customer, customer_contact: None, items, fulfillment, promotion_code: None }
    }

    pub fn with_promotion_code<S: Into<String>>(mut self, code: S) -> Self {
        self.promotion_code = Some(code.into());
        self
    }

    pub fn with_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.customer_contact = Some(contact.into());
        self
    }

    pub fn pricing_request(&self) -> PricingRequest {
        PricingRequest {
            items: self.items.clone(),
            promotion_code: self.promotion_code.clone(),
            fulfillment: self.fulfillment.clone(),
            customer: Some(self.customer.clone()),
        }
    }

    pub(crate) fn to_new_order(
        &self,
        order_number: OrderNumber,
        payment_reference: PaymentReference,
        price: &PriceBreakdown,
        currency: &str,
    ) -> NewOrder {
        NewOrder {
            order_number,
            payment_reference,
            customer: self.customer.clone(),
            customer_contact: self.customer_contact.clone(),
            fulfillment_type: self.fulfillment.kind,
            delivery_zone_id: self.fulfillment.zone_id,
            delivery_distance_m: price.delivery_distance_m,
            subtotal: price.subtotal,
            tax_amount: price.tax_amount,
            delivery_fee: price.delivery_fee,
            discount_amount: price.discount_amount,
            total_amount: price.total_amount,
            currency: currency.to_string(),
            promotion_id: price.promotion_id(),
            promotion_discount: price.promotion_discount(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// True when the idempotency key matched an earlier request and the original order is being returned
    pub is_replay: bool,
}

#[derive(Debug, Clone)]
pub struct OrderFlowConfig {
    pub currency: String,
    /// How long an idempotency key stays bound to its order
    pub idempotency_window: Duration,
    pub create_order_limit: RateLimit,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            idempotency_window: Duration::minutes(10),
            create_order_limit: RateLimit::per_hour(30),
        }
    }
}
