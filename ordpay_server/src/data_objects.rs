use chrono::{DateTime, Utc};
use ordpay_engine::{
    db_types::{FulfillmentType, Money, Order, OrderItem, OrderStatus, PaymentStatus},
    order_objects::OrderCreated,
    reconciliation_objects::{VerificationResult, VerificationStatus},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// The customer-facing view of an order. Internal bookkeeping (row ids, CAS versions, session ids) is left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_number: String,
    pub payment_reference: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_type: FulfillmentType,
    pub currency: String,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub delivery_fee: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub free_quantity: i64,
    pub unit_price: Money,
    pub vat_amount: Money,
    pub discount_amount: Money,
    pub total_price: Money,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            free_quantity: item.free_quantity,
            unit_price: item.unit_price,
            vat_amount: item.vat_amount,
            discount_amount: item.discount_amount,
            total_price: item.total_price,
        }
    }
}

impl OrderView {
    pub fn new(order: &Order, items: &[OrderItem]) -> Self {
        Self {
            order_number: order.order_number.to_string(),
            payment_reference: order.payment_reference.to_string(),
            status: order.status,
            payment_status: order.payment_status,
            fulfillment_type: order.fulfillment_type,
            currency: order.currency.clone(),
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            delivery_fee: order.delivery_fee,
            discount_amount: order.discount_amount,
            total_amount: order.total_amount,
            items: items.iter().map(OrderItemView::from).collect(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderView,
    /// True when this is the order created by an earlier request with the same idempotency key
    pub replayed: bool,
}

impl From<OrderCreated> for OrderResponse {
    fn from(created: OrderCreated) -> Self {
        Self { order: OrderView::new(&created.order, &created.items), replayed: created.is_replay }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub status: VerificationStatus,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
    pub currency: String,
}

impl From<VerificationResult> for VerificationResponse {
    fn from(result: VerificationResult) -> Self {
        Self {
            status: result.status,
            order_number: result.order.order_number.to_string(),
            payment_status: result.order.payment_status,
            total_amount: result.order.total_amount,
            currency: result.order.currency,
        }
    }
}
