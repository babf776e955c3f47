use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Incident, Money, Order, PaymentTransaction};

/// Emitted once, after the transaction that confirmed the payment has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub transaction: PaymentTransaction,
}

impl OrderPaidEvent {
    pub fn new(order: Order, transaction: PaymentTransaction) -> Self {
        Self { order, transaction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Expired,
    Cancelled,
}

/// Emitted when an order awaiting payment is closed without being paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub reason: FailureReason,
}

impl OrderFailedEvent {
    pub fn new(order: Order, reason: FailureReason) -> Self {
        Self { order, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentEvent {
    pub incident: Incident,
}

impl IncidentEvent {
    pub fn new(incident: Incident) -> Self {
        Self { incident }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderPaid,
    OrderFailed,
}

/// The trigger handed to the notification collaborator. Delivery is its concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub order_id: i64,
    pub order_number: String,
    pub event_type: NotificationType,
    pub amount: Money,
    pub currency: String,
    pub customer_contact: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&OrderPaidEvent> for NotificationEvent {
    fn from(event: &OrderPaidEvent) -> Self {
        notification(&event.order, NotificationType::OrderPaid)
    }
}

impl From<&OrderFailedEvent> for NotificationEvent {
    fn from(event: &OrderFailedEvent) -> Self {
        notification(&event.order, NotificationType::OrderFailed)
    }
}

fn notification(order: &Order, event_type: NotificationType) -> NotificationEvent {
    NotificationEvent {
        order_id: order.id,
        order_number: order.order_number.to_string(),
        event_type,
        amount: order.total_amount,
        currency: order.currency.clone(),
        customer_contact: order.customer_contact.clone(),
        timestamp: order.updated_at,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderFailed(OrderFailedEvent),
    Incident(IncidentEvent),
    Notification(NotificationEvent),
}
