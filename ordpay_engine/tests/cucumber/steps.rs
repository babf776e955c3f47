use std::{str::FromStr, time::Duration};

use cucumber::{then, when};
use ordpay_engine::{
    db_types::{CustomerIdentity, IncidentKind, Money, OrderState, TransactionStatus},
    engine_api::{order_objects::CreateOrderRequest, reconciliation_objects::WebhookAck},
    pricing::{CartLine, Fulfillment},
    test_utils::{
        fixtures::geocode,
        scripted_provider::{charge_payload, refund_payload},
    },
    PaymentGatewayDatabase,
};

use crate::cucumber::OrderingWorld;

fn customer(name: &str) -> CustomerIdentity {
    match name.strip_prefix("guest:") {
        Some(session) => CustomerIdentity::Guest(session.to_string()),
        None => CustomerIdentity::Registered(name.to_string()),
    }
}

async fn place_order(world: &mut OrderingWorld, key: String, request: CreateOrderRequest) {
    match world.system().orders.create_order(request, &key).await {
        Ok(created) => {
            world.last_replay = created.is_replay;
            world.last_error = None;
            world.orders.insert(key.clone(), created.order);
        },
        Err(e) => {
            world.last_replay = false;
            world.last_error = Some(e);
        },
    }
    world.last_key = Some(key);
}

fn cart(world: &OrderingWorld, quantity: i64, product: &str) -> Vec<CartLine> {
    vec![CartLine::new(world.system().product(product).id, quantity)]
}

#[when(expr = "customer '{word}' orders {int} {word} for pickup with key {word}")]
async fn order_for_pickup(world: &mut OrderingWorld, name: String, quantity: i64, product: String, key: String) {
    let request = CreateOrderRequest::new(customer(&name), cart(world, quantity, &product), Fulfillment::pickup());
    place_order(world, key, request).await;
}

#[when(expr = "customer '{word}' orders {int} {word} for delivery to an address {int}m away with key {word}")]
async fn order_for_delivery(
    world: &mut OrderingWorld,
    name: String,
    quantity: i64,
    product: String,
    distance: i64,
    key: String,
) {
    let zone = world.system().catalog.zone.id;
    let address = geocode(&world.system().db, zone, "Customer address", distance).await;
    let fulfillment = Fulfillment::delivery(zone, address.id);
    let request = CreateOrderRequest::new(customer(&name), cart(world, quantity, &product), fulfillment);
    place_order(world, key, request).await;
}

#[when(expr = "customer '{word}' orders {int} {word} with code {word} and key {word}")]
async fn order_with_code(
    world: &mut OrderingWorld,
    name: String,
    quantity: i64,
    product: String,
    code: String,
    key: String,
) {
    let request = CreateOrderRequest::new(customer(&name), cart(world, quantity, &product), Fulfillment::pickup())
        .with_promotion_code(code);
    place_order(world, key, request).await;
}

#[when(expr = "the payment provider reports a successful charge [{int}] for order {word}")]
async fn full_charge(world: &mut OrderingWorld, provider_id: i64, key: String) {
    let order = world.order(&key);
    let payload = charge_payload("charge.success", provider_id, &order.payment_reference, order.total_amount, "NGN");
    deliver(world, payload, true).await;
}

#[when(expr = "the payment provider reports a successful charge [{int}] of {int} kobo for order {word}")]
async fn partial_charge(world: &mut OrderingWorld, provider_id: i64, amount: i64, key: String) {
    let order = world.order(&key);
    let payload =
        charge_payload("charge.success", provider_id, &order.payment_reference, Money::from(amount), "NGN");
    deliver(world, payload, true).await;
}

#[when(expr = "the payment provider reports a failed charge [{int}] for order {word}")]
async fn failed_charge(world: &mut OrderingWorld, provider_id: i64, key: String) {
    let order = world.order(&key);
    let payload = charge_payload("charge.failed", provider_id, &order.payment_reference, order.total_amount, "NGN");
    deliver(world, payload, true).await;
}

#[when(expr = "the payment provider reports refund [{int}] of {int} kobo for order {word}")]
async fn refund(world: &mut OrderingWorld, refund_id: i64, amount: i64, key: String) {
    let order = world.order(&key);
    let payload = refund_payload(refund_id, &order.payment_reference, Money::from(amount));
    deliver(world, payload, true).await;
}

#[when("the same webhook is delivered again")]
async fn redeliver(world: &mut OrderingWorld) {
    let payload = world.last_payload.clone().expect("No webhook has been delivered");
    deliver(world, payload, true).await;
}

#[when(expr = "an unsigned charge for order {word} arrives")]
async fn unsigned_charge(world: &mut OrderingWorld, key: String) {
    let order = world.order(&key);
    let payload = charge_payload("charge.success", 1, &order.payment_reference, order.total_amount, "NGN");
    deliver(world, payload, false).await;
}

async fn deliver(world: &mut OrderingWorld, payload: String, signed: bool) {
    let signature = signed.then(|| world.system().provider.sign(&payload));
    let ack = world
        .system()
        .payments
        .handle_webhook(payload.as_bytes(), signature.as_deref())
        .await
        .expect("Error handling webhook");
    world.last_ack = Some(ack);
    world.last_payload = Some(payload);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut OrderingWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then("the order is created")]
async fn order_created(world: &mut OrderingWorld) {
    assert!(world.last_error.is_none(), "Order was rejected: {:?}", world.last_error);
    assert!(!world.last_replay, "Order was replayed");
}

#[then("the original order is returned")]
async fn order_replayed(world: &mut OrderingWorld) {
    assert!(world.last_error.is_none(), "Order was rejected: {:?}", world.last_error);
    assert!(world.last_replay, "Expected a replay");
}

#[then(expr = "orders {word} and {word} are the same order")]
async fn same_order(world: &mut OrderingWorld, a: String, b: String) {
    assert_eq!(world.order(&a).id, world.order(&b).id);
}

#[then(expr = "the request is rejected with {word}")]
async fn order_rejected(world: &mut OrderingWorld, code: String) {
    let err = world.last_error.as_ref().expect("The request succeeded");
    assert_eq!(err.code(), code, "Unexpected error: {err}");
}

#[then(expr = "the order subtotal is {int}, tax is {int}, delivery fee is {int} and discount is {int} kobo")]
async fn order_breakdown(world: &mut OrderingWorld, subtotal: i64, tax: i64, delivery: i64, discount: i64) {
    let order = world.last_order();
    assert_eq!(order.subtotal, Money::from(subtotal), "Subtotal is incorrect");
    assert_eq!(order.tax_amount, Money::from(tax), "Tax is incorrect");
    assert_eq!(order.delivery_fee, Money::from(delivery), "Delivery fee is incorrect");
    assert_eq!(order.discount_amount, Money::from(discount), "Discount is incorrect");
}

#[then(expr = "the order total is {int} kobo")]
async fn order_total(world: &mut OrderingWorld, total: i64) {
    assert_eq!(world.last_order().total_amount, Money::from(total), "Total is incorrect");
}

#[then(expr = "the webhook is acknowledged as {word}")]
async fn webhook_ack(world: &mut OrderingWorld, expected: String) {
    let ack = world.last_ack.as_ref().expect("No webhook has been delivered");
    let actual = match ack {
        WebhookAck::Ignored => "ignored",
        WebhookAck::Duplicate => "duplicate",
        WebhookAck::Processed(outcome) => outcome.as_str(),
    };
    assert_eq!(actual, expected, "Unexpected acknowledgement {ack:?}");
}

#[then(expr = "order {word} is {word}")]
async fn order_state(world: &mut OrderingWorld, key: String, state: String) {
    let id = world.order(&key).id;
    let order = world.system().db.fetch_order(id).await.expect("Error fetching order").expect("Order vanished");
    let expected = match state.as_str() {
        "awaiting_payment" => OrderState::AWAITING_PAYMENT,
        "paid" => OrderState::PAID,
        "partially_refunded" => OrderState::PARTIALLY_REFUNDED,
        "refunded" => OrderState::REFUNDED,
        "failed" => OrderState::FAILED,
        _ => panic!("Unknown order state {state}"),
    };
    assert_eq!(order.state(), expected);
}

#[then(expr = "order {word} has {int} {word} transaction(s)")]
async fn transaction_count(world: &mut OrderingWorld, key: String, count: usize, status: String) {
    let id = world.order(&key).id;
    let status = TransactionStatus::from_str(&status).expect("Unknown transaction status");
    let txs = world.system().db.fetch_transactions_for_order(id).await.expect("Error fetching transactions");
    assert_eq!(txs.iter().filter(|t| t.status == status).count(), count);
}

#[then(expr = "{int} {word} incident(s) is/are recorded")]
async fn incident_count(world: &mut OrderingWorld, count: usize, kind: String) {
    let kind = IncidentKind::from_str(&kind).expect("Unknown incident kind");
    let incidents = world.system().db.fetch_incidents(Some(kind)).await.expect("Error fetching incidents");
    assert_eq!(incidents.len(), count);
}
