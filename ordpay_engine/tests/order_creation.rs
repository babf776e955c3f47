use chrono::Duration;
use ordpay_engine::{
    db_types::{Money, NewDeliveryZone, NewPromotion, OrderState, PromotionKind},
    engine_api::order_objects::CreateOrderRequest,
    pricing::{CartLine, Fulfillment, PricingError, MAX_LINE_QUANTITY},
    test_utils::fixtures::{add_promotion, geocode},
    OrderFlowError,
    OrderQueryFilter,
    PaymentGatewayDatabase,
};

mod support;

use support::*;

fn lunch(system: &TestSystem) -> CreateOrderRequest {
    let c = &system.catalog;
    CreateOrderRequest::new(
        alice(),
        vec![CartLine::new(c.jollof.id, 2), CartLine::new(c.chapman.id, 1)],
        Fulfillment::pickup(),
    )
    .with_contact("alice@example.com")
}

#[tokio::test]
async fn creates_a_priced_order() {
    let system = setup().await;
    let created = system.orders.create_order(lunch(&system), "checkout-1").await.expect("Error creating order");
    assert!(!created.is_replay);
    let order = &created.order;
    assert!(order.order_number.as_str().starts_with("ORD-"));
    assert!(order.payment_reference.as_str().starts_with("PAY-"));
    assert_eq!(order.state(), OrderState::AWAITING_PAYMENT);
    assert_eq!(order.subtotal, Money::from(580_000));
    // 7.5% of 500_000 and of 80_000
    assert_eq!(order.tax_amount, Money::from(43_500));
    assert_eq!(order.delivery_fee, Money::ZERO);
    assert_eq!(order.total_amount, Money::from(623_500));
    assert_eq!(order.currency, "NGN");
    assert_eq!(order.customer_contact.as_deref(), Some("alice@example.com"));
    assert_eq!(created.items.len(), 2);
    let stored_total: Money = created.items.iter().map(|i| i.total_price).sum();
    assert_eq!(stored_total, order.subtotal);
    tear_down(system).await;
}

#[tokio::test]
async fn delivery_orders_carry_the_zone_fee() {
    let system = setup().await;
    let c = &system.catalog;
    let fulfillment = Fulfillment::delivery(c.zone.id, c.address.id);
    let request = CreateOrderRequest::new(alice(), vec![CartLine::new(c.chicken.id, 1)], fulfillment);
    let order = place_order(&system, request).await;
    // ₦500 base plus 3.5km at ₦100/km
    assert_eq!(order.delivery_fee, Money::from(85_000));
    assert_eq!(order.delivery_distance_m, Some(3_500));
    assert_eq!(order.total_amount, order.subtotal + order.tax_amount + order.delivery_fee);
    tear_down(system).await;
}

#[tokio::test]
async fn client_supplied_distances_are_ignored() {
    let system = setup().await;
    let c = &system.catalog;
    let body = serde_json::json!({
        "customer": { "type": "registered", "id": "alice" },
        "items": [{ "product_id": c.chicken.id, "quantity": 1 }],
        "fulfillment": { "kind": "delivery", "zone_id": c.zone.id, "address_id": c.address.id, "distance_m": 0 },
    });
    let request: CreateOrderRequest = serde_json::from_value(body).expect("checkout body");
    let order = place_order(&system, request).await;
    assert_eq!(order.delivery_distance_m, Some(3_500));
    assert_eq!(order.delivery_fee, Money::from(85_000));

    let body = serde_json::json!({
        "customer": { "type": "registered", "id": "alice" },
        "items": [{ "product_id": c.chicken.id, "quantity": 1 }],
        "fulfillment": { "kind": "delivery", "zone_id": c.zone.id, "distance_m": 0 },
    });
    let request: CreateOrderRequest = serde_json::from_value(body).expect("checkout body");
    let err = system.orders.create_order(request, &new_key()).await.unwrap_err();
    assert_eq!(err.code(), "DELIVERY_ADDRESS_REQUIRED");
    tear_down(system).await;
}

#[tokio::test]
async fn delivery_needs_an_address_geocoded_for_the_zone() {
    let system = setup().await;
    let c = &system.catalog;
    let cart = || vec![CartLine::new(c.chicken.id, 1)];
    let unknown = CreateOrderRequest::new(alice(), cart(), Fulfillment::delivery(c.zone.id, 9_999));
    let err = system.orders.create_order(unknown, &new_key()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Pricing(PricingError::UnknownDeliveryAddress(9_999))), "{err:?}");

    let other_zone = system
        .db
        .add_delivery_zone(NewDeliveryZone {
            name: "Ikeja".to_string(),
            base_fee: Money::from(70_000),
            per_km_fee: Money::from(10_000),
            free_delivery_threshold: None,
        })
        .await
        .expect("zone");
    let far = geocode(&system.db, other_zone.id, "Allen Avenue", 22_000).await;
    let mismatched = CreateOrderRequest::new(alice(), cart(), Fulfillment::delivery(c.zone.id, far.id));
    let err = system.orders.create_order(mismatched, &new_key()).await.unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_DELIVERY_ADDRESS");

    let orders = system.db.fetch_orders(OrderQueryFilter::default()).await.unwrap();
    assert!(orders.is_empty());
    tear_down(system).await;
}

#[tokio::test]
async fn huge_quantities_are_rejected_without_panicking() {
    let system = setup().await;
    let c = &system.catalog;
    for quantity in [i64::MAX / 100, i64::MAX, MAX_LINE_QUANTITY + 1, 0, -5] {
        let line = CartLine::new(c.jollof.id, quantity);
        let request = CreateOrderRequest::new(alice(), vec![line], Fulfillment::pickup());
        let err = system.orders.create_order(request, &new_key()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_QUANTITY", "quantity {quantity}");
    }
    let split = vec![CartLine::new(c.jollof.id, MAX_LINE_QUANTITY), CartLine::new(c.jollof.id, 1)];
    let split_key = new_key();
    let err = system.orders.create_order(CreateOrderRequest::new(alice(), split, Fulfillment::pickup()), &split_key);
    assert_eq!(err.await.unwrap_err().code(), "INVALID_QUANTITY");

    let line = CartLine::new(c.jollof.id, MAX_LINE_QUANTITY);
    let order = place_order(&system, CreateOrderRequest::new(alice(), vec![line], Fulfillment::pickup())).await;
    assert_eq!(order.subtotal, Money::from(250_000 * MAX_LINE_QUANTITY));
    tear_down(system).await;
}

#[tokio::test]
async fn repeated_requests_replay_the_original_order() {
    let system = setup().await;
    let first = system.orders.create_order(lunch(&system), "checkout-2").await.expect("first");
    let second = system.orders.create_order(lunch(&system), "checkout-2").await.expect("second");
    assert!(second.is_replay);
    assert_eq!(first.order, second.order);
    assert_eq!(first.items, second.items);
    let orders = system.db.fetch_orders(OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    tear_down(system).await;
}

#[tokio::test]
async fn a_key_cannot_be_reused_for_a_different_cart() {
    let system = setup().await;
    system.orders.create_order(lunch(&system), "checkout-3").await.expect("first");
    let mut other = lunch(&system);
    other.items.push(CartLine::new(system.catalog.chicken.id, 1));
    let err = system.orders.create_order(other, "checkout-3").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::IdempotencyConflict(_)), "{err:?}");
    assert_eq!(err.code(), "IDEMPOTENCY_CONFLICT");
    tear_down(system).await;
}

#[tokio::test]
async fn expired_keys_are_released() {
    let config = ordpay_engine::engine_api::order_objects::OrderFlowConfig {
        idempotency_window: Duration::zero(),
        ..Default::default()
    };
    let system = setup_with(config, fast_retries(), Default::default()).await;
    let first = system.orders.create_order(lunch(&system), "checkout-4").await.expect("first");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = system.orders.create_order(lunch(&system), "checkout-4").await.expect("second");
    assert!(!second.is_replay);
    assert_ne!(first.order.id, second.order.id);
    tear_down(system).await;
}

#[tokio::test]
async fn concurrent_duplicates_create_one_order() {
    let system = setup().await;
    let (a, b) = tokio::join!(
        system.orders.create_order(lunch(&system), "checkout-5"),
        system.orders.create_order(lunch(&system), "checkout-5")
    );
    let (a, b) = (a.expect("a"), b.expect("b"));
    assert_eq!(a.order.id, b.order.id);
    assert_eq!([a.is_replay, b.is_replay].iter().filter(|r| !**r).count(), 1);
    let orders = system.db.fetch_orders(OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    tear_down(system).await;
}

#[tokio::test]
async fn pricing_errors_abort_before_anything_is_written() {
    let system = setup().await;
    let c = &system.catalog;
    let sold_out = CreateOrderRequest::new(alice(), vec![CartLine::new(c.suya.id, 1)], Fulfillment::pickup());
    let err = system.orders.create_order(sold_out, &new_key()).await.unwrap_err();
    assert_eq!(err.code(), "PRODUCT_UNAVAILABLE");

    let stale = CreateOrderRequest::new(
        alice(),
        vec![CartLine::new(c.jollof.id, 1).with_snapshot(Money::from(200_000))],
        Fulfillment::pickup(),
    );
    let err = system.orders.create_order(stale, &new_key()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Pricing(PricingError::PriceDrift { .. })), "{err:?}");

    let empty = CreateOrderRequest::new(alice(), vec![], Fulfillment::pickup());
    let err = system.orders.create_order(empty, &new_key()).await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_CART");

    let orders = system.db.fetch_orders(OrderQueryFilter::default()).await.unwrap();
    assert!(orders.is_empty());
    tear_down(system).await;
}

#[tokio::test]
async fn promotion_codes_are_stored_with_the_order() {
    let system = setup().await;
    let promo = NewPromotion::new("Lunch 10%", PromotionKind::Percentage, 1_000).with_code("LUNCH10");
    let promo = add_promotion(&system.db, promo).await;
    let order = place_order(&system, lunch(&system).with_promotion_code("lunch10")).await;
    assert_eq!(order.promotion_id, Some(promo.id));
    assert_eq!(order.discount_amount, Money::from(58_000));
    assert_eq!(order.promotion_discount, Money::from(58_000));
    assert_eq!(order.total_amount, Money::from(623_500 - 58_000));

    let err = system.orders.create_order(lunch(&system).with_promotion_code("NOPE"), &new_key()).await.unwrap_err();
    assert_eq!(err.code(), "PROMOTION_INELIGIBLE");
    tear_down(system).await;
}

#[tokio::test]
async fn cancelling_an_order() {
    let system = setup().await;
    let order = place_order(&system, lunch(&system)).await;
    let cancelled = system.orders.cancel_order(&order.order_number).await.expect("Error cancelling");
    assert_eq!(cancelled.state(), OrderState::FAILED);
    assert_eq!(cancelled.version, order.version + 1);
    let err = system.orders.cancel_order(&order.order_number).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { .. }), "{err:?}");
    let err = system.orders.cancel_order(&"ORD-000000-NOPE00".into()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound(_)));
    settle().await;
    assert_eq!(system.events.failed_count(), 1);
    tear_down(system).await;
}

#[tokio::test]
async fn unpaid_orders_expire() {
    let system = setup().await;
    let stale = place_order(&system, lunch(&system)).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let expired = system.orders.expire_unpaid_orders(Duration::zero()).await.expect("Error expiring orders");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, stale.id);
    assert_eq!(expired[0].state(), OrderState::FAILED);
    let again = system.orders.expire_unpaid_orders(Duration::zero()).await.unwrap();
    assert!(again.is_empty());
    let fresh = system.orders.expire_unpaid_orders(Duration::hours(1)).await.unwrap();
    assert!(fresh.is_empty());
    tear_down(system).await;
}
