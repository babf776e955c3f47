use actix_web::{http::StatusCode, test::TestRequest};
use ordpay_engine::{
    db_types::CustomerIdentity,
    pricing::{CartLine, Fulfillment},
    order_objects::CreateOrderRequest,
    RateLimit,
};

use super::{
    helpers::{checkout, order_request, place_order, send_request, send_requests, setup},
    mocks::MockProvider,
};

#[actix_web::test]
async fn health_check() {
    let ctx = setup().await;
    let res = send_request(&ctx, MockProvider::new(), TestRequest::get().uri("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "👍️\n");
}

#[actix_web::test]
async fn create_order_and_replay_it() {
    let ctx = setup().await;
    let request = checkout(&ctx, "alice");
    let responses = send_requests(&ctx, MockProvider::new(), vec![
        order_request(&request, "checkout-1"),
        order_request(&request, "checkout-1"),
    ])
    .await;
    assert_eq!(responses[0].status, StatusCode::CREATED);
    let created = responses[0].json();
    assert_eq!(created["replayed"], false);
    assert_eq!(created["subtotal"], 580_000);
    assert_eq!(created["tax_amount"], 43_500);
    assert_eq!(created["total_amount"], 623_500);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["payment_status"], "pending");
    assert_eq!(created["items"].as_array().unwrap().len(), 2);
    assert!(created["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert!(created["payment_reference"].as_str().unwrap().starts_with("PAY-"));
    assert!(created.get("version").is_none());

    assert_eq!(responses[1].status, StatusCode::OK);
    let replayed = responses[1].json();
    assert_eq!(replayed["replayed"], true);
    assert_eq!(replayed["order_number"], created["order_number"]);
}

#[actix_web::test]
async fn reusing_a_key_for_another_cart_conflicts() {
    let ctx = setup().await;
    let first = checkout(&ctx, "alice");
    let second = CreateOrderRequest::new(
        CustomerIdentity::Registered("alice".into()),
        vec![CartLine::new(ctx.catalog.chicken.id, 1)],
        Fulfillment::pickup(),
    );
    let responses = send_requests(&ctx, MockProvider::new(), vec![
        order_request(&first, "checkout-2"),
        order_request(&second, "checkout-2"),
    ])
    .await;
    assert_eq!(responses[0].status, StatusCode::CREATED);
    assert_eq!(responses[1].status, StatusCode::CONFLICT);
    assert_eq!(responses[1].json()["code"], "IDEMPOTENCY_CONFLICT");
}

#[actix_web::test]
async fn the_idempotency_key_is_required() {
    let ctx = setup().await;
    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(serde_json::to_string(&checkout(&ctx, "alice")).unwrap());
    let res = send_request(&ctx, MockProvider::new(), req).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json()["code"], "INVALID_IDEMPOTENCY_KEY");
}

#[actix_web::test]
async fn malformed_bodies_are_rejected() {
    let ctx = setup().await;
    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(("Idempotency-Key", "checkout-3"))
        .set_payload(r#"{"customer": "alice", "items": []}"#);
    let res = send_request(&ctx, MockProvider::new(), req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["code"], "INVALID_REQUEST");
}

#[actix_web::test]
async fn checkout_errors_are_actionable() {
    let ctx = setup().await;
    let request = CreateOrderRequest::new(
        CustomerIdentity::Guest("sess-9".into()),
        vec![CartLine::new(ctx.catalog.suya.id, 1)],
        Fulfillment::pickup(),
    );
    let res = send_request(&ctx, MockProvider::new(), order_request(&request, "checkout-4")).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json();
    assert_eq!(body["code"], "PRODUCT_UNAVAILABLE");
    assert_eq!(body["message"], "One or more items are out of stock or no longer available");
    assert_eq!(body["retryable"], false);

    let unknown_code = checkout(&ctx, "alice").with_promotion_code("NOSUCHCODE");
    let res = send_request(&ctx, MockProvider::new(), order_request(&unknown_code, "checkout-5")).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json()["code"], "PROMOTION_INELIGIBLE");
}

#[actix_web::test]
async fn customers_are_rate_limited() {
    let mut ctx = setup().await;
    ctx.order_config.create_order_limit = RateLimit::per_hour(1);
    let request = checkout(&ctx, "bola");
    let responses = send_requests(&ctx, MockProvider::new(), vec![
        order_request(&request, "checkout-6"),
        order_request(&request, "checkout-7"),
    ])
    .await;
    assert_eq!(responses[0].status, StatusCode::CREATED);
    assert_eq!(responses[1].status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after = responses[1].headers.get("Retry-After").unwrap().to_str().unwrap().parse::<u64>().unwrap();
    assert!((1..=3600).contains(&retry_after));
    let body = responses[1].json();
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["retryable"], true);
}

#[actix_web::test]
async fn fetch_an_order_by_number() {
    let ctx = setup().await;
    let order = place_order(&ctx, "chidi").await;
    let uri = format!("/api/orders/{}", order.order_number);
    let responses = send_requests(&ctx, MockProvider::new(), vec![
        TestRequest::get().uri(&uri),
        TestRequest::get().uri("/api/orders/ORD-000000-NOPE00"),
    ])
    .await;
    assert_eq!(responses[0].status, StatusCode::OK);
    let body = responses[0].json();
    assert_eq!(body["order_number"], order.order_number.as_str());
    assert_eq!(body["total_amount"], order.total_amount.value());
    assert_eq!(body["items"][0]["product_name"], "Jollof Rice");
    assert_eq!(responses[1].status, StatusCode::NOT_FOUND);
    assert_eq!(responses[1].json()["code"], "NOT_FOUND");
}
