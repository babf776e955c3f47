use std::net::SocketAddr;

use actix_web::{http::StatusCode, test::TestRequest};
use ordpay_engine::{
    db_types::{Money, Order, OrderNumber, PaymentStatus},
    events::EventProducers,
    provider::{ChargeStatus, ProviderError},
    test_utils::scripted_provider::charge,
    OrderFlowApi,
    RateLimit,
};

use super::{
    helpers::{place_order, send_request, send_requests, setup, TestContext},
    mocks::MockProvider,
};
use crate::config::ServerOptions;

fn provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("paystack");
    provider
}

fn verify(order: &Order) -> TestRequest {
    TestRequest::post().uri(&format!("/api/payments/verify/{}", order.payment_reference)).peer_addr(peer())
}

fn peer() -> SocketAddr {
    "10.1.2.3:40000".parse().unwrap()
}

async fn reload(ctx: &TestContext, number: &OrderNumber) -> Order {
    let api = OrderFlowApi::new(ctx.db.clone(), EventProducers::default(), ctx.order_config.clone());
    api.fetch_order(number).await.unwrap().unwrap()
}

#[actix_web::test]
async fn a_successful_charge_confirms_the_order() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    let details = charge(&order.payment_reference, "4099260516", order.total_amount);
    provider.expect_verify_transaction().times(1).returning(move |_| Ok(ChargeStatus::Succeeded(details.clone())));
    let res = send_request(&ctx, provider, verify(&order)).await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["status"], "paid");
    assert_eq!(body["payment_status"], "paid");
    assert_eq!(body["total_amount"], 623_500);
    assert_eq!(reload(&ctx, &order.order_number).await.payment_status, PaymentStatus::Paid);
}

#[actix_web::test]
async fn a_paid_order_does_not_call_the_provider_again() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    let details = charge(&order.payment_reference, "4099260517", order.total_amount);
    provider.expect_verify_transaction().times(1).returning(move |_| Ok(ChargeStatus::Succeeded(details.clone())));
    let responses = send_requests(&ctx, provider, vec![verify(&order), verify(&order)]).await;
    assert_eq!(responses[0].json()["status"], "paid");
    assert_eq!(responses[1].status, StatusCode::OK);
    assert_eq!(responses[1].json()["status"], "paid");
}

#[actix_web::test]
async fn a_pending_charge_changes_nothing() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    provider.expect_verify_transaction().times(1).returning(|_| Ok(ChargeStatus::Pending));
    let res = send_request(&ctx, provider, verify(&order)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "pending");
    assert_eq!(reload(&ctx, &order.order_number).await.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn a_short_payment_is_flagged() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    let details = charge(&order.payment_reference, "4099260518", order.total_amount - Money::from(1));
    provider.expect_verify_transaction().times(1).returning(move |_| Ok(ChargeStatus::Succeeded(details.clone())));
    let res = send_request(&ctx, provider, verify(&order)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "flagged");
    assert_eq!(reload(&ctx, &order.order_number).await.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn provider_outages_are_retryable() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    provider.expect_verify_transaction().times(2).returning(|_| Err(ProviderError::Timeout));
    let res = send_request(&ctx, provider, verify(&order)).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = res.json();
    assert_eq!(body["code"], "PAYMENT_VERIFICATION_UNAVAILABLE");
    assert_eq!(body["retryable"], true);
    assert_eq!(reload(&ctx, &order.order_number).await.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn unknown_references_are_not_sent_to_the_provider() {
    let ctx = setup().await;
    let mut provider = provider();
    provider.expect_verify_transaction().never();
    let req = TestRequest::post().uri("/api/payments/verify/PAY-DOESNOTEXIST").peer_addr(peer());
    let res = send_request(&ctx, provider, req).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["code"], "ORDER_NOT_FOUND");
}

#[actix_web::test]
async fn verification_is_rate_limited_per_ip() {
    let mut ctx = setup().await;
    ctx.reconciliation_config.verify_limit = RateLimit::per_hour(1);
    ctx.options = ServerOptions { use_x_forwarded_for: true, use_forwarded: false };
    let order = place_order(&ctx, "alice").await;
    let mut provider = provider();
    provider.expect_verify_transaction().times(2).returning(|_| Ok(ChargeStatus::Pending));
    let from = |ip: &str| verify(&order).insert_header(("X-Forwarded-For", ip.to_string()));
    let responses =
        send_requests(&ctx, provider, vec![from("203.0.113.7"), from("203.0.113.7"), from("198.51.100.1")]).await;
    assert_eq!(responses[0].status, StatusCode::OK);
    assert_eq!(responses[1].status, StatusCode::TOO_MANY_REQUESTS);
    assert!(responses[1].headers.contains_key("Retry-After"));
    assert_eq!(responses[2].status, StatusCode::OK);
}
