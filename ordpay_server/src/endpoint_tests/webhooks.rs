use actix_web::{http::StatusCode, test::TestRequest};
use ordpay_engine::{
    db_types::{IncidentKind, Order, PaymentStatus, TransactionStatus},
    provider::PAYSTACK_SIGNATURE_HEADER,
    test_utils::scripted_provider::{charge_payload, ScriptedProvider},
    PaymentGatewayDatabase,
};

use super::helpers::{place_order, send_request, send_requests, setup, TestContext};

const ACK: &str = r#"{"success":true,"message":"Webhook received."}"#;

fn paid(order: &Order, provider_id: i64) -> String {
    charge_payload("charge.success", provider_id, &order.payment_reference, order.total_amount, "NGN")
}

fn delivery(payload: &str, signature: Option<&str>) -> TestRequest {
    let mut req = TestRequest::post()
        .uri("/webhooks/payments")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(payload.to_string());
    if let Some(signature) = signature {
        req = req.insert_header((PAYSTACK_SIGNATURE_HEADER, signature.to_string()));
    }
    req
}

async fn payment_status(ctx: &TestContext, order: &Order) -> PaymentStatus {
    ctx.db.fetch_order(order.id).await.unwrap().unwrap().payment_status
}

#[actix_web::test]
async fn a_signed_charge_confirms_the_order() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let provider = ScriptedProvider::default();
    let payload = paid(&order, 5001);
    let signature = provider.sign(&payload);
    let res = send_request(&ctx, provider, delivery(&payload, Some(&signature))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, ACK);
    assert_eq!(payment_status(&ctx, &order).await, PaymentStatus::Paid);
}

#[actix_web::test]
async fn redeliveries_are_acknowledged_once_applied() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let provider = ScriptedProvider::default();
    let payload = paid(&order, 5002);
    let signature = provider.sign(&payload);
    let responses = send_requests(&ctx, provider, vec![
        delivery(&payload, Some(&signature)),
        delivery(&payload, Some(&signature)),
    ])
    .await;
    assert!(responses.iter().all(|r| r.status == StatusCode::OK && r.body == ACK));
    let transactions = ctx.db.fetch_transactions_for_order(order.id).await.unwrap();
    assert_eq!(transactions.iter().filter(|t| t.status == TransactionStatus::Success).count(), 1);
}

#[actix_web::test]
async fn forged_webhooks_get_the_same_answer() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let provider = ScriptedProvider::default();
    let payload = paid(&order, 5003);
    let forged = "ab".repeat(64);
    let responses =
        send_requests(&ctx, provider, vec![delivery(&payload, Some(&forged)), delivery(&payload, None)]).await;
    for res in &responses {
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, ACK);
    }
    assert_eq!(payment_status(&ctx, &order).await, PaymentStatus::Pending);
    let incidents = ctx.db.fetch_incidents(Some(IncidentKind::InvalidSignature)).await.unwrap();
    assert_eq!(incidents.len(), 2);
}

#[actix_web::test]
async fn a_storage_outage_asks_for_redelivery() {
    let ctx = setup().await;
    let order = place_order(&ctx, "alice").await;
    let provider = ScriptedProvider::default();
    let payload = paid(&order, 5004);
    let signature = provider.sign(&payload);
    ctx.db.pool().close().await;
    let res = send_request(&ctx, provider, delivery(&payload, Some(&signature))).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, r#"{"success":false,"message":"Webhook could not be processed."}"#);
}
