use std::time::Duration;

use actix_web::{
    http::{header::HeaderMap, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use log::debug;
use ordpay_engine::{
    db_types::{CustomerIdentity, Order},
    events::EventProducers,
    helpers::RetryPolicy,
    order_objects::{CreateOrderRequest, OrderFlowConfig},
    pricing::{CartLine, Fulfillment},
    provider::PaymentProvider,
    reconciliation_objects::ReconciliationConfig,
    test_utils::{
        fixtures::{seed_catalog, Catalog},
        prepare_env::{prepare_test_env, random_db_path},
    },
    OrderFlowApi,
    RateLimit,
    ReconciliationApi,
    SqliteDatabase,
};

use crate::{
    config::ServerOptions,
    routes::{health, CreateOrderRoute, OrderByNumberRoute, PaymentWebhookRoute, VerifyPaymentRoute},
};

pub struct TestContext {
    pub db: SqliteDatabase,
    pub catalog: Catalog,
    pub order_config: OrderFlowConfig,
    pub reconciliation_config: ReconciliationConfig,
    pub options: ServerOptions,
}

pub async fn setup() -> TestContext {
    let db = prepare_test_env(&random_db_path()).await;
    let catalog = seed_catalog(&db).await;
    let reconciliation_config = ReconciliationConfig {
        provider_timeout: Duration::from_millis(500),
        retry: RetryPolicy::new(2, Duration::from_millis(5)),
        verify_limit: RateLimit::per_minute(100),
    };
    TestContext {
        db,
        catalog,
        order_config: OrderFlowConfig::default(),
        reconciliation_config,
        options: ServerOptions::default(),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Response body is not JSON")
    }
}

/// Builds the app once, with `provider` behind the payment routes, and runs `requests` against it in order.
pub async fn send_requests<P>(ctx: &TestContext, provider: P, requests: Vec<TestRequest>) -> Vec<TestResponse>
where P: PaymentProvider + 'static {
    let orders_api = OrderFlowApi::new(ctx.db.clone(), EventProducers::default(), ctx.order_config.clone());
    let payments_api =
        ReconciliationApi::new(ctx.db.clone(), provider, EventProducers::default(), ctx.reconciliation_config.clone());
    let app = App::new()
        .app_data(web::Data::new(orders_api))
        .app_data(web::Data::new(payments_api))
        .app_data(web::Data::new(ctx.options))
        .service(health)
        .service(
            web::scope("/api")
                .service(CreateOrderRoute::<SqliteDatabase>::new())
                .service(OrderByNumberRoute::<SqliteDatabase>::new())
                .service(VerifyPaymentRoute::<SqliteDatabase, P>::new()),
        )
        .service(web::scope("/webhooks").service(PaymentWebhookRoute::<SqliteDatabase, P>::new()));
    let service = test::init_service(app).await;
    let mut responses = Vec::with_capacity(requests.len());
    for req in requests {
        debug!("Making request");
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let headers = res.headers().clone();
        let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
        responses.push(TestResponse { status, headers, body });
    }
    responses
}

pub async fn send_request<P>(ctx: &TestContext, provider: P, request: TestRequest) -> TestResponse
where P: PaymentProvider + 'static {
    send_requests(ctx, provider, vec![request]).await.pop().expect("one response")
}

pub fn checkout(ctx: &TestContext, customer: &str) -> CreateOrderRequest {
    CreateOrderRequest::new(
        CustomerIdentity::Registered(customer.into()),
        vec![CartLine::new(ctx.catalog.jollof.id, 2), CartLine::new(ctx.catalog.chapman.id, 1)],
        Fulfillment::pickup(),
    )
    .with_contact("+2348012345678")
}

pub fn order_request(request: &CreateOrderRequest, key: &str) -> TestRequest {
    TestRequest::post()
        .uri("/api/orders")
        .insert_header(("Idempotency-Key", key))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(serde_json::to_string(request).expect("serializable"))
}

/// Places an order straight through the engine, bypassing HTTP.
pub async fn place_order(ctx: &TestContext, customer: &str) -> Order {
    let api = OrderFlowApi::new(ctx.db.clone(), EventProducers::default(), ctx.order_config.clone());
    api.create_order(checkout(ctx, customer), &format!("direct-{customer}")).await.expect("order created").order
}
