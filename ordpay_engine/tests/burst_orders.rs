use std::{collections::HashSet, time::Duration};

use log::*;
use ordpay_engine::{
    db_types::CustomerIdentity,
    engine_api::order_objects::{CreateOrderRequest, OrderFlowConfig},
    events::EventProducers,
    pricing::{CartLine, Fulfillment},
    test_utils::{
        fixtures::seed_catalog,
        prepare_env::{prepare_test_env, random_db_path},
    },
    OrderFlowApi,
    PaymentGatewayDatabase,
    RateLimit,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

const NUM_ORDERS: u64 = 40;
const RATE: u64 = 200; // orders per second

#[test]
fn burst_orders() {
    info!("🚀️ Starting order injection test");

    let sys = Runtime::new().unwrap();

    let delay = Duration::from_millis(1000 / RATE);

    sys.block_on(async move {
        let url = random_db_path();
        let mut db = prepare_test_env(&url).await;
        let catalog = seed_catalog(&db).await;
        let config = OrderFlowConfig { create_order_limit: RateLimit::per_minute(1_000), ..Default::default() };
        let api = OrderFlowApi::new(db.clone(), EventProducers::default(), config);

        let mut timer = tokio::time::interval(delay);
        let mut numbers = HashSet::new();
        let mut references = HashSet::new();
        info!("🚀️ Injecting {NUM_ORDERS} orders");
        for i in 0..NUM_ORDERS {
            timer.tick().await;
            let customer = CustomerIdentity::Registered(((i + 1) % 5).to_string());
            #[allow(clippy::cast_possible_wrap)]
            let lines = vec![CartLine::new(catalog.jollof.id, (i % 3 + 1) as i64)];
            let request = CreateOrderRequest::new(customer, lines, Fulfillment::pickup());
            let created = match api.create_order(request, &format!("burst-{i}")).await {
                Ok(created) => created,
                Err(e) => panic!("Error processing order {i}: {e}"),
            };
            assert!(!created.is_replay);
            numbers.insert(created.order.order_number.clone());
            references.insert(created.order.payment_reference.clone());
        }
        assert_eq!(numbers.len() as u64, NUM_ORDERS);
        assert_eq!(references.len() as u64, NUM_ORDERS);
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        Sqlite::drop_database(&url).await.unwrap();
    });
    info!("🚀️ test complete");
}
