use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use log::*;
use ordpay_engine::{
    db_types::{Order, Product},
    engine_api::{
        order_objects::OrderFlowConfig,
        reconciliation_objects::{ReconciliationConfig, WebhookAck},
    },
    events::EventProducers,
    helpers::RetryPolicy,
    test_utils::{
        fixtures::{seed_catalog, Catalog},
        prepare_env::{create_database, random_db_path, run_migrations},
        scripted_provider::ScriptedProvider,
    },
    OrderFlowApi,
    OrderFlowError,
    RateLimit,
    ReconciliationApi,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct OrderingWorld {
    pub system: Option<RestaurantSystem>,
    /// Orders by the idempotency key they were created with
    pub orders: HashMap<String, Order>,
    pub last_key: Option<String>,
    pub last_replay: bool,
    pub last_error: Option<OrderFlowError>,
    pub last_ack: Option<WebhookAck>,
    pub last_payload: Option<String>,
}

pub struct RestaurantSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub catalog: Catalog,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: ReconciliationApi<SqliteDatabase, ScriptedProvider>,
    pub provider: ScriptedProvider,
}

impl Debug for RestaurantSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RestaurantSystem({})", self.db_path)
    }
}

impl OrderingWorld {
    pub fn system(&self) -> &RestaurantSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn order(&self, key: &str) -> &Order {
        self.orders.get(key).unwrap_or_else(|| panic!("No order was created with key {key}"))
    }

    pub fn last_order(&self) -> &Order {
        self.order(self.last_key.as_deref().expect("No order has been placed"))
    }
}

impl RestaurantSystem {
    pub async fn new(create_order_limit: RateLimit) -> Self {
        let db_path = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&db_path, 1).await.expect("Error creating connection to database");
        debug!("Created database: {db_path}");
        let catalog = seed_catalog(&db).await;
        let provider = ScriptedProvider::default();
        let config = OrderFlowConfig { create_order_limit, ..Default::default() };
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default(), config);
        let recon_config = ReconciliationConfig {
            retry: RetryPolicy::new(2, std::time::Duration::from_millis(5)),
            verify_limit: RateLimit::per_minute(1_000),
            ..Default::default()
        };
        let payments = ReconciliationApi::new(db.clone(), provider.clone(), EventProducers::default(), recon_config);
        Self { db_path, db, catalog, orders, payments, provider }
    }

    pub fn product(&self, name: &str) -> &Product {
        match name {
            "jollof" => &self.catalog.jollof,
            "chicken" => &self.catalog.chicken,
            "chapman" => &self.catalog.chapman,
            "suya" => &self.catalog.suya,
            "moi_moi" => &self.catalog.moi_moi,
            _ => panic!("Unknown menu item {name}"),
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
