#![allow(dead_code)]
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use log::*;
use ordpay_engine::{
    db_types::{CustomerIdentity, Order},
    engine_api::{
        order_objects::{CreateOrderRequest, OrderFlowConfig},
        reconciliation_objects::{ReconciliationConfig, WebhookAck},
    },
    events::{EventHandlers, EventHooks, IncidentEvent, NotificationEvent},
    helpers::RetryPolicy,
    test_utils::{
        fixtures::{seed_catalog, Catalog},
        prepare_env::{prepare_test_env, random_db_path},
        scripted_provider::ScriptedProvider,
    },
    OrderFlowApi,
    PaymentGatewayDatabase,
    RateLimit,
    ReconciliationApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub catalog: Catalog,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: ReconciliationApi<SqliteDatabase, ScriptedProvider>,
    pub provider: ScriptedProvider,
    pub events: EventLog,
}

/// Records what the event hooks saw.
#[derive(Default, Clone)]
pub struct EventLog {
    pub paid: Arc<AtomicUsize>,
    pub failed: Arc<AtomicUsize>,
    pub incidents: Arc<Mutex<Vec<IncidentEvent>>>,
    pub notifications: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl EventLog {
    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let paid = self.paid.clone();
        let failed = self.failed.clone();
        let incidents = self.incidents.clone();
        let notifications = self.notifications.clone();
        hooks
            .on_order_paid(move |ev| {
                info!("🪝️ Order {} paid", ev.order.order_number);
                paid.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            })
            .on_order_failed(move |_| {
                failed.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            })
            .on_incident(move |ev| {
                incidents.lock().unwrap().push(ev);
                Box::pin(async {})
            })
            .on_notification(move |ev| {
                notifications.lock().unwrap().push(ev);
                Box::pin(async {})
            });
        hooks
    }

    pub fn paid_count(&self) -> usize {
        self.paid.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.lock().unwrap().len()
    }
}

pub fn fast_retries() -> ReconciliationConfig {
    ReconciliationConfig {
        provider_timeout: Duration::from_millis(500),
        retry: RetryPolicy::new(3, Duration::from_millis(5)),
        verify_limit: RateLimit::per_minute(1_000),
    }
}

pub async fn setup() -> TestSystem {
    setup_with(OrderFlowConfig::default(), fast_retries(), ScriptedProvider::default()).await
}

pub async fn setup_with(
    order_config: OrderFlowConfig,
    reconciliation_config: ReconciliationConfig,
    provider: ScriptedProvider,
) -> TestSystem {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let catalog = seed_catalog(&db).await;
    let events = EventLog::default();
    let handlers = EventHandlers::new(64, events.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let orders = OrderFlowApi::new(db.clone(), producers.clone(), order_config);
    let payments = ReconciliationApi::new(db.clone(), provider.clone(), producers, reconciliation_config);
    TestSystem { url, db, catalog, orders, payments, provider, events }
}

pub async fn tear_down(mut system: TestSystem) {
    if let Err(e) = system.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&system.url).await {
        warn!("🚀️ Failed to drop database {}: {e}", system.url);
    }
}

pub fn alice() -> CustomerIdentity {
    CustomerIdentity::Registered("alice".into())
}

pub fn guest(session: &str) -> CustomerIdentity {
    CustomerIdentity::Guest(session.into())
}

pub fn new_key() -> String {
    format!("key-{}", rand::random::<u64>())
}

pub async fn place_order(system: &TestSystem, request: CreateOrderRequest) -> Order {
    system.orders.create_order(request, &new_key()).await.expect("Error creating order").order
}

pub async fn deliver(system: &TestSystem, payload: &str) -> WebhookAck {
    let signature = system.provider.sign(payload);
    system.payments.handle_webhook(payload.as_bytes(), Some(&signature)).await.expect("Error handling webhook")
}

/// Gives the event handlers a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
