use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use ordpay_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    OrderFlowApi,
    RateLimiter,
    ReconciliationApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    maintenance_worker::start_maintenance_worker,
    paystack_client::PaystackClient,
    routes::{health, CreateOrderRoute, OrderByNumberRoute, PaymentWebhookRoute, VerifyPaymentRoute},
};

const MAINTENANCE_PERIOD: Duration = Duration::from_secs(60);

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    if config.database_url.is_empty() {
        return Err(ServerError::ConfigurationError("ORDPAY_DATABASE_URL is not set".into()));
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    let provider = PaystackClient::new(&config.provider)?;

    let handlers = EventHandlers::new(config.event_buffer_size, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orders_api = OrderFlowApi::new(db.clone(), producers.clone(), config.order_flow_config());
    let rate_limiter = RateLimiter::new(db.clone());
    let _worker = start_maintenance_worker(orders_api, rate_limiter, config.unpaid_order_timeout, MAINTENANCE_PERIOD);

    let srv = create_server_instance(config, db, provider, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    provider: PaystackClient,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let order_flow_config = config.order_flow_config();
    let reconciliation_config = config.reconciliation_config();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone(), order_flow_config.clone());
        let reconciliation_api =
            ReconciliationApi::new(db.clone(), provider.clone(), producers.clone(), reconciliation_config.clone());
        let api_scope = web::scope("/api")
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(OrderByNumberRoute::<SqliteDatabase>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, PaystackClient>::new());
        let webhook_scope =
            web::scope("/webhooks").service(PaymentWebhookRoute::<SqliteDatabase, PaystackClient>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ordpay::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(options))
            .service(health)
            .service(api_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Event hooks for the stand-alone server. Notification delivery and alerting are external concerns, so events are
/// logged for the collaborators that tail them.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_paid(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ Order {} paid. {} {} via {}",
                    ev.order.order_number, ev.transaction.amount, ev.order.currency, ev.transaction.provider_reference
                );
            })
        })
        .on_order_failed(|ev| {
            Box::pin(async move {
                info!("📬️ Order {} closed without payment ({:?})", ev.order.order_number, ev.reason);
            })
        })
        .on_incident(|ev| {
            Box::pin(async move {
                let incident = ev.incident;
                warn!(
                    target: "security_incident",
                    "📬️ Incident #{} [{}] {}", incident.id, incident.kind, incident.details
                );
            })
        })
        .on_notification(|ev| {
            Box::pin(async move {
                let payload = serde_json::to_string(&ev).unwrap_or_else(|e| format!("{e}"));
                info!(target: "ordpay::notifications", "📬️ {payload}");
            })
        });
    hooks
}
