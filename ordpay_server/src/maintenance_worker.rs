use chrono::{Duration, Utc};
use log::*;
use ordpay_engine::{db_types::Order, OrderFlowApi, PaymentGatewayDatabase, RateLimiter, SqliteDatabase};
use tokio::task::JoinHandle;

/// Rate limit windows older than this are deleted. Reputation is kept.
const RATE_LIMIT_WINDOW_RETENTION: Duration = Duration::days(1);

/// Starts the maintenance worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each run cancels orders that have been awaiting payment for longer than `unpaid_timeout`, and clears out stale rate
/// limit windows and expired idempotency keys.
pub fn start_maintenance_worker(
    orders: OrderFlowApi<SqliteDatabase>,
    rate_limiter: RateLimiter<SqliteDatabase>,
    unpaid_timeout: Duration,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Maintenance worker started");
        loop {
            timer.tick().await;
            run_maintenance(&orders, &rate_limiter, unpaid_timeout).await;
        }
    })
}

/// One pass of the maintenance job. Failures are logged, and the next pass tries again.
pub async fn run_maintenance<B: PaymentGatewayDatabase>(
    orders: &OrderFlowApi<B>,
    rate_limiter: &RateLimiter<B>,
    unpaid_timeout: Duration,
) {
    debug!("🕰️ Running maintenance job");
    match orders.expire_unpaid_orders(unpaid_timeout).await {
        Ok(expired) if expired.is_empty() => trace!("🕰️ No unpaid orders to expire"),
        Ok(expired) => info!("🕰️ {} unpaid orders expired: {}", expired.len(), order_list(&expired)),
        Err(e) => error!("🕰️ Error expiring unpaid orders: {e}"),
    }
    match rate_limiter.purge_windows_before(Utc::now() - RATE_LIMIT_WINDOW_RETENTION).await {
        Ok(n) => debug!("🕰️ {n} stale rate limit windows removed"),
        Err(e) => error!("🕰️ Error purging rate limit windows: {e}"),
    }
    match orders.purge_idempotency_keys().await {
        Ok(n) => debug!("🕰️ {n} expired idempotency keys released"),
        Err(e) => error!("🕰️ Error purging idempotency keys: {e}"),
    }
}

fn order_list(orders: &[Order]) -> String {
    orders.iter().map(|o| format!("[{}] {}", o.id, o.order_number)).collect::<Vec<String>>().join(", ")
}
