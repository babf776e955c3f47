use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db::traits::{InsertOrderResult, PaymentGatewayDatabase, StorageError},
    db_types::{Order, OrderItem, OrderNumber, OrderState, RateLimitKey, RateLimitOperation},
    engine_api::{
        errors::OrderFlowError,
        order_objects::{CreateOrderRequest, OrderCreated, OrderFlowConfig},
        pricing_api::PricingApi,
        rate_limiter::{RateLimitDecision, RateLimiter},
    },
    events::{EventProducers, FailureReason, OrderFailedEvent},
    helpers::{generate_order_number, generate_payment_reference, request_fingerprint, ORDER_NUMBER_ATTEMPTS},
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// `OrderFlowApi` handles the customer side of the order lifecycle: checkout, cancellation and the expiry of orders
/// that were never paid.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    pricing: PricingApi<B>,
    rate_limiter: RateLimiter<B>,
    config: OrderFlowConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({})", self.config.currency)
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, config: OrderFlowConfig) -> Self {
        let pricing = PricingApi::new(db.clone());
        let rate_limiter = RateLimiter::new(db.clone());
        Self { db, producers, pricing, rate_limiter, config }
    }

    pub fn config(&self) -> &OrderFlowConfig {
        &self.config
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Prices and stores a new order.
    ///
    /// The customer's rate limit is checked before anything else. A repeated `idempotency_key` with an identical
    /// request returns the order created the first time, with `is_replay` set. The order, its items and the key are
    /// written in a single transaction, so a concurrent duplicate either sees the winner's order or nothing at all.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        idempotency_key: &str,
    ) -> Result<OrderCreated, OrderFlowError> {
        let key = idempotency_key.trim();
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(OrderFlowError::InvalidIdempotencyKey(format!(
                "keys must be between 1 and {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
        let rate_key = RateLimitKey::for_customer(&request.customer, RateLimitOperation::CreateOrder);
        let decision = self.rate_limiter.check_and_increment(&rate_key, self.config.create_order_limit).await?;
        if let RateLimitDecision::Denied { retry_after, .. } = decision {
            return Err(OrderFlowError::RateLimited { retry_after });
        }

        let fingerprint = request_fingerprint(&request);
        if let Some(replay) = self.check_idempotency_key(key, &fingerprint).await? {
            info!("🔄️📦️ Replaying order {} for idempotency key {key}", replay.order.order_number);
            return Ok(replay);
        }

        let price = self.pricing.price(&request.pricing_request()).await?;
        let now = Utc::now();
        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let order_number = generate_order_number(now);
            if self.db.order_number_exists(&order_number).await? {
                debug!("🔄️📦️ Order number {order_number} is taken. Generating another");
                continue;
            }
            let order = request.to_new_order(order_number, generate_payment_reference(), &price, &self.config.currency);
            let idempotency = Some((key.to_string(), fingerprint.clone()));
            match self.db.insert_order(order, price.lines.clone(), idempotency).await {
                Ok(InsertOrderResult::Inserted(id)) => {
                    let created = self.load_order(id, false).await?;
                    info!(
                        "🔄️📦️ Order {} created for {}. Total {} {}",
                        created.order.order_number, request.customer, created.order.total_amount, created.order.currency
                    );
                    return Ok(created);
                },
                Ok(InsertOrderResult::AlreadyExists(winner)) => {
                    debug!("🔄️📦️ Lost the race for idempotency key {key} to order #{winner}");
                    return self.resolve_lost_race(key, &fingerprint, winner).await;
                },
                Err(StorageError::ConstraintViolation(msg)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!("🔄️📦️ Order number or payment reference collision ({msg}). Retrying");
                },
                Err(e) => return Err(e.into()),
            }
        }
        error!("🔄️📦️ Could not allocate an order number in {ORDER_NUMBER_ATTEMPTS} attempts");
        Err(OrderFlowError::OrderNumberExhausted(ORDER_NUMBER_ATTEMPTS))
    }

    /// Returns the original order if the key is live and bound to the same request. Expired keys are released.
    async fn check_idempotency_key(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<Option<OrderCreated>, OrderFlowError> {
        let Some(record) = self.db.fetch_idempotency_record(key).await? else {
            return Ok(None);
        };
        let cutoff = Utc::now() - self.config.idempotency_window;
        if record.created_at < cutoff {
            let removed = self.db.remove_stale_idempotency_key(key, cutoff).await?;
            debug!("🔄️📦️ Idempotency key {key} has expired (removed: {removed})");
            return Ok(None);
        }
        if record.request_hash != fingerprint {
            warn!("🔄️📦️ Idempotency key {key} reused with a different request body");
            return Err(OrderFlowError::IdempotencyConflict(key.to_string()));
        }
        self.load_order(record.order_id, true).await.map(Some)
    }

    async fn resolve_lost_race(
        &self,
        key: &str,
        fingerprint: &str,
        winner: i64,
    ) -> Result<OrderCreated, OrderFlowError> {
        match self.db.fetch_idempotency_record(key).await? {
            Some(record) if record.request_hash != fingerprint => {
                Err(OrderFlowError::IdempotencyConflict(key.to_string()))
            },
            _ => self.load_order(winner, true).await,
        }
    }

    async fn load_order(&self, id: i64, is_replay: bool) -> Result<OrderCreated, OrderFlowError> {
        let order = self.db.fetch_order(id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(format!("#{id}")))?;
        let items = self.db.fetch_order_items(id).await?;
        Ok(OrderCreated { order, items, is_replay })
    }

    pub async fn fetch_order(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order_by_number(order_number).await?)
    }

    pub async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderFlowError> {
        Ok(self.db.fetch_order_items(order_id).await?)
    }

    /// Cancels an order that is still awaiting payment.
    pub async fn cancel_order(&self, order_number: &OrderNumber) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_number.to_string()))?;
        self.fail_order(order, FailureReason::Cancelled).await
    }

    /// Fails every order that has been awaiting payment for longer than `timeout`. Orders that were paid in the
    /// meantime are skipped.
    pub async fn expire_unpaid_orders(&self, timeout: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let cutoff = Utc::now() - timeout;
        let stale = self.db.fetch_stale_pending_orders(cutoff).await?;
        let mut expired = Vec::with_capacity(stale.len());
        for order in stale {
            match self.fail_order(order, FailureReason::Expired).await {
                Ok(order) => expired.push(order),
                Err(OrderFlowError::InvalidTransition { order, state }) => {
                    debug!("🔄️📦️ Order {order} moved to {state} before it could be expired");
                },
                Err(e) => return Err(e),
            }
        }
        if !expired.is_empty() {
            info!("🔄️📦️ {} unpaid orders expired", expired.len());
        }
        Ok(expired)
    }

    /// Releases idempotency keys older than the idempotency window.
    pub async fn purge_idempotency_keys(&self) -> Result<u64, OrderFlowError> {
        let cutoff = Utc::now() - self.config.idempotency_window;
        Ok(self.db.purge_idempotency_keys(cutoff).await?)
    }

    async fn fail_order(&self, order: Order, reason: FailureReason) -> Result<Order, OrderFlowError> {
        let invalid =
            |o: &Order| OrderFlowError::InvalidTransition { order: o.order_number.to_string(), state: o.state() };
        if !order.is_awaiting_payment() {
            return Err(invalid(&order));
        }
        match self.db.transition_order(order.id, OrderState::AWAITING_PAYMENT, OrderState::FAILED).await? {
            Some(updated) => {
                debug!("🔄️📦️ Order {} closed ({reason:?})", updated.order_number);
                self.producers.publish_order_failed(OrderFailedEvent::new(updated.clone(), reason)).await;
                Ok(updated)
            },
            None => {
                let current = self.db.fetch_order(order.id).await?.unwrap_or(order);
                Err(invalid(&current))
            },
        }
    }
}
