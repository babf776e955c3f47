use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{
    catalog,
    db_url,
    idempotency,
    incidents,
    new_pool,
    orders,
    orders::OrderQueryFilter,
    promotions,
    rate_limits,
    transactions,
    webhooks,
    SqliteDatabaseError,
};
use crate::{
    db::traits::{
        CatalogManagement,
        ConfirmPayment,
        ConfirmPaymentOutcome,
        GeocodingManagement,
        InsertOrderResult,
        InsertTransactionResult,
        PaymentAttempt,
        PaymentGatewayDatabase,
        PromotionManagement,
        RateLimitManagement,
        RecordRefund,
        RefundOutcome,
        StorageError,
        WebhookRecordResult,
    },
    db_types::*,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
        idempotency: Option<(String, String)>,
    ) -> Result<InsertOrderResult, StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let id = orders::insert_order(&order, now, &mut tx).await?;
        orders::insert_order_items(id, &items, &mut tx).await?;
        if let Some((key, request_hash)) = idempotency {
            if !idempotency::claim_key(&key, &request_hash, id, now, &mut tx).await? {
                let winner = idempotency::fetch_record(&key, &mut tx).await?.map(|r| r.order_id);
                tx.rollback().await?;
                let winner = winner.ok_or_else(|| {
                    StorageError::DatabaseError(format!("Idempotency key {key} was taken but could not be read"))
                })?;
                debug!(
                    "🗃️ Idempotency key {key} already belongs to order #{winner}. Order {} discarded.",
                    order.order_number
                );
                return Ok(InsertOrderResult::AlreadyExists(winner));
            }
        }
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {id} and {} items", order.order_number, items.len());
        Ok(InsertOrderResult::Inserted(id))
    }

    async fn fetch_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(idempotency::fetch_record(key, &mut conn).await?)
    }

    async fn remove_stale_idempotency_key(&self, key: &str, cutoff: DateTime<Utc>) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(idempotency::remove_if_older_than(key, cutoff, &mut conn).await?)
    }

    async fn purge_idempotency_keys(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(idempotency::purge_older_than(cutoff, &mut conn).await?)
    }

    async fn order_number_exists(&self, order_number: &OrderNumber) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::order_number_exists(order_number, &mut conn).await?)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(id, &mut conn).await?)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(order_number, &mut conn).await?)
    }

    async fn fetch_order_by_payment_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_payment_reference(reference, &mut conn).await?)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_items(order_id, &mut conn).await?)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<PaymentTransaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_transaction(&self, provider_reference: &str) -> Result<Option<PaymentTransaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_by_reference(provider_reference, &mut conn).await?)
    }

    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookRecordResult, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhooks::record_event(&event, Utc::now(), &mut conn).await?)
    }

    async fn mark_webhook_processed(&self, event_id: &str, result: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhooks::mark_processed(event_id, result, Utc::now(), &mut conn).await?)
    }

    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhooks::fetch_event(event_id, &mut conn).await?)
    }

    async fn record_incident(&self, incident: NewIncident) -> Result<Incident, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(incidents::insert_incident(&incident, Utc::now(), &mut conn).await?)
    }

    async fn fetch_incidents(&self, kind: Option<IncidentKind>) -> Result<Vec<Incident>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(incidents::fetch_incidents(kind, &mut conn).await?)
    }

    async fn record_payment_attempt(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<(InsertTransactionResult, Option<Incident>), StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let result = transactions::idempotent_insert(&attempt.transaction, now, &mut tx).await?;
        let incident = match (&result, &attempt.incident) {
            (InsertTransactionResult::Inserted(_), Some(incident)) => {
                Some(incidents::insert_incident(incident, now, &mut tx).await?)
            },
            _ => None,
        };
        if let Some((event_id, outcome)) = &attempt.webhook {
            webhooks::mark_processed(event_id, outcome, now, &mut tx).await?;
        }
        tx.commit().await?;
        Ok((result, incident))
    }

    async fn confirm_payment(&self, confirmation: ConfirmPayment) -> Result<ConfirmPaymentOutcome, StorageError> {
        let now = Utc::now();
        let order_id = confirmation.order_id;
        let mut tx = self.pool.begin().await?;
        // The swap goes first so that this transaction holds the write lock for everything that follows
        let (from, to) = (OrderState::AWAITING_PAYMENT, OrderState::PAID);
        let swapped = orders::transition_order(order_id, from, to, None, now, &mut tx).await?;
        let order = match swapped {
            Some(order) => order,
            None => {
                tx.rollback().await?;
                let current = self.fetch_order(order_id).await?;
                return Ok(ConfirmPaymentOutcome::StateConflict(current));
            },
        };
        let transaction = transactions::upsert(&confirmation.transaction, now, &mut tx).await?;
        if let Some(claim) = &confirmation.promotion {
            if let Some(limit) = claim.per_customer_limit {
                let used = promotions::customer_usage_count(claim.promotion_id, &claim.customer_ref, &mut tx).await?;
                if used >= limit {
                    tx.rollback().await?;
                    warn!(
                        "🗃️ {} has used promotion #{} {used} times (limit {limit}). Confirmation of order #{order_id} \
                         rolled back.",
                        claim.customer_ref, claim.promotion_id
                    );
                    return Ok(ConfirmPaymentOutcome::PromotionCapExceeded(claim.promotion_id));
                }
            }
            if !promotions::increment_usage(claim.promotion_id, &mut tx).await? {
                tx.rollback().await?;
                warn!(
                    "🗃️ Promotion #{} has reached its usage limit. Confirmation of order #{order_id} rolled back.",
                    claim.promotion_id
                );
                return Ok(ConfirmPaymentOutcome::PromotionCapExceeded(claim.promotion_id));
            }
            promotions::insert_usage(claim, order_id, now, &mut tx).await?;
        }
        if let Some((event_id, result)) = &confirmation.webhook {
            webhooks::mark_processed(event_id, result, now, &mut tx).await?;
        }
        tx.commit().await?;
        info!("🗃️ Order {} is paid. Transaction [{}]", order.order_number, transaction.provider_reference);
        Ok(ConfirmPaymentOutcome::Confirmed { order, transaction })
    }

    async fn apply_refund(&self, refund: RecordRefund) -> Result<RefundOutcome, StorageError> {
        let now = Utc::now();
        let order_id = refund.order_id;
        let mut tx = self.pool.begin().await?;
        // As with confirmations, the swap goes first and takes the write lock
        let swapped =
            orders::transition_order(order_id, refund.from, refund.to, Some(refund.expected_version), now, &mut tx)
                .await?;
        let Some(order) = swapped else {
            tx.rollback().await?;
            let current = self.fetch_order(order_id).await?;
            return Ok(RefundOutcome::StateConflict(current));
        };
        let inserted = transactions::idempotent_insert(&refund.transaction, now, &mut tx).await?;
        if let InsertTransactionResult::AlreadyExists(_) = inserted {
            tx.rollback().await?;
            debug!("🗃️ Refund [{}] was already recorded", refund.transaction.provider_reference);
            return Ok(RefundOutcome::AlreadyRecorded);
        }
        let refunded = transactions::refunded_total(order_id, &mut tx).await?;
        if refunded > order.total_amount {
            tx.rollback().await?;
            warn!(
                "🗃️ Refund [{}] would take order #{order_id} to {refunded} refunded of {}. Rolled back.",
                refund.transaction.provider_reference, order.total_amount
            );
            let current = self.fetch_order(order_id).await?;
            return Ok(RefundOutcome::StateConflict(current));
        }
        if let Some((event_id, result)) = &refund.webhook {
            webhooks::mark_processed(event_id, result, now, &mut tx).await?;
        }
        tx.commit().await?;
        info!(
            "🗃️ Refund [{}] applied. Order {} is now {} with {refunded} refunded",
            refund.transaction.provider_reference,
            order.order_number,
            order.state()
        );
        Ok(RefundOutcome::Applied(order))
    }

    async fn transition_order(
        &self,
        order_id: i64,
        from: OrderState,
        to: OrderState,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::transition_order(order_id, from, to, None, Utc::now(), &mut conn).await?)
    }

    async fn fetch_stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, StorageError> {
        let filter = OrderQueryFilter::default()
            .with_status(OrderStatus::Pending)
            .with_payment_status(PaymentStatus::Pending)
            .created_before(cutoff);
        Ok(self.fetch_orders(filter).await?)
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_products(&self, ids: &[i64]) -> Result<Vec<Product>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_products(ids, &mut conn).await?)
    }

    async fn fetch_delivery_zone(&self, id: i64) -> Result<Option<DeliveryZone>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_delivery_zone(id, &mut conn).await?)
    }
}

impl GeocodingManagement for SqliteDatabase {
    async fn fetch_delivery_distance(&self, zone_id: i64, address_id: i64) -> Result<Option<i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_delivery_distance(zone_id, address_id, &mut conn).await?)
    }
}

impl PromotionManagement for SqliteDatabase {
    async fn fetch_promotion(&self, id: i64) -> Result<Option<Promotion>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promotions::fetch_promotion(id, &mut conn).await?)
    }

    async fn fetch_promotion_by_code(&self, code: &str) -> Result<Option<Promotion>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promotions::fetch_promotion_by_code(code, &mut conn).await?)
    }

    async fn fetch_automatic_promotions(&self, now: DateTime<Utc>) -> Result<Vec<Promotion>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promotions::fetch_automatic_promotions(now, &mut conn).await?)
    }

    async fn customer_usage_count(&self, promotion_id: i64, customer_ref: &str) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promotions::customer_usage_count(promotion_id, customer_ref, &mut conn).await?)
    }

    async fn fetch_promotion_usages(&self, promotion_id: i64) -> Result<Vec<PromotionUsage>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promotions::fetch_usages(promotion_id, &mut conn).await?)
    }
}

impl RateLimitManagement for SqliteDatabase {
    async fn try_increment_window(
        &self,
        key: &RateLimitKey,
        window_start: i64,
        window_end: i64,
        ceiling: i64,
    ) -> Result<Option<i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(rate_limits::try_increment(key, window_start, window_end, ceiling, &mut conn).await?)
    }

    async fn record_violation(
        &self,
        key: &RateLimitKey,
        window_start: i64,
        window_end: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;
        rate_limits::increment_window_violations(key, window_start, window_end, &mut tx).await?;
        let total =
            rate_limits::increment_reputation_violations(&key.identifier, key.identifier_type, now, &mut tx).await?;
        tx.commit().await?;
        Ok(total)
    }

    async fn fetch_window(
        &self,
        key: &RateLimitKey,
        window_start: i64,
    ) -> Result<Option<RateLimitWindow>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(rate_limits::fetch_window(key, window_start, &mut conn).await?)
    }

    async fn fetch_reputation(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<RateLimitReputation>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(rate_limits::fetch_reputation(identifier, identifier_type, &mut conn).await?)
    }

    async fn set_reputation_flag(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
        tier: Option<ReputationTier>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(rate_limits::set_flag(identifier, identifier_type, tier, now, &mut conn).await?)
    }

    async fn purge_windows(&self, cutoff: i64) -> Result<u64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(rate_limits::purge_windows(cutoff, &mut conn).await?)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `ORDPAY_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn fetch_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(filter, &mut conn).await
    }

    //------------------------------------  Catalog seeding  -------------------------------------------------
    // The catalog is owned by another service in production. These are used by operators' tooling and tests.

    pub async fn add_product(&self, product: NewProduct) -> Result<Product, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_product(&product, &mut conn).await
    }

    pub async fn add_delivery_zone(&self, zone: NewDeliveryZone) -> Result<DeliveryZone, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_delivery_zone(&zone, &mut conn).await
    }

    pub async fn add_geocoded_address(
        &self,
        address: NewGeocodedAddress,
    ) -> Result<GeocodedAddress, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_geocoded_address(&address, &mut conn).await
    }

    pub async fn add_promotion(&self, promotion: NewPromotion) -> Result<Promotion, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        promotions::insert_promotion(&promotion, &mut conn).await
    }

    pub async fn set_promotion_active(&self, id: i64, active: bool) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        promotions::set_promotion_active(id, active, &mut conn).await
    }

    pub async fn update_product_price(&self, id: i64, price: Money) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::update_product_price(id, price, &mut conn).await
    }

    pub async fn update_product_stock(
        &self,
        id: i64,
        stock: Option<i64>,
        active: bool,
    ) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::update_product_stock(id, stock, active, &mut conn).await
    }
}
