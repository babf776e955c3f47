use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{
        NewOrder,
        NewOrderItem,
        Order,
        OrderItem,
        OrderNumber,
        OrderState,
        OrderStatus,
        PaymentReference,
        PaymentStatus,
    },
};

const ORDER_COLUMNS: &str = "id, order_number, payment_reference, customer_id, guest_session_id, customer_contact, \
                             fulfillment_type, delivery_zone_id, delivery_distance_m, subtotal, tax_amount, \
                             delivery_fee, discount_amount, total_amount, currency, promotion_id, promotion_discount, \
                             status, payment_status, version, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, paid_quantity, free_quantity, unit_price, \
                            vat_rate_bps, vat_amount, discount_amount, total_price";

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut tx` as the connection argument.
///
/// New orders always start in `pending/pending` with version 0.
pub async fn insert_order(
    order: &NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                order_number,
                payment_reference,
                customer_id,
                guest_session_id,
                customer_contact,
                fulfillment_type,
                delivery_zone_id,
                delivery_distance_m,
                subtotal,
                tax_amount,
                delivery_fee,
                discount_amount,
                total_amount,
                currency,
                promotion_id,
                promotion_discount,
                status,
                payment_status,
                version,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id;
        "#,
    )
    .bind(&order.order_number)
    .bind(&order.payment_reference)
    .bind(order.customer.customer_id())
    .bind(order.customer.guest_session_id())
    .bind(&order.customer_contact)
    .bind(order.fulfillment_type)
    .bind(order.delivery_zone_id)
    .bind(order.delivery_distance_m)
    .bind(order.subtotal)
    .bind(order.tax_amount)
    .bind(order.delivery_fee)
    .bind(order.discount_amount)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(order.promotion_id)
    .bind(order.promotion_discount)
    .bind(OrderStatus::Pending)
    .bind(PaymentStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Order {} inserted with id {id}", order.order_number);
    Ok(id)
}

pub async fn insert_order_items(
    order_id: i64,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    if items.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO order_items (order_id, product_id, product_name, quantity, paid_quantity, free_quantity, \
         unit_price, vat_rate_bps, vat_amount, discount_amount, total_price) ",
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(order_id)
            .push_bind(item.product_id)
            .push_bind(&item.product_name)
            .push_bind(item.quantity)
            .push_bind(item.paid_quantity)
            .push_bind(item.free_quantity)
            .push_bind(item.unit_price)
            .push_bind(item.vat_rate_bps)
            .push_bind(item.vat_amount)
            .push_bind(item.discount_amount)
            .push_bind(item.total_price);
    });
    let res = builder.build().execute(conn).await?;
    trace!("🗃️ {} items saved for order #{order_id}", res.rows_affected());
    Ok(())
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    let order = sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_number).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_reference(
    reference: &PaymentReference,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = ?");
    let order = sqlx::query_as::<_, Order>(&sql).bind(reference).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn order_number_exists(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE order_number = ?")
        .bind(order_number)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

pub async fn fetch_order_items(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, SqliteDatabaseError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ? ORDER BY id ASC");
    let items = sqlx::query_as::<_, OrderItem>(&sql).bind(order_id).fetch_all(conn).await?;
    Ok(items)
}

/// Compare-and-swap on the order state. The row is only updated if it is currently in state `from` (and, when
/// `expected_version` is given, still at that version), in which case the version is bumped and the updated order
/// returned. Otherwise `None` is returned and nothing changes.
pub async fn transition_order(
    order_id: i64,
    from: OrderState,
    to: OrderState,
    expected_version: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let version_clause = if expected_version.is_some() { " AND version = ?" } else { "" };
    let sql = format!(
        "UPDATE orders SET status = ?, payment_status = ?, version = version + 1, updated_at = ? WHERE id = ? AND \
         status = ? AND payment_status = ?{version_clause} RETURNING {ORDER_COLUMNS}"
    );
    let mut query = sqlx::query_as::<_, Order>(&sql)
        .bind(to.status)
        .bind(to.payment_status)
        .bind(now)
        .bind(order_id)
        .bind(from.status)
        .bind(from.payment_status);
    if let Some(version) = expected_version {
        query = query.bind(version);
    }
    let order = query.fetch_optional(conn).await?;
    match (&order, expected_version) {
        (Some(o), _) => debug!("🗃️ Order #{order_id} moved from {from} to {to} (version {})", o.version),
        (None, Some(v)) => {
            debug!("🗃️ Order #{order_id} was not in state {from} at version {v}. Transition to {to} skipped.")
        },
        (None, None) => debug!("🗃️ Order #{order_id} was not in state {from}. Transition to {to} skipped."),
    }
    Ok(order)
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    statuses: Vec<OrderStatus>,
    payment_statuses: Vec<PaymentStatus>,
    created_before: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_statuses.push(status);
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.payment_statuses.is_empty() && self.created_before.is_none()
    }
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if !query.payment_statuses.is_empty() {
        where_clause.push("payment_status IN (");
        for (i, status) in query.payment_statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(cutoff) = query.created_before {
        where_clause.push("created_at < ");
        where_clause.push_bind_unseparated(cutoff);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_orders: {:?}", orders.len());
    Ok(orders)
}
