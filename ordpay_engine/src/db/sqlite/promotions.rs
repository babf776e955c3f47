use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::PromotionClaim},
    db_types::{NewPromotion, Promotion, PromotionUsage},
};

const PROMOTION_COLUMNS: &str = "id, code, name, kind, value, max_discount, min_order_amount, buy_quantity, \
                                 get_quantity, applicable_product_ids, applicable_categories, is_automatic, is_active, \
                                 starts_at, ends_at, usage_limit, usage_count, per_customer_limit";

pub async fn insert_promotion(
    promotion: &NewPromotion,
    conn: &mut SqliteConnection,
) -> Result<Promotion, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO promotions (code, name, kind, value, max_discount, min_order_amount, buy_quantity, get_quantity, \
         applicable_product_ids, applicable_categories, is_automatic, is_active, starts_at, ends_at, usage_limit, \
         usage_count, per_customer_limit) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?, ?, 0, ?) RETURNING \
         {PROMOTION_COLUMNS}"
    );
    let promotion = sqlx::query_as::<_, Promotion>(&sql)
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(promotion.kind)
        .bind(promotion.value)
        .bind(promotion.max_discount)
        .bind(promotion.min_order_amount)
        .bind(promotion.buy_quantity)
        .bind(promotion.get_quantity)
        .bind(Json(&promotion.applicable_product_ids))
        .bind(Json(&promotion.applicable_categories))
        .bind(promotion.is_automatic)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(promotion.usage_limit)
        .bind(promotion.per_customer_limit)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Promotion #{} ({}) created", promotion.id, promotion.name);
    Ok(promotion)
}

pub async fn set_promotion_active(
    id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE promotions SET is_active = ? WHERE id = ?").bind(active).bind(id).execute(conn).await?;
    Ok(())
}

pub async fn fetch_promotion(id: i64, conn: &mut SqliteConnection) -> Result<Option<Promotion>, SqliteDatabaseError> {
    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = ?");
    let promotion = sqlx::query_as::<_, Promotion>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(promotion)
}

pub async fn fetch_promotion_by_code(
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Promotion>, SqliteDatabaseError> {
    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE code = ? COLLATE NOCASE");
    let promotion = sqlx::query_as::<_, Promotion>(&sql).bind(code.trim()).fetch_optional(conn).await?;
    Ok(promotion)
}

/// Returns the active automatic promotions. The validity window is checked here rather than in SQL so that the
/// comparison happens on real timestamps.
pub async fn fetch_automatic_promotions(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Promotion>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE is_automatic = TRUE AND is_active = TRUE ORDER BY id ASC"
    );
    let promotions = sqlx::query_as::<_, Promotion>(&sql).fetch_all(conn).await?;
    let live = promotions
        .into_iter()
        .filter(|p| p.starts_at.map(|t| t <= now).unwrap_or(true) && p.ends_at.map(|t| now <= t).unwrap_or(true))
        .collect::<Vec<_>>();
    trace!("🗃️ {} automatic promotions are live", live.len());
    Ok(live)
}

/// Increments the usage counter for the promotion, as long as its global cap has not been reached. Returns `false`
/// if the cap would be exceeded. The check and increment are a single statement.
pub async fn increment_usage(promotion_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        "UPDATE promotions SET usage_count = usage_count + 1 WHERE id = ? AND (usage_limit IS NULL OR usage_count < \
         usage_limit)",
    )
    .bind(promotion_id)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn customer_usage_count(
    promotion_id: i64,
    customer_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM promotion_usages WHERE promotion_id = ? AND customer_ref = ?")
            .bind(promotion_id)
            .bind(customer_ref)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

pub async fn insert_usage(
    claim: &PromotionClaim,
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        "INSERT INTO promotion_usages (promotion_id, order_id, customer_ref, discount_amount, created_at) VALUES (?, \
         ?, ?, ?, ?)",
    )
    .bind(claim.promotion_id)
    .bind(order_id)
    .bind(&claim.customer_ref)
    .bind(claim.discount_amount)
    .bind(now)
    .execute(conn)
    .await?;
    trace!("🗃️ Usage of promotion #{} recorded for order #{order_id}", claim.promotion_id);
    Ok(())
}

pub async fn fetch_usages(
    promotion_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PromotionUsage>, SqliteDatabaseError> {
    let usages = sqlx::query_as::<_, PromotionUsage>(
        "SELECT id, promotion_id, order_id, customer_ref, discount_amount, created_at FROM promotion_usages WHERE \
         promotion_id = ? ORDER BY id ASC",
    )
    .bind(promotion_id)
    .fetch_all(conn)
    .await?;
    Ok(usages)
}
