use log::debug;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{DeliveryZone, GeocodedAddress, Money, NewDeliveryZone, NewGeocodedAddress, NewProduct, Product},
};

const PRODUCT_COLUMNS: &str = "id, name, category, unit_price, vat_rate_bps, is_active, stock_quantity";
const ZONE_COLUMNS: &str = "id, name, base_fee, per_km_fee, free_delivery_threshold, is_active";

pub async fn fetch_products(ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<Product>, SqliteDatabaseError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("));
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    Ok(products)
}

pub async fn fetch_delivery_zone(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryZone>, SqliteDatabaseError> {
    let sql = format!("SELECT {ZONE_COLUMNS} FROM delivery_zones WHERE id = ?");
    let zone = sqlx::query_as::<_, DeliveryZone>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(zone)
}

pub async fn fetch_delivery_distance(
    zone_id: i64,
    address_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, SqliteDatabaseError> {
    let distance = sqlx::query_scalar("SELECT distance_m FROM geocoded_addresses WHERE id = ? AND zone_id = ?")
        .bind(address_id)
        .bind(zone_id)
        .fetch_optional(conn)
        .await?;
    Ok(distance)
}

pub async fn insert_geocoded_address(
    address: &NewGeocodedAddress,
    conn: &mut SqliteConnection,
) -> Result<GeocodedAddress, SqliteDatabaseError> {
    let address = sqlx::query_as::<_, GeocodedAddress>(
        "INSERT INTO geocoded_addresses (zone_id, label, distance_m) VALUES (?, ?, ?) RETURNING id, zone_id, label, \
         distance_m, geocoded_at",
    )
    .bind(address.zone_id)
    .bind(&address.label)
    .bind(address.distance_m)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Address #{} geocoded at {}m in zone #{}", address.id, address.distance_m, address.zone_id);
    Ok(address)
}

pub async fn insert_product(product: &NewProduct, conn: &mut SqliteConnection) -> Result<Product, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO products (name, category, unit_price, vat_rate_bps, is_active, stock_quantity) VALUES (?, ?, ?, \
         ?, ?, ?) RETURNING {PRODUCT_COLUMNS}"
    );
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price)
        .bind(product.vat_rate_bps)
        .bind(product.is_active)
        .bind(product.stock_quantity)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Product #{} ({}) added to the catalog", product.id, product.name);
    Ok(product)
}

pub async fn insert_delivery_zone(
    zone: &NewDeliveryZone,
    conn: &mut SqliteConnection,
) -> Result<DeliveryZone, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO delivery_zones (name, base_fee, per_km_fee, free_delivery_threshold, is_active) VALUES (?, ?, ?, \
         ?, TRUE) RETURNING {ZONE_COLUMNS}"
    );
    let zone = sqlx::query_as::<_, DeliveryZone>(&sql)
        .bind(&zone.name)
        .bind(zone.base_fee)
        .bind(zone.per_km_fee)
        .bind(zone.free_delivery_threshold)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Delivery zone #{} ({}) added", zone.id, zone.name);
    Ok(zone)
}

pub async fn update_product_price(
    id: i64,
    price: Money,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE products SET unit_price = ? WHERE id = ?").bind(price).bind(id).execute(conn).await?;
    Ok(())
}

pub async fn update_product_stock(
    id: i64,
    stock: Option<i64>,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE products SET stock_quantity = ?, is_active = ? WHERE id = ?")
        .bind(stock)
        .bind(active)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
