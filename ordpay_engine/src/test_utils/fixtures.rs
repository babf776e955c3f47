//! A small restaurant catalog for tests. Prices are in kobo and VAT is 7.5%.
use crate::{
    db_types::{
        DeliveryZone,
        GeocodedAddress,
        Money,
        NewDeliveryZone,
        NewGeocodedAddress,
        NewProduct,
        NewPromotion,
        Product,
        Promotion,
    },
    SqliteDatabase,
};

pub const VAT_BPS: i64 = 750;

#[derive(Debug, Clone)]
pub struct Catalog {
    /// ₦2,500.00, untracked stock
    pub jollof: Product,
    /// ₦1,800.00, 50 in stock
    pub chicken: Product,
    /// ₦800.00
    pub chapman: Product,
    /// Out of stock
    pub suya: Product,
    /// Withdrawn from the menu
    pub moi_moi: Product,
    /// ₦500.00 + ₦100.00/km, free from ₦20,000.00
    pub zone: DeliveryZone,
    /// 3.5km from the Lekki kitchen
    pub address: GeocodedAddress,
}

pub fn product(name: &str, category: &str, price: i64, stock: Option<i64>) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        category: Some(category.to_string()),
        unit_price: Money::from(price),
        vat_rate_bps: VAT_BPS,
        is_active: true,
        stock_quantity: stock,
    }
}

pub async fn seed_catalog(db: &SqliteDatabase) -> Catalog {
    let jollof = db.add_product(product("Jollof Rice", "mains", 250_000, None)).await.expect("jollof");
    let chicken = db.add_product(product("Grilled Chicken", "mains", 180_000, Some(50))).await.expect("chicken");
    let chapman = db.add_product(product("Chapman", "drinks", 80_000, None)).await.expect("chapman");
    let suya = db.add_product(product("Suya Platter", "mains", 320_000, Some(0))).await.expect("suya");
    let moi_moi = db
        .add_product(NewProduct { is_active: false, ..product("Moi Moi", "sides", 60_000, None) })
        .await
        .expect("moi moi");
    let zone = db
        .add_delivery_zone(NewDeliveryZone {
            name: "Lekki".to_string(),
            base_fee: Money::from(50_000),
            per_km_fee: Money::from(10_000),
            free_delivery_threshold: Some(Money::from(2_000_000)),
        })
        .await
        .expect("zone");
    let address = geocode(db, zone.id, "12 Admiralty Way", 3_500).await;
    Catalog { jollof, chicken, chapman, suya, moi_moi, zone, address }
}

pub async fn add_promotion(db: &SqliteDatabase, promotion: NewPromotion) -> Promotion {
    db.add_promotion(promotion).await.expect("Error adding promotion")
}

pub async fn geocode(db: &SqliteDatabase, zone_id: i64, label: &str, distance_m: i64) -> GeocodedAddress {
    let address = NewGeocodedAddress { zone_id, label: label.to_string(), distance_m };
    db.add_geocoded_address(address).await.expect("Error geocoding address")
}
