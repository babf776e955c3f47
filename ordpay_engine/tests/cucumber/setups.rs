use cucumber::given;
use ordpay_engine::{
    db_types::{NewPromotion, PromotionKind},
    test_utils::fixtures::add_promotion,
    RateLimit,
};

use crate::cucumber::{ordering_world::RestaurantSystem, OrderingWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut OrderingWorld) {
    let system = RestaurantSystem::new(RateLimit::per_hour(30)).await;
    world.system = Some(system);
}

#[given(expr = "a fresh install allowing {int} orders per hour")]
async fn fresh_database_with_limit(world: &mut OrderingWorld, limit: u32) {
    let system = RestaurantSystem::new(RateLimit::per_hour(limit)).await;
    world.system = Some(system);
}

#[given(expr = "a promotion {word} taking {int}% off")]
async fn percentage_promotion(world: &mut OrderingWorld, code: String, percent: i64) {
    let promo = NewPromotion::new(format!("{percent}% off"), PromotionKind::Percentage, percent * 100).with_code(code);
    add_promotion(&world.system().db, promo).await;
}

#[given(expr = "a promotion {word} taking {int} kobo off, usable {int} time(s)")]
async fn capped_promotion(world: &mut OrderingWorld, code: String, amount: i64, limit: i64) {
    let promo =
        NewPromotion::new("Fixed discount", PromotionKind::FixedAmount, amount).with_code(code).with_usage_limit(limit);
    add_promotion(&world.system().db, promo).await;
}

#[given(expr = "an automatic buy {int} get {int} free promotion on {word}")]
async fn bogo_promotion(world: &mut OrderingWorld, buy: i64, get: i64, product: String) {
    let id = world.system().product(&product).id;
    let promo =
        NewPromotion::new("BOGO", PromotionKind::BuyOneGetOne, 0).with_bogo(buy, get).with_products(vec![id]).automatic();
    add_promotion(&world.system().db, promo).await;
}
