use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db::traits::{CatalogManagement, GeocodingManagement, PromotionManagement},
    db_types::{CustomerIdentity, FulfillmentType, Promotion},
    engine_api::errors::PricingApiError,
    pricing::{compute_price, PriceBreakdown, PricingContext, PricingRequest, PromotionCandidate, PromotionSelection},
};

/// Loads the catalog and promotion data a cart needs and runs it through [`compute_price`].
pub struct PricingApi<B> {
    db: B,
}

impl<B> Debug for PricingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PricingApi")
    }
}

impl<B> PricingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PricingApi<B>
where B: CatalogManagement + GeocodingManagement + PromotionManagement
{
    pub async fn price(&self, request: &PricingRequest) -> Result<PriceBreakdown, PricingApiError> {
        let now = Utc::now();
        let mut ids = request.items.iter().map(|l| l.product_id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        let products = self.db.fetch_products(&ids).await?;
        let zone = match (request.fulfillment.kind, request.fulfillment.zone_id) {
            (FulfillmentType::Delivery, Some(id)) => self.db.fetch_delivery_zone(id).await?,
            _ => None,
        };
        let distance_m = self.delivery_distance(request).await?;
        let selection = self.promotion_selection(request, now).await?;
        let ctx = PricingContext { products: &products, zone: zone.as_ref(), distance_m, now };
        let breakdown = compute_price(&request.items, &request.fulfillment, &ctx, selection)?;
        Ok(breakdown)
    }

    async fn delivery_distance(&self, request: &PricingRequest) -> Result<Option<i64>, PricingApiError> {
        let fulfillment = &request.fulfillment;
        let (FulfillmentType::Delivery, Some(zone_id), Some(address_id)) =
            (fulfillment.kind, fulfillment.zone_id, fulfillment.address_id)
        else {
            return Ok(None);
        };
        let distance = self.db.fetch_delivery_distance(zone_id, address_id).await?;
        if distance.is_none() {
            debug!("🔄️ Address #{address_id} has not been geocoded for zone #{zone_id}");
        }
        Ok(distance)
    }

    async fn promotion_selection(
        &self,
        request: &PricingRequest,
        now: chrono::DateTime<Utc>,
    ) -> Result<PromotionSelection, PricingApiError> {
        let code = request.promotion_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if let Some(code) = code {
            let candidate = match self.db.fetch_promotion_by_code(code).await? {
                Some(p) => Some(self.candidate(p, request.customer.as_ref()).await?),
                None => {
                    debug!("🔄️ Unknown promotion code {code}");
                    None
                },
            };
            return Ok(PromotionSelection::Code(code.to_string(), candidate));
        }
        let automatic = self.db.fetch_automatic_promotions(now).await?;
        if automatic.is_empty() {
            return Ok(PromotionSelection::None);
        }
        let mut candidates = Vec::with_capacity(automatic.len());
        for promotion in automatic {
            candidates.push(self.candidate(promotion, request.customer.as_ref()).await?);
        }
        Ok(PromotionSelection::Automatic(candidates))
    }

    async fn candidate(
        &self,
        promotion: Promotion,
        customer: Option<&CustomerIdentity>,
    ) -> Result<PromotionCandidate, PricingApiError> {
        let uses = match (promotion.per_customer_limit, customer) {
            (Some(_), Some(c)) => self.db.customer_usage_count(promotion.id, &c.usage_key()).await?,
            _ => 0,
        };
        Ok(PromotionCandidate::new(promotion, uses))
    }
}
