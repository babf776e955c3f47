//! The pure pricing computation. Nothing in here performs I/O: catalog rows, the delivery zone and the candidate
//! promotions are fetched by [`crate::PricingApi`] and handed in.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{DeliveryZone, FulfillmentType, Money, NewOrderItem, Order, OrderItem, Product, Promotion, PromotionKind},
    pricing::{
        bogo::{allocate_free_units, BogoUnit},
        delivery::delivery_fee,
        AppliedPromotion,
        CartLine,
        Fulfillment,
        PriceBreakdown,
        PricingError,
        PromotionCandidate,
        PromotionSelection,
        MAX_LINE_QUANTITY,
    },
};

/// Authoritative catalog data for a pricing run.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub products: &'a [Product],
    pub zone: Option<&'a DeliveryZone>,
    /// The geocoded distance to the delivery address, when there is one
    pub distance_m: Option<i64>,
    pub now: DateTime<Utc>,
}

/// Prices a cart. See the module documentation of [`crate::pricing`] for the rules.
pub fn compute_price(
    items: &[CartLine],
    fulfillment: &Fulfillment,
    ctx: &PricingContext<'_>,
    promotions: PromotionSelection,
) -> Result<PriceBreakdown, PricingError> {
    let lines = resolve_lines(items, ctx.products)?;
    let delivery = delivery_terms(fulfillment, ctx.zone, ctx.distance_m)?;
    let gross_subtotal = lines
        .iter()
        .try_fold(Money::ZERO, |acc, (p, qty)| p.unit_price.checked_mul(*qty)?.checked_add(acc))
        .ok_or(PricingError::OrderTooLarge)?;
    let baseline = evaluate(&lines, delivery, None)?;

    let chosen = match promotions {
        PromotionSelection::None => None,
        PromotionSelection::Code(code, None) => return Err(PricingError::PromotionNotFound { code }),
        PromotionSelection::Code(code, Some(candidate)) => {
            if let Err(reason) = check_eligibility(&candidate, &lines, gross_subtotal, ctx.now) {
                debug!("🔄️ Promotion code {code} rejected: {reason:?}");
                return Err(reason.into_error(code));
            }
            let outcome = evaluate(&lines, delivery, Some(&candidate.promotion))?;
            if outcome.benefit.is_zero() {
                return Err(PricingError::PromotionIneligible {
                    code,
                    reason: "it does not reduce the price of this order".into(),
                });
            }
            Some((candidate.promotion, outcome))
        },
        PromotionSelection::Automatic(candidates) => {
            best_automatic(candidates, &lines, delivery, gross_subtotal, ctx.now, &baseline)?
        },
    };

    let distance = delivery.map(|(_, distance)| distance);
    let breakdown = match chosen {
        None => baseline.into_breakdown(None, distance),
        Some((promotion, outcome)) => {
            let applied = AppliedPromotion {
                promotion_id: promotion.id,
                code: promotion.code.clone(),
                kind: promotion.kind,
                discount: outcome.benefit,
                per_customer_limit: promotion.per_customer_limit,
            };
            outcome.into_breakdown(Some(applied), distance)
        },
    };
    trace!(
        "🔄️ Priced {} lines: subtotal {}, tax {}, delivery {}, discount {}, total {}",
        breakdown.lines.len(),
        breakdown.subtotal,
        breakdown.tax_amount,
        breakdown.delivery_fee,
        breakdown.discount_amount,
        breakdown.total_amount
    );
    Ok(breakdown)
}

/// Recomputes the expected total of a persisted order from its stored lines, delivery fee and discount, and checks
/// every stored aggregate against the recomputation. The live catalog is not consulted.
pub fn reprice_persisted(order: &Order, items: &[OrderItem]) -> Result<Money, PricingError> {
    let violation = |details: String| PricingError::PriceIntegrityViolation {
        order: order.order_number.to_string(),
        details,
    };
    if items.is_empty() {
        return Err(violation("the order has no items".into()));
    }
    let overflow = || violation("amounts overflow".into());
    let mut subtotal = Money::ZERO;
    let mut tax = Money::ZERO;
    for item in items {
        if item.quantity <= 0 || item.paid_quantity < 0 || item.free_quantity < 0 {
            return Err(violation(format!("item {} has invalid quantities", item.id)));
        }
        if item.paid_quantity.checked_add(item.free_quantity) != Some(item.quantity) {
            return Err(violation(format!("item {} paid and free quantities do not add up", item.id)));
        }
        let discount = item.unit_price.checked_mul(item.free_quantity).ok_or_else(overflow)?;
        if discount != item.discount_amount {
            let msg = format!("item {} discount is {}, expected {discount}", item.id, item.discount_amount);
            return Err(violation(msg));
        }
        let total = line_total(item.unit_price, item.quantity, discount).ok_or_else(overflow)?;
        if total != item.total_price {
            return Err(violation(format!("item {} total is {}, expected {total}", item.id, item.total_price)));
        }
        let vat = line_vat(item.unit_price, item.paid_quantity, item.vat_rate_bps).ok_or_else(overflow)?;
        if vat != item.vat_amount {
            return Err(violation(format!("item {} VAT is {}, expected {vat}", item.id, item.vat_amount)));
        }
        subtotal = subtotal.checked_add(total).ok_or_else(overflow)?;
        tax = tax.checked_add(vat).ok_or_else(overflow)?;
    }
    if subtotal != order.subtotal {
        return Err(violation(format!("subtotal is {}, items add up to {subtotal}", order.subtotal)));
    }
    if tax != order.tax_amount {
        return Err(violation(format!("tax is {}, items add up to {tax}", order.tax_amount)));
    }
    if order.discount_amount.value() < 0 || order.discount_amount > subtotal || order.delivery_fee.value() < 0 {
        return Err(violation("discount or delivery fee is out of range".into()));
    }
    let expected = order_total(subtotal, tax, order.delivery_fee, order.discount_amount).ok_or_else(overflow)?;
    if expected != order.total_amount {
        return Err(violation(format!("total is {}, expected {expected}", order.total_amount)));
    }
    Ok(expected)
}

pub(crate) fn line_vat(unit_price: Money, paid_quantity: i64, vat_rate_bps: i64) -> Option<Money> {
    unit_price.checked_mul(paid_quantity)?.checked_apply_bps(vat_rate_bps)
}

fn line_total(unit_price: Money, quantity: i64, discount: Money) -> Option<Money> {
    unit_price.checked_mul(quantity)?.checked_sub(discount)
}

fn order_total(subtotal: Money, tax: Money, delivery_fee: Money, discount: Money) -> Option<Money> {
    subtotal.checked_add(tax)?.checked_add(delivery_fee)?.checked_sub(discount)
}

//----------------------------------------------   Line resolution  ----------------------------------------------------

/// Validates the cart against the catalog and merges duplicate product lines. The result is ordered by product id.
fn resolve_lines<'p>(items: &[CartLine], products: &'p [Product]) -> Result<Vec<(&'p Product, i64)>, PricingError> {
    if items.is_empty() {
        return Err(PricingError::EmptyCart);
    }
    let mut merged = BTreeMap::<i64, i64>::new();
    for line in items {
        if line.quantity <= 0 || line.quantity > MAX_LINE_QUANTITY {
            return Err(PricingError::InvalidQuantity { product_id: line.product_id, quantity: line.quantity });
        }
        let product = products.iter().find(|p| p.id == line.product_id).ok_or_else(|| {
            PricingError::ProductUnavailable { product_id: line.product_id, reason: "it is not in the catalog".into() }
        })?;
        if let Some(submitted) = line.unit_price_snapshot {
            if submitted != product.unit_price {
                return Err(PricingError::PriceDrift {
                    product_id: product.id,
                    submitted,
                    current: product.unit_price,
                });
            }
        }
        let merged_quantity = merged.entry(line.product_id).or_default();
        *merged_quantity += line.quantity;
        if *merged_quantity > MAX_LINE_QUANTITY {
            return Err(PricingError::InvalidQuantity { product_id: line.product_id, quantity: *merged_quantity });
        }
    }
    merged
        .into_iter()
        .map(|(id, quantity)| {
            // The lookup succeeded above for every id in the map
            let product = products.iter().find(|p| p.id == id).ok_or_else(|| PricingError::ProductUnavailable {
                product_id: id,
                reason: "it is not in the catalog".into(),
            })?;
            if !product.is_active {
                return Err(PricingError::ProductUnavailable { product_id: id, reason: "it is not available".into() });
            }
            if product.stock_quantity.map(|stock| stock < quantity).unwrap_or(false) {
                return Err(PricingError::ProductUnavailable { product_id: id, reason: "insufficient stock".into() });
            }
            Ok((product, quantity))
        })
        .collect()
}

fn delivery_terms<'z>(
    fulfillment: &Fulfillment,
    zone: Option<&'z DeliveryZone>,
    distance_m: Option<i64>,
) -> Result<Option<(&'z DeliveryZone, i64)>, PricingError> {
    if fulfillment.kind != FulfillmentType::Delivery {
        return Ok(None);
    }
    let zone_id = fulfillment.zone_id.ok_or(PricingError::DeliveryZoneRequired)?;
    let zone = zone.filter(|z| z.id == zone_id && z.is_active).ok_or(PricingError::UnknownDeliveryZone(zone_id))?;
    let address_id = fulfillment.address_id.ok_or(PricingError::DeliveryAddressRequired)?;
    let distance = distance_m.ok_or(PricingError::UnknownDeliveryAddress(address_id))?;
    if distance < 0 {
        return Err(PricingError::InvalidDistance(distance));
    }
    Ok(Some((zone, distance)))
}

//----------------------------------------------     Promotions     ----------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Ineligible {
    Inactive,
    NotStarted,
    Expired,
    UsageLimitReached,
    CustomerLimitReached,
    BelowMinimum(Money),
    NoApplicableItems,
    Misconfigured,
}

impl Ineligible {
    fn into_error(self, code: String) -> PricingError {
        let reason = match self {
            Self::Expired => return PricingError::PromotionExpired { code },
            Self::UsageLimitReached | Self::CustomerLimitReached => {
                return PricingError::PromotionLimitReached { code }
            },
            Self::Inactive => "it is not active".to_string(),
            Self::NotStarted => "it has not started yet".to_string(),
            Self::BelowMinimum(min) => format!("the order must be at least {min}"),
            Self::NoApplicableItems => "none of the items in your cart qualify".to_string(),
            Self::Misconfigured => "it is not configured correctly".to_string(),
        };
        PricingError::PromotionIneligible { code, reason }
    }
}

fn check_eligibility(
    candidate: &PromotionCandidate,
    lines: &[(&Product, i64)],
    gross_subtotal: Money,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    let promo = &candidate.promotion;
    if !promo.is_active {
        return Err(Ineligible::Inactive);
    }
    if promo.starts_at.map(|t| now < t).unwrap_or(false) {
        return Err(Ineligible::NotStarted);
    }
    if promo.ends_at.map(|t| now >= t).unwrap_or(false) {
        return Err(Ineligible::Expired);
    }
    if promo.usage_limit.map(|limit| promo.usage_count >= limit).unwrap_or(false) {
        return Err(Ineligible::UsageLimitReached);
    }
    if promo.per_customer_limit.map(|limit| candidate.customer_uses >= limit).unwrap_or(false) {
        return Err(Ineligible::CustomerLimitReached);
    }
    if let Some(min) = promo.min_order_amount {
        if gross_subtotal < min {
            return Err(Ineligible::BelowMinimum(min));
        }
    }
    if !lines.iter().any(|(p, _)| promo.applies_to(p)) {
        return Err(Ineligible::NoApplicableItems);
    }
    let misconfigured = match promo.kind {
        PromotionKind::Percentage | PromotionKind::FixedAmount => promo.value <= 0,
        PromotionKind::BuyOneGetOne => {
            promo.buy_quantity.map(|b| b <= 0).unwrap_or(true) || promo.get_quantity.map(|g| g <= 0).unwrap_or(true)
        },
        PromotionKind::FreeDelivery => false,
    };
    if misconfigured {
        return Err(Ineligible::Misconfigured);
    }
    Ok(())
}

/// Picks the eligible automatic promotion that lowers the total the most. Ties go to the lowest id.
fn best_automatic(
    candidates: Vec<PromotionCandidate>,
    lines: &[(&Product, i64)],
    delivery: Option<(&DeliveryZone, i64)>,
    gross_subtotal: Money,
    now: DateTime<Utc>,
    baseline: &Outcome,
) -> Result<Option<(Promotion, Outcome)>, PricingError> {
    let mut best: Option<(Promotion, Outcome, Money)> = None;
    for candidate in candidates {
        if let Err(reason) = check_eligibility(&candidate, lines, gross_subtotal, now) {
            trace!("🔄️ Automatic promotion #{} skipped: {reason:?}", candidate.promotion.id);
            continue;
        }
        let outcome = evaluate(lines, delivery, Some(&candidate.promotion))?;
        if outcome.benefit.is_zero() {
            continue;
        }
        let saving = baseline.total - outcome.total;
        let better = match &best {
            None => true,
            Some((current, _, current_saving)) => {
                saving > *current_saving || (saving == *current_saving && candidate.promotion.id < current.id)
            },
        };
        if better {
            best = Some((candidate.promotion, outcome, saving));
        }
    }
    Ok(best.map(|(promotion, outcome, _)| (promotion, outcome)))
}

//----------------------------------------------     Evaluation     ----------------------------------------------------

#[derive(Debug, Clone)]
struct Outcome {
    lines: Vec<NewOrderItem>,
    subtotal: Money,
    tax: Money,
    delivery_fee: Money,
    discount: Money,
    total: Money,
    benefit: Money,
}

impl Outcome {
    fn into_breakdown(self, promotion: Option<AppliedPromotion>, distance_m: Option<i64>) -> PriceBreakdown {
        PriceBreakdown {
            lines: self.lines,
            subtotal: self.subtotal,
            tax_amount: self.tax,
            delivery_fee: self.delivery_fee,
            delivery_distance_m: distance_m,
            discount_amount: self.discount,
            total_amount: self.total,
            promotion,
        }
    }
}

/// Prices the resolved lines under one promotion (or none). Quantities are bounded by [`resolve_lines`]; amounts
/// that still overflow are reported as [`PricingError::OrderTooLarge`].
fn evaluate(
    lines: &[(&Product, i64)],
    delivery: Option<(&DeliveryZone, i64)>,
    promotion: Option<&Promotion>,
) -> Result<Outcome, PricingError> {
    let applies = |p: &Product| promotion.map(|promo| promo.applies_to(p)).unwrap_or(false);

    let free_units = match promotion {
        Some(promo) if promo.kind == PromotionKind::BuyOneGetOne => {
            let units = lines
                .iter()
                .filter(|(p, _)| applies(p))
                .map(|(p, qty)| BogoUnit { product_id: p.id, unit_price: p.unit_price, quantity: *qty })
                .collect::<Vec<_>>();
            allocate_free_units(&units, promo.buy_quantity.unwrap_or(0), promo.get_quantity.unwrap_or(0))
        },
        _ => vec![],
    };

    let items = lines
        .iter()
        .map(|(product, quantity)| {
            let free = free_units.iter().find(|(id, _)| *id == product.id).map(|(_, f)| *f).unwrap_or(0);
            let paid = quantity - free;
            let discount = product.unit_price.checked_mul(free).ok_or(PricingError::OrderTooLarge)?;
            Ok(NewOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: *quantity,
                paid_quantity: paid,
                free_quantity: free,
                unit_price: product.unit_price,
                vat_rate_bps: product.vat_rate_bps,
                vat_amount: line_vat(product.unit_price, paid, product.vat_rate_bps)
                    .ok_or(PricingError::OrderTooLarge)?,
                discount_amount: discount,
                total_price: line_total(product.unit_price, *quantity, discount).ok_or(PricingError::OrderTooLarge)?,
            })
        })
        .collect::<Result<Vec<_>, PricingError>>()?;

    let sum = |amounts: Vec<Money>| Money::checked_sum(amounts).ok_or(PricingError::OrderTooLarge);
    let subtotal = sum(items.iter().map(|i| i.total_price).collect())?;
    let tax = sum(items.iter().map(|i| i.vat_amount).collect())?;
    let item_discounts = sum(items.iter().map(|i| i.discount_amount).collect())?;
    let mut fee = match delivery {
        Some((zone, distance)) => delivery_fee(zone, distance, subtotal)?,
        None => Money::ZERO,
    };

    let applicable_subtotal = sum(
        items.iter().zip(lines.iter()).filter(|(_, (p, _))| applies(p)).map(|(item, _)| item.total_price).collect(),
    )?;
    let mut waived = Money::ZERO;
    let discount = match promotion {
        Some(promo) if promo.kind == PromotionKind::Percentage => {
            let raw = applicable_subtotal.checked_apply_bps(promo.value).ok_or(PricingError::OrderTooLarge)?;
            let capped = promo.max_discount.map(|cap| raw.min(cap)).unwrap_or(raw);
            capped.min(applicable_subtotal)
        },
        Some(promo) if promo.kind == PromotionKind::FixedAmount => Money::from(promo.value).min(applicable_subtotal),
        Some(promo) if promo.kind == PromotionKind::FreeDelivery => {
            waived = fee;
            fee = Money::ZERO;
            Money::ZERO
        },
        _ => Money::ZERO,
    };

    Ok(Outcome {
        lines: items,
        subtotal,
        tax,
        delivery_fee: fee,
        discount,
        total: order_total(subtotal, tax, fee, discount).ok_or(PricingError::OrderTooLarge)?,
        benefit: sum(vec![item_discounts, discount, waived])?,
    })
}
