//! # Pricing
//!
//! Computes the authoritative price of an order. Unit prices, VAT rates, availability and stock always come from the
//! catalog; a price the client submits is only compared against it.
//!
//! All amounts are integer minor units and rates are basis points.
//!
//! * VAT is charged per line on the paid units: `round(unit_price * paid_quantity * vat_rate)`, half away from zero.
//!   It is computed before any order-level discount.
//! * Exactly one promotion applies to an order. A customer-supplied code takes precedence and must be eligible,
//!   otherwise pricing fails. Without a code, the eligible automatic promotion that saves the most applies.
//! * Buy-X-get-Y promotions make the cheapest qualifying units free. Each line records its paid and free units.
//! * Percentage and fixed-amount promotions produce an order-level discount that never exceeds the subtotal of the
//!   items they apply to.
//! * The delivery fee is `base_fee + round(per_km_fee * distance / 1km)`, waived once the item subtotal reaches the
//!   zone's threshold. A free-delivery promotion waives it regardless. The distance is the one the geocoding service
//!   recorded for the delivery address, never a number from the client.
//! * A product line holds at most [`MAX_LINE_QUANTITY`] units, and every amount is computed with checked arithmetic.
//!
//! `total_amount == subtotal + tax_amount + delivery_fee - discount_amount` always holds for a
//! [`PriceBreakdown`]. [`reprice_persisted`] verifies the same identity for a stored order.
mod bogo;
mod delivery;
mod engine;
mod errors;
mod objects;

/// The most units of a single product one order may contain.
pub const MAX_LINE_QUANTITY: i64 = 1_000;

pub use bogo::{allocate_free_units, free_unit_count, BogoUnit};
pub use delivery::delivery_fee;
pub use engine::{compute_price, reprice_persisted, PricingContext};
pub use errors::PricingError;
pub use objects::{
    AppliedPromotion,
    CartLine,
    Fulfillment,
    PriceBreakdown,
    PricingRequest,
    PromotionCandidate,
    PromotionSelection,
};
