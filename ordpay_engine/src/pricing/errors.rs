use thiserror::Error;

use crate::{db_types::Money, pricing::MAX_LINE_QUANTITY};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Product {product_id} has an invalid quantity: {quantity}")]
    InvalidQuantity { product_id: i64, quantity: i64 },
    #[error("Product {product_id} is unavailable: {reason}")]
    ProductUnavailable { product_id: i64, reason: String },
    #[error("The price of product {product_id} has changed from {submitted} to {current}")]
    PriceDrift { product_id: i64, submitted: Money, current: Money },
    #[error("A delivery zone is required for delivery orders")]
    DeliveryZoneRequired,
    #[error("Delivery zone {0} does not exist or is not active")]
    UnknownDeliveryZone(i64),
    #[error("A geocoded delivery address is required for delivery orders")]
    DeliveryAddressRequired,
    #[error("Delivery address {0} has not been geocoded for this zone")]
    UnknownDeliveryAddress(i64),
    #[error("Invalid delivery distance: {0}m")]
    InvalidDistance(i64),
    #[error("The order amount is too large to be represented")]
    OrderTooLarge,
    #[error("Promotion {code} does not exist")]
    PromotionNotFound { code: String },
    #[error("Promotion {code} cannot be applied to this order: {reason}")]
    PromotionIneligible { code: String, reason: String },
    #[error("Promotion {code} has expired")]
    PromotionExpired { code: String },
    #[error("Promotion {code} has reached its usage limit")]
    PromotionLimitReached { code: String },
    #[error("Stored price data for order {order} is inconsistent: {details}")]
    PriceIntegrityViolation { order: String, details: String },
}

impl PricingError {
    /// A stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "EMPTY_CART",
            Self::InvalidQuantity { .. } => "INVALID_QUANTITY",
            Self::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            Self::PriceDrift { .. } => "PRICE_DRIFT",
            Self::DeliveryZoneRequired => "DELIVERY_ZONE_REQUIRED",
            Self::UnknownDeliveryZone(_) => "UNKNOWN_DELIVERY_ZONE",
            Self::DeliveryAddressRequired => "DELIVERY_ADDRESS_REQUIRED",
            Self::UnknownDeliveryAddress(_) => "UNKNOWN_DELIVERY_ADDRESS",
            Self::InvalidDistance(_) => "INVALID_DISTANCE",
            Self::OrderTooLarge => "ORDER_TOO_LARGE",
            Self::PromotionNotFound { .. } | Self::PromotionIneligible { .. } => "PROMOTION_INELIGIBLE",
            Self::PromotionExpired { .. } => "PROMOTION_EXPIRED",
            Self::PromotionLimitReached { .. } => "PROMOTION_LIMIT_REACHED",
            Self::PriceIntegrityViolation { .. } => "PRICE_INTEGRITY_VIOLATION",
        }
    }

    /// A message that can be shown to the customer as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty".into(),
            Self::InvalidQuantity { .. } => format!("Item quantities must be between 1 and {MAX_LINE_QUANTITY}"),
            Self::ProductUnavailable { .. } => "One or more items are out of stock or no longer available".into(),
            Self::PriceDrift { .. } => {
                "Prices have changed since you added items to your cart. Please review it.".into()
            },
            Self::DeliveryZoneRequired => "Please choose a delivery area".into(),
            Self::DeliveryAddressRequired => "Please choose a delivery address".into(),
            Self::UnknownDeliveryZone(_) | Self::UnknownDeliveryAddress(_) | Self::InvalidDistance(_) => {
                "We do not deliver to this address".into()
            },
            Self::OrderTooLarge => "This order is too large. Please split it into smaller orders.".into(),
            Self::PromotionNotFound { .. } => "This promotion code is not valid".into(),
            Self::PromotionIneligible { reason, .. } => format!("This promotion cannot be applied: {reason}"),
            Self::PromotionExpired { .. } => "This promotion has expired".into(),
            Self::PromotionLimitReached { .. } => "This promotion is no longer available".into(),
            Self::PriceIntegrityViolation { .. } => {
                "Something went wrong with this order. Please contact support.".into()
            },
        }
    }
}
