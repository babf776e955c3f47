use std::time::Duration;

use thiserror::Error;

use crate::{
    db::traits::StorageError,
    db_types::OrderState,
    pricing::PricingError,
    provider::ProviderError,
};

#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    #[error("Rate limit storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid rate limit: {0}")]
    InvalidLimit(String),
}

#[derive(Debug, Clone, Error)]
pub enum PricingApiError {
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("Could not load pricing data. {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Too many requests. Retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),
    #[error("The idempotency key {0} was already used for a different request")]
    IdempotencyConflict(String),
    #[error("Could not generate a unique order number after {0} attempts")]
    OrderNumberExhausted(usize),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("Order {order} cannot move out of state {state}")]
    InvalidTransition { order: String, state: OrderState },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Rate limiter error: {0}")]
    RateLimiter(#[from] RateLimitError),
}

impl From<PricingApiError> for OrderFlowError {
    fn from(e: PricingApiError) -> Self {
        match e {
            PricingApiError::Pricing(e) => Self::Pricing(e),
            PricingApiError::Storage(e) => Self::Storage(e),
        }
    }
}

impl OrderFlowError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Pricing(e) => e.code(),
            Self::InvalidIdempotencyKey(_) => "INVALID_IDEMPOTENCY_KEY",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::OrderNumberExhausted(_) => "ORDER_NUMBER_EXHAUSTED",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::Storage(_) | Self::RateLimiter(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the client may repeat the same request later and expect a different result.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::OrderNumberExhausted(_) => true,
            Self::Storage(e) | Self::RateLimiter(RateLimitError::Storage(e)) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("No order carries the payment reference {0}")]
    OrderNotFound(String),
    #[error("Too many requests. Retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Order {0} kept changing while the payment was being applied")]
    Conflict(String),
    #[error("Rate limiter error: {0}")]
    RateLimiter(#[from] RateLimitError),
}

impl ReconciliationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Provider(e) if e.is_transient() => "PAYMENT_VERIFICATION_UNAVAILABLE",
            Self::Provider(ProviderError::UnknownTransaction(_)) => "PAYMENT_NOT_FOUND",
            Self::Provider(_) => "PAYMENT_VERIFICATION_FAILED",
            Self::Storage(_) | Self::Conflict(_) => "PAYMENT_VERIFICATION_UNAVAILABLE",
            Self::RateLimiter(_) => "INTERNAL_ERROR",
        }
    }

    /// Transient failures: nothing was written, and the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Conflict(_) => true,
            Self::Provider(e) => e.is_transient(),
            Self::Storage(e) | Self::RateLimiter(RateLimitError::Storage(e)) => e.is_transient(),
            Self::OrderNotFound(_) | Self::RateLimiter(_) => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_and_retryability() {
        let e = OrderFlowError::from(PricingApiError::Pricing(PricingError::EmptyCart));
        assert_eq!(e.code(), "EMPTY_CART");
        assert!(!e.is_retryable());
        let e = OrderFlowError::Storage(StorageError::Busy("locked".into()));
        assert!(e.is_retryable());
        let e = ReconciliationError::Provider(ProviderError::Timeout);
        assert_eq!(e.code(), "PAYMENT_VERIFICATION_UNAVAILABLE");
        assert!(e.is_retryable());
        let e = ReconciliationError::Provider(ProviderError::UnknownTransaction("PAY-1".into()));
        assert!(!e.is_retryable());
        assert_eq!(e.code(), "PAYMENT_NOT_FOUND");
    }
}
