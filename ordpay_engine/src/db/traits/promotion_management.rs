use chrono::{DateTime, Utc};

use crate::{
    db::traits::StorageError,
    db_types::{Promotion, PromotionUsage},
};

/// The promotion usage ledger.
///
/// Reads are used during pricing to check eligibility. The usage counters themselves are only ever incremented inside
/// the payment confirmation transaction (see [`crate::PaymentGatewayDatabase::confirm_payment`]).
#[allow(async_fn_in_trait)]
pub trait PromotionManagement {
    async fn fetch_promotion(&self, id: i64) -> Result<Option<Promotion>, StorageError>;

    /// Codes are matched case-insensitively.
    async fn fetch_promotion_by_code(&self, code: &str) -> Result<Option<Promotion>, StorageError>;

    /// Active automatic promotions whose validity window contains `now`.
    async fn fetch_automatic_promotions(&self, now: DateTime<Utc>) -> Result<Vec<Promotion>, StorageError>;

    /// The number of recorded uses of the promotion by the given customer.
    async fn customer_usage_count(&self, promotion_id: i64, customer_ref: &str) -> Result<i64, StorageError>;

    async fn fetch_promotion_usages(&self, promotion_id: i64) -> Result<Vec<PromotionUsage>, StorageError>;
}
