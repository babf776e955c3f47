use chrono::{DateTime, Utc};

use crate::{
    db::traits::StorageError,
    db_types::{IdentifierType, RateLimitKey, RateLimitReputation, RateLimitWindow, ReputationTier},
};

/// Storage for fixed-window rate-limit counters and the reputation of the identifiers being limited.
#[allow(async_fn_in_trait)]
pub trait RateLimitManagement {
    /// Atomically increments the request counter for the window, but only if it is below `ceiling`.
    ///
    /// Returns the new count if the request was admitted, or `None` if the ceiling had already been reached. The
    /// check and the increment are a single statement, so concurrent callers can never push the count past `ceiling`.
    async fn try_increment_window(
        &self,
        key: &RateLimitKey,
        window_start: i64,
        window_end: i64,
        ceiling: i64,
    ) -> Result<Option<i64>, StorageError>;

    /// Records a denied request against the window and the identifier's cumulative reputation. Returns the updated
    /// cumulative violation count.
    async fn record_violation(
        &self,
        key: &RateLimitKey,
        window_start: i64,
        window_end: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StorageError>;

    async fn fetch_window(&self, key: &RateLimitKey, window_start: i64)
        -> Result<Option<RateLimitWindow>, StorageError>;

    async fn fetch_reputation(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<RateLimitReputation>, StorageError>;

    /// Sets (or clears, with `None`) an explicit reputation tier that overrides the violation-derived one.
    async fn set_reputation_flag(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
        tier: Option<ReputationTier>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Deletes windows that ended before `cutoff` (unix seconds). Reputation is retained.
    async fn purge_windows(&self, cutoff: i64) -> Result<u64, StorageError>;
}
