//! Fixed-window rate limiting with identifier reputation.
//!
//! Every window is `period` long and aligned to the unix epoch, so `window_start = floor(now / period) * period`.
//! Counters reset with each window; violations accumulate in the reputation table and move the identifier between
//! tiers, which scale the ceiling of every subsequent window.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use ordpay_common::parse_rate_limit;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::RateLimitManagement,
    db_types::{IdentifierType, RateLimitKey, RateLimitReputation, ReputationTier},
    engine_api::errors::RateLimitError,
};

/// `max_requests` per `period`, before reputation scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub period: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self { max_requests, period }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn per_hour(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(3_600))
    }

    /// Parses limits of the form `30/hour`.
    pub fn parse(value: &str) -> Result<Self, RateLimitError> {
        let (max_requests, period) =
            parse_rate_limit(value).ok_or_else(|| RateLimitError::InvalidLimit(value.to_string()))?;
        Ok(Self { max_requests, period })
    }

    fn period_secs(&self) -> i64 {
        self.period.as_secs().max(1) as i64
    }

    /// The `[start, end)` bounds, in unix seconds, of the window containing `now`.
    pub fn window_for(&self, now: DateTime<Utc>) -> (i64, i64) {
        let period = self.period_secs();
        let ts = now.timestamp();
        let start = ts - ts.rem_euclid(period);
        (start, start + period)
    }
}

/// Violation counts at which identifiers are demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationPolicy {
    pub suspicious_after: i64,
    pub blocked_after: i64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self { suspicious_after: 5, blocked_after: 20 }
    }
}

impl ReputationPolicy {
    /// An explicit flag always wins over the violation count.
    pub fn tier_for(&self, reputation: Option<&RateLimitReputation>) -> ReputationTier {
        let Some(rep) = reputation else {
            return ReputationTier::Normal;
        };
        if let Some(tier) = rep.flagged_tier {
            return tier;
        }
        match rep.violation_count {
            n if n >= self.blocked_after => ReputationTier::Blocked,
            n if n >= self.suspicious_after => ReputationTier::Suspicious,
            _ => ReputationTier::Normal,
        }
    }
}

/// The ceiling for a window once the tier has been applied.
pub fn effective_ceiling(max_requests: u32, tier: ReputationTier) -> i64 {
    let base = i64::from(max_requests);
    match tier {
        ReputationTier::Trusted => base * 2,
        ReputationTier::Normal => base,
        ReputationTier::Suspicious => (base / 4).max(1),
        ReputationTier::Blocked => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RateLimitDecision {
    Allowed { remaining: i64, tier: ReputationTier },
    Denied { retry_after: Duration, tier: ReputationTier },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub struct RateLimiter<B> {
    db: B,
    policy: ReputationPolicy,
}

impl<B> Debug for RateLimiter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RateLimiter({:?})", self.policy)
    }
}

impl<B> RateLimiter<B> {
    pub fn new(db: B) -> Self {
        Self { db, policy: ReputationPolicy::default() }
    }

    pub fn with_policy(mut self, policy: ReputationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<B> RateLimiter<B>
where B: RateLimitManagement
{
    pub async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        limit: RateLimit,
    ) -> Result<RateLimitDecision, RateLimitError> {
        self.check_and_increment_at(key, limit, Utc::now()).await
    }

    /// As [`Self::check_and_increment`], with an explicit clock.
    pub async fn check_and_increment_at(
        &self,
        key: &RateLimitKey,
        limit: RateLimit,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let tier = self.reputation_tier(&key.identifier, key.identifier_type).await?;
        let ceiling = effective_ceiling(limit.max_requests, tier);
        let (start, end) = limit.window_for(now);
        if ceiling > 0 {
            if let Some(count) = self.db.try_increment_window(key, start, end, ceiling).await? {
                trace!("🚦️ {key}: request {count}/{ceiling} in window {start}");
                return Ok(RateLimitDecision::Allowed { remaining: ceiling - count, tier });
            }
        }
        let violations = self.db.record_violation(key, start, end, now).await?;
        let retry_after = Duration::from_secs((end - now.timestamp()).max(1) as u64);
        warn!(
            "🚦️ {key} denied ({tier}, ceiling {ceiling}). {violations} violations on record. Retry in {}s",
            retry_after.as_secs()
        );
        Ok(RateLimitDecision::Denied { retry_after, tier })
    }

    pub async fn reputation_tier(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<ReputationTier, RateLimitError> {
        let reputation = self.db.fetch_reputation(identifier, identifier_type).await?;
        Ok(self.policy.tier_for(reputation.as_ref()))
    }

    /// Pins an identifier to a tier, or hands it back to the violation count with `None`.
    pub async fn set_reputation(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
        tier: Option<ReputationTier>,
    ) -> Result<(), RateLimitError> {
        self.db.set_reputation_flag(identifier, identifier_type, tier, Utc::now()).await?;
        match tier {
            Some(t) => info!("🚦️ {identifier_type}:{identifier} flagged as {t}"),
            None => info!("🚦️ Reputation flag cleared for {identifier_type}:{identifier}"),
        }
        Ok(())
    }

    /// Deletes windows that ended before `cutoff`.
    pub async fn purge_windows_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let n = self.db.purge_windows(cutoff.timestamp()).await?;
        debug!("🚦️ Purged {n} expired rate limit windows");
        Ok(n)
    }
}
