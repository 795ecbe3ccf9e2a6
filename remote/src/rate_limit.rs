use crate::config::GitHubConfig;
use crate::provider::{RemoteError, RemoteResult};
use std::collections::BTreeMap;
use std::time::Duration;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota snapshot carried by every API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: Option<u64>,
    pub remaining: u64,
    /// Unix epoch seconds.
    pub reset_at: Option<i64>,
}

impl RateLimitStatus {
    /// `None` when the response carries no parseable remaining-quota header.
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Option<Self> {
        let remaining = headers.get(REMAINING_HEADER)?.trim().parse().ok()?;
        let limit = headers
            .get(LIMIT_HEADER)
            .and_then(|v| v.trim().parse().ok());
        let reset_at = headers
            .get(RESET_HEADER)
            .and_then(|v| v.trim().parse().ok());

        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Time until the quota resets, plus `margin`. Never negative.
    pub fn wait_duration(&self, now_unix: i64, margin: Duration) -> Duration {
        let until_reset = self
            .reset_at
            .map(|reset| reset.saturating_sub(now_unix).max(0) as u64)
            .unwrap_or(0);
        Duration::from_secs(until_reset) + margin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Proceed,
    /// Quota is running low; the response is still usable.
    Low { remaining: u64 },
    /// Quota is used up; sleep this long and repeat the request once.
    WaitAndRetry(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub wait_for_reset: bool,
    pub safety_margin: Duration,
    pub low_threshold: u64,
}

impl QuotaPolicy {
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            wait_for_reset: config.wait_for_rate_limit_reset,
            safety_margin: config.rate_limit_safety_margin,
            low_threshold: config.low_quota_threshold,
        }
    }

    pub fn evaluate(
        &self,
        status: Option<&RateLimitStatus>,
        now_unix: i64,
    ) -> RemoteResult<QuotaDecision> {
        let Some(status) = status else {
            return Ok(QuotaDecision::Proceed);
        };

        if status.is_exhausted() {
            if self.wait_for_reset {
                return Ok(QuotaDecision::WaitAndRetry(
                    status.wait_duration(now_unix, self.safety_margin),
                ));
            }
            return Err(RemoteError::QuotaExceeded {
                limit: status.limit.unwrap_or(0),
                reset_at: status.reset_at.unwrap_or(now_unix),
            });
        }

        if status.remaining < self.low_threshold {
            return Ok(QuotaDecision::Low {
                remaining: status.remaining,
            });
        }

        Ok(QuotaDecision::Proceed)
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::from_config(&GitHubConfig::default())
    }
}
