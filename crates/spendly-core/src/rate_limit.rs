//! Per-identity daily message quota
//!
//! Records live only in process memory. Losing them on restart just resets
//! everyone's quota, so nothing here is persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quota settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_messages: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            window: Duration::hours(24),
        }
    }
}

/// Why a message was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    DailyLimitExceeded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyLimitExceeded => "daily_limit_exceeded",
        }
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub current_count: u32,
    pub limit: u32,
    pub blocked_reason: Option<BlockReason>,
    /// Time until the window resets, set when blocked
    pub reset_in: Option<Duration>,
}

#[derive(Debug, Clone)]
struct RateLimitRecord {
    count: u32,
    window_start: DateTime<Utc>,
    blocked: bool,
}

impl RateLimitRecord {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked: false,
        }
    }
}

/// Fixed-window message counter keyed by identity
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Admit or reject one message from `identity`
    pub fn check(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let limit = self.config.max_messages;
        // A poisoned map only ever holds counters; keep using it
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let record = records
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitRecord::fresh(now));

        if now - record.window_start >= self.config.window {
            *record = RateLimitRecord::fresh(now);
        }

        let reset_in = (record.window_start + self.config.window - now).max(Duration::zero());

        if record.blocked || record.count >= limit {
            record.blocked = true;
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                current_count: record.count,
                limit,
                blocked_reason: Some(BlockReason::DailyLimitExceeded),
                reset_in: Some(reset_in),
            };
        }

        record.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - record.count,
            current_count: record.count,
            limit,
            blocked_reason: None,
            reset_in: None,
        }
    }

    /// Drop records whose window has lapsed, returning how many went
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = records.len();
        records.retain(|_, record| now - record.window_start < self.config.window);
        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, "Swept stale rate limit records");
        }
        removed
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .map(|records| records.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_counts_down_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = start();

        for n in 1..=10 {
            let decision = limiter.check("+15550001", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 10 - n);
            assert_eq!(decision.current_count, n);
        }

        let decision = limiter.check("+15550001", now + Duration::minutes(5));
        assert!(!decision.allowed);
        assert_eq!(decision.blocked_reason, Some(BlockReason::DailyLimitExceeded));
        assert_eq!(decision.reset_in, Some(Duration::hours(24) - Duration::minutes(5)));

        // Other identities are unaffected
        assert!(limiter.check("+15550002", now).allowed);
    }

    #[test]
    fn test_window_elapsing_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_messages: 2,
            window: Duration::hours(24),
        });
        let now = start();
        limiter.check("a", now);
        limiter.check("a", now);
        assert!(!limiter.check("a", now).allowed);

        let later = now + Duration::hours(24);
        let decision = limiter.check("a", later);
        assert!(decision.allowed);
        assert_eq!(decision.current_count, 1);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_sweep_removes_stale_records() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = start();
        limiter.check("old", now);
        limiter.check("new", now + Duration::hours(20));
        assert_eq!(limiter.len(), 2);

        let removed = limiter.sweep(now + Duration::hours(25));
        assert_eq!(removed, 1);
        assert_eq!(limiter.len(), 1);

        // A swept identity comes back with a fresh window
        let decision = limiter.check("old", now + Duration::hours(25));
        assert_eq!(decision.remaining, 9);
    }

    #[test]
    fn test_block_reason_string() {
        assert_eq!(BlockReason::DailyLimitExceeded.as_str(), "daily_limit_exceeded");
    }
}
