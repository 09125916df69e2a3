//! Fixed-window rate limiting keyed by client identity.
//!
//! Each key gets a counter and the instant its window started. When the window
//! has elapsed the next request starts a fresh window with a count of one.
//! Stale windows are purged on every check so memory stays bounded by the
//! number of recently active clients.

use crate::errors::RateLimitExceeded;
use crate::metrics_defs::RATE_LIMIT_REJECTED;
use dashmap::DashMap;
use shared::counter;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// Outcome of an admission check, including the quota metadata exposed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Seconds until reset, rounded up so clients never retry too early.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

pub struct RateLimiter {
    name: &'static str,
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: u32, window: Duration) -> Self {
        RateLimiter {
            name,
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Admits or rejects a request from `key`.
    pub fn admit(&self, key: &str) -> Result<RateLimitDecision, RateLimitExceeded> {
        self.admit_at(key, Instant::now())
    }

    pub fn admit_at(&self, key: &str, now: Instant) -> Result<RateLimitDecision, RateLimitExceeded> {
        let decision = self.check_at(key, now);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(RateLimitExceeded {
                limit: decision.limit,
                retry_after_secs: decision.reset_secs(),
            })
        }
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        self.purge_expired(now);

        // The entry guard holds the shard lock, so the read-modify-write below
        // is atomic per key.
        let mut window = self.windows.entry(key.to_string()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        if window.count == 0 || now.duration_since(window.window_start) >= self.window {
            *window = RateWindow {
                count: 1,
                window_start: now,
            };
        } else {
            window.count = window.count.saturating_add(1);
        }

        let count = window.count;
        let reset_after = window
            .window_start
            .checked_add(self.window)
            .map_or(self.window, |end| end.saturating_duration_since(now));
        drop(window);

        let allowed = count <= self.max_requests;
        if !allowed {
            counter!(RATE_LIMIT_REJECTED).increment(1);
            tracing::debug!(limiter = self.name, key, count, "Rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_after,
        }
    }

    fn purge_expired(&self, now: Instant) {
        self.windows
            .retain(|_, window| now.duration_since(window.window_start) < self.window);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
