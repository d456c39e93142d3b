//! Per-user request rate limiting
//!
//! Sliding-window limiter guarding the settlement entry point. Shared-state
//! map with per-user timestamp lists; stale entries are pruned on access.

use crate::config::RateLimitConfig;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ledger_core::UserId;
use std::sync::Arc;

/// Per-user request window
struct UserWindow {
    requests: Vec<DateTime<Utc>>,
}

impl UserWindow {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    fn cleanup(&mut self, window_start: DateTime<Utc>) {
        self.requests.retain(|t| *t >= window_start);
    }
}

/// Sliding-window rate limiter keyed by user
pub struct RateLimiter {
    config: RateLimitConfig,
    // Map: user_id -> request timestamps inside the window
    users: Arc<DashMap<String, UserWindow>>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: Arc::new(DashMap::new()),
        }
    }

    /// Check and record one request for the user
    pub fn check(&self, user_id: &UserId) -> Result<()> {
        let now = Utc::now();
        let window_start = now - Duration::seconds(self.config.window_seconds);

        let mut entry = self
            .users
            .entry(user_id.as_str().to_string())
            .or_insert_with(UserWindow::new);
        let window = entry.value_mut();

        window.cleanup(window_start);

        if window.requests.len() >= self.config.max_requests_per_window as usize {
            return Err(Error::RateLimited(format!(
                "{} requests in {}s window for user {}",
                window.requests.len(),
                self.config.window_seconds,
                user_id
            )));
        }

        window.requests.push(now);
        Ok(())
    }

    /// Clear the window for a user (manual reset)
    pub fn reset_user(&self, user_id: &UserId) {
        self.users.remove(user_id.as_str());
    }

    /// Number of users currently tracked
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests_per_window: 3,
            window_seconds: 60,
        });
        let user = UserId::new("u1");

        for _ in 0..3 {
            assert!(limiter.check(&user).is_ok());
        }
        assert!(matches!(limiter.check(&user), Err(Error::RateLimited(_))));
    }

    #[test]
    fn test_users_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests_per_window: 1,
            window_seconds: 60,
        });

        assert!(limiter.check(&UserId::new("u1")).is_ok());
        assert!(limiter.check(&UserId::new("u2")).is_ok());
        assert!(limiter.check(&UserId::new("u1")).is_err());
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests_per_window: 1,
            window_seconds: 60,
        });
        let user = UserId::new("u1");

        limiter.check(&user).unwrap();
        assert_eq!(limiter.tracked_users(), 1);

        limiter.reset_user(&user);
        assert!(limiter.check(&user).is_ok());
    }
}
