//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Admin API rate limit
pub const ADMIN_RATE_LIMIT: u32 = 10; // Max 10 requests per second

/// Limiter shared by the moderation endpoints
#[derive(Clone)]
pub struct ApiRateLimiter {
    limiter: Arc<Limiter>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            limiter: create_limiter(requests_per_second),
        }
    }

    /// Check if a request is allowed (returns true if allowed)
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new(ADMIN_RATE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_bounded_by_quota() {
        let limiter = ApiRateLimiter::new(3);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = ApiRateLimiter::new(0);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
