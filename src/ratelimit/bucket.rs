//! Token buckets backing each tracked key.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// Refill rate and capacity of a single bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketQuota {
    /// Tokens added per second
    pub rate: NonZeroU32,
    /// Maximum number of tokens the bucket holds
    pub burst: u32,
}

/// Token bucket used by the limiter table.
///
/// The table never looks inside a bucket: it creates one per key through
/// [`TokenBucket::with_quota`] and asks it for tokens. Alternative
/// implementations can be plugged into [`LimiterTable`](super::LimiterTable)
/// through its type parameter.
pub trait TokenBucket: Send + Sync + 'static {
    /// Create a full bucket for the given quota.
    fn with_quota(quota: BucketQuota) -> Self
    where
        Self: Sized;

    /// Take one token if one is available right now.
    fn try_acquire(&self) -> bool;
}

/// A GCRA token bucket from the `governor` crate.
///
/// A bucket with zero burst can never hold a token and denies every request.
pub struct GovernorBucket {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl TokenBucket for GovernorBucket {
    fn with_quota(quota: BucketQuota) -> Self {
        let limiter = NonZeroU32::new(quota.burst)
            .map(|burst| RateLimiter::direct(Quota::per_second(quota.rate).allow_burst(burst)));
        Self { limiter }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for GovernorBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorBucket")
            .field("empty", &self.limiter.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(rate: u32, burst: u32) -> BucketQuota {
        BucketQuota {
            rate: NonZeroU32::new(rate).unwrap(),
            burst,
        }
    }

    #[test]
    fn test_bucket_starts_full() {
        let bucket = GovernorBucket::with_quota(quota(1, 3));

        for _ in 0..3 {
            assert!(bucket.try_acquire());
        }

        // The 4th token needs a refill
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_zero_burst_always_denies() {
        let bucket = GovernorBucket::with_quota(quota(1000, 0));

        for _ in 0..10 {
            assert!(!bucket.try_acquire());
        }
    }

    #[test]
    fn test_bucket_refills() {
        let bucket = GovernorBucket::with_quota(quota(50, 1));

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(bucket.try_acquire());
    }
}
