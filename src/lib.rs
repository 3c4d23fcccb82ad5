//! Keyed Ratelimit - self-expiring per-key rate limiting
//!
//! This crate associates arbitrary byte keys (client IPs, API tokens) with
//! independent token buckets and forgets keys that stay idle longer than a
//! configured window, so a server can throttle per-client traffic without
//! unbounded memory growth from churn in the key space.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use ratelimit::{Admission, LimiterTable};
