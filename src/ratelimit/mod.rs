//! Per-key token buckets with idle expiry.

mod bucket;
mod key;
mod sweeper;
mod table;

pub use bucket::{BucketQuota, GovernorBucket, TokenBucket};
pub use key::HashedKey;
pub use table::{Admission, LimiterTable};
