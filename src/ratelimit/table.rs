//! The keyed limiter table.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::bucket::{BucketQuota, GovernorBucket, TokenBucket};
use super::key::HashedKey;
use super::sweeper;
use crate::config::{LimiterConfig, LimiterSettings};

/// Outcome of [`LimiterTable::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The key is tracked and a token was taken.
    Allowed,
    /// The key is tracked but its bucket is empty.
    Denied,
    /// The key was never set, was deleted, or was swept.
    Untracked,
}

impl Admission {
    /// Returns true if the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// Returns true if the key had an entry in the table.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Admission::Untracked)
    }
}

/// Per-key throttling state.
pub(super) struct Entry<B> {
    bucket: Arc<B>,
    last_seen: Instant,
}

/// State shared between the table handle and its sweeper.
pub(super) struct Shared<B> {
    entries: Mutex<AHashMap<HashedKey, Entry<B>>>,
    expiry: Duration,
}

impl<B> Shared<B> {
    /// Remove every entry idle for at least `expiry` as of `now`.
    ///
    /// Returns the number of evicted entries.
    pub(super) fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < self.expiry);
        before - entries.len()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A table of token buckets keyed by arbitrary byte strings.
///
/// Each key registered with [`set`](Self::set) gets its own bucket. A
/// background sweeper, started at construction, forgets keys that have not
/// been set or checked within the expiry window. All entries live behind a
/// single mutex; the sweeper holds it for one full scan per tick.
///
/// Keys are reduced to a [`HashedKey`] before lookup, so colliding keys
/// share a bucket.
///
/// The sweeper runs until [`stop`](Self::stop) is called or the table is
/// dropped.
pub struct LimiterTable<B: TokenBucket = GovernorBucket> {
    shared: Arc<Shared<B>>,
    settings: LimiterSettings,
    quota: BucketQuota,
    shutdown_token: CancellationToken,
}

impl LimiterTable {
    /// Create a table backed by `governor` token buckets.
    ///
    /// - `rate`: tokens per second for each bucket (0 becomes 10)
    /// - `burst`: bucket capacity (0 means every check is denied)
    /// - `expiry`: idle time before a key is forgotten (zero becomes one hour)
    /// - `capacity_hint`: initial map capacity; does not bound the table
    /// - `sweep_interval`: sweeper cadence (zero becomes one second)
    ///
    /// Never fails. Expects to run inside a Tokio runtime; without one the
    /// sweeper gets a dedicated thread.
    pub fn new(
        rate: u32,
        burst: u32,
        expiry: Duration,
        capacity_hint: usize,
        sweep_interval: Duration,
    ) -> Self {
        Self::with_settings(LimiterSettings {
            rate,
            burst,
            expiry,
            capacity_hint,
            sweep_interval,
        })
    }

    /// Create a table from file configuration.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::with_settings(LimiterSettings::from(config))
    }
}

impl<B: TokenBucket> LimiterTable<B> {
    /// Create a table with a custom bucket implementation.
    pub fn with_settings(settings: LimiterSettings) -> Self {
        let settings = settings.sanitized();
        let quota = BucketQuota {
            rate: settings.refill_rate(),
            burst: settings.burst,
        };

        let shared = Arc::new(Shared {
            entries: Mutex::new(AHashMap::with_capacity(settings.capacity_hint)),
            expiry: settings.expiry,
        });
        let shutdown_token = CancellationToken::new();

        debug!(
            rate = settings.rate,
            burst = settings.burst,
            expiry = ?settings.expiry,
            sweep_interval = ?settings.sweep_interval,
            "Creating limiter table"
        );

        sweeper::spawn(
            Arc::clone(&shared),
            settings.sweep_interval,
            shutdown_token.clone(),
        );

        Self {
            shared,
            settings,
            quota,
            shutdown_token,
        }
    }

    /// Start tracking `key` with a full bucket.
    ///
    /// An existing entry for the key is replaced, discarding whatever its
    /// bucket had consumed.
    pub fn set(&self, key: impl AsRef<[u8]>) {
        let key = HashedKey::of(key);
        trace!(key = %key, "Setting limiter entry");

        let mut entries = self.shared.entries.lock();
        entries.insert(
            key,
            Entry {
                bucket: Arc::new(B::with_quota(self.quota)),
                last_seen: Instant::now(),
            },
        );
    }

    /// Stop tracking `key`. Does nothing if it is not tracked.
    pub fn delete(&self, key: impl AsRef<[u8]>) {
        let key = HashedKey::of(key);
        trace!(key = %key, "Deleting limiter entry");

        self.shared.entries.lock().remove(&key);
    }

    /// Refresh `key` and try to take a token from its bucket.
    ///
    /// The refresh happens under the table lock; the token is taken after
    /// the lock is released. A delete or sweep landing in between does not
    /// fail the check: it completes against the now-detached bucket.
    pub fn check(&self, key: impl AsRef<[u8]>) -> Admission {
        let key = HashedKey::of(key);

        let Some(bucket) = self.touch(key) else {
            trace!(key = %key, "Check on untracked key");
            return Admission::Untracked;
        };

        if bucket.try_acquire() {
            trace!(key = %key, "Check allowed");
            Admission::Allowed
        } else {
            debug!(key = %key, "Rate limit exceeded");
            Admission::Denied
        }
    }

    /// Bump the entry's last-seen time and hand out its bucket.
    fn touch(&self, key: HashedKey) -> Option<Arc<B>> {
        let mut entries = self.shared.entries.lock();
        let entry = entries.get_mut(&key)?;
        entry.last_seen = entry.last_seen.max(Instant::now());
        Some(Arc::clone(&entry.bucket))
    }

    /// Run one eviction pass now, independent of the sweeper.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep_expired(Instant::now())
    }

    /// Stop the background sweeper. Entries are no longer evicted
    /// automatically afterwards. Calling this more than once is harmless.
    pub fn stop(&self) {
        if !self.shutdown_token.is_cancelled() {
            debug!("Stopping limiter sweeper");
        }
        self.shutdown_token.cancel();
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns true if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tokens added to each bucket per second.
    pub fn rate(&self) -> u32 {
        self.settings.rate
    }

    /// Capacity of each bucket.
    pub fn burst(&self) -> u32 {
        self.settings.burst
    }

    /// Idle time after which a key is forgotten.
    pub fn expiry(&self) -> Duration {
        self.settings.expiry
    }

    /// Cadence of the background sweeper.
    pub fn sweep_interval(&self) -> Duration {
        self.settings.sweep_interval
    }
}

impl<B: TokenBucket> Drop for LimiterTable<B> {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
