use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quanta::Clock;
use quanta::Instant;
use tracing::debug;

use crate::BucketConfig;
use crate::Reason;
use crate::TokenBucket;

/// Maps each client key to exactly one [`TokenBucket`].
///
/// Buckets are created lazily, full, on the first check for a key. The map
/// is sharded so first sight of unrelated keys doesn't serialize, and the
/// shard guard is always dropped before a bucket is consumed from.
///
/// Entries are kept for the registry's lifetime unless an idle TTL is set
/// with [`LimiterRegistry::with_idle_ttl`], in which case
/// [`LimiterRegistry::evict_idle`] drops buckets that haven't been checked
/// for longer than the TTL.
#[derive(Debug)]
pub struct LimiterRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
    config: BucketConfig,
    idle_ttl: Option<Duration>,
    clock: Clock,
}

impl LimiterRegistry {
    pub fn new(config: BucketConfig) -> Self {
        Self::with_clock(config, Clock::new())
    }

    pub fn with_clock(config: BucketConfig, clock: Clock) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            idle_ttl: None,
            clock,
        }
    }

    /// Allow buckets idle for longer than `ttl` to be evicted.
    ///
    /// An evicted key starts over with a full bucket the next time it is seen.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    /// Return the bucket for `key`, creating a full one if this is the first
    /// time the key has been seen.
    ///
    /// Concurrent first-time callers for the same key all get the same
    /// instance.
    pub fn get_or_create(&self, key: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        // Slow path: entry() holds the shard write lock across check-and-insert
        let bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| {
                debug!(
                    key,
                    capacity = self.config.capacity(),
                    refill_rate = self.config.refill_rate(),
                    "creating token bucket"
                );
                Arc::new(TokenBucket::new(self.config, self.clock.now()))
            });
        Arc::clone(bucket.value())
    }

    /// Run one admission check for `key` at the registry clock's current time.
    pub fn check(&self, key: &str) -> ControlFlow<Reason> {
        let bucket = self.get_or_create(key);
        bucket.process(self.clock.now())
    }

    /// Drop every bucket idle for longer than the configured TTL.
    ///
    /// A bucket still held by a caller of [`LimiterRegistry::get_or_create`]
    /// is kept regardless of its idle time, so a key never has two live
    /// buckets. Returns the number of buckets removed. Without a TTL this is a no-op.
    pub fn evict_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let now = self.clock.now();
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            // Any clone outside the map was handed out under this shard's lock
            // and may not have been consumed from yet
            let keep = Arc::strong_count(bucket) > 1 || bucket.idle_for(now) <= ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "evicted idle buckets");
        }
        evicted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn config(&self) -> BucketConfig {
        self.config
    }

    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}
