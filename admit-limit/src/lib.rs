//! # admit-limit
//!
//! `admit-limit` provides per-client admission control built on a continuous
//! token bucket.
//!
//! ## Core Philosophy
//!
//! Every client key owns exactly one [`TokenBucket`]. Buckets live in a
//! [`LimiterRegistry`], which is an ordinary value you construct and share
//! (usually behind an `Arc`), not a process-wide singleton. That makes it
//! trivial to run several independent limiters side by side, one per route
//! for instance.
//!
//! ## Key Concepts
//!
//! * **Lazy Evaluation**: Tokens are recalculated at the moment of the request,
//!   eliminating the need for background refill threads or timers.
//! * **Sharded Registry**: The key → bucket map is sharded, so unrelated keys
//!   never contend on the same lock when a new client shows up.
//! * **Per-Bucket Locking**: The refill-then-consume step is atomic per bucket.
//!   The registry lock and the bucket lock are never held at the same time.
//! * **Mockable Time**: All time is read from a [`quanta::Clock`], so tests
//!   can drive the buckets with `Clock::mock()`.
//!
//! ## Example
//!
//! ```rust
//! use admit_limit::BucketConfig;
//! use admit_limit::LimiterRegistry;
//!
//! let config = BucketConfig::new(3.0, 1.0).unwrap();
//! let registry = LimiterRegistry::new(config);
//!
//! if registry.check("127.0.0.1").is_continue() {
//!     // Request allowed
//! }
//! ```

use std::time::Duration;

mod config;
mod registry;
mod token_bucket;

pub use config::BucketConfig;
pub use config::ConfigError;
pub use registry::LimiterRegistry;
pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reason {
    /// The bucket holds less than one token. `retry_after` is how long it
    /// takes for the next whole token to arrive at the configured rate.
    Overloaded { retry_after: Duration },
}
