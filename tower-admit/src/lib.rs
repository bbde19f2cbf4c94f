//! # Tower Admit
//!
//! `tower-admit` wraps any [Tower](https://github.com/tower-rs/tower) service with
//! per-client admission control backed by [`admit_limit::LimiterRegistry`].
//!
//! ## How a request is handled
//!
//! 1. **Key Extraction**: A [`KeyExtractor`] maps the request to a client key.
//!    If it can't (or produces an empty key) the request is charged to the
//!    shared [`FALLBACK_KEY`] bucket instead of failing.
//! 2. **Admission**: The key's token bucket is created on first sight and asked
//!    for one token.
//! 3. **Forward or Reject**: Admitted requests reach the inner service
//!    untouched. Rejected requests resolve straight away with
//!    [`AdmitError::RateLimited`] and the inner service never sees them.
//!
//! The registry is passed in explicitly, so several layers can share one
//! registry, or each route can get its own.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`AdmitError`], turning a rejection into
//!   `429 Too Many Requests` with a `Retry-After` header.

mod error;
mod extractor;
mod layer;
mod service;
mod sweeper;
mod utils;


pub use error::AdmitError;
pub use error::REJECTION_REASON;
pub use extractor::FALLBACK_KEY;
pub use extractor::KeyExtractor;
pub use layer::AdmissionLayer;
pub use layer::DecisionObserver;
pub use service::AdmissionService;
pub use service::ResponseFuture;
pub use sweeper::spawn_sweeper;
pub use utils::ServiceBuilderExt;
