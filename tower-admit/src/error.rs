use std::time::Duration;

/// Human readable text attached to every rejection.
pub const REJECTION_REASON: &str = "Too Many Requests";

/// Outcomes produced by the admission middleware.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmitError {
    /// The client's bucket is empty.
    ///
    /// This is an ordinary decision, not a fault in the service. The duration
    /// indicates when the next token arrives for this client.
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Too Many Requests")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: Duration,
    },
}

impl AdmitError {
    /// HTTP equivalent of a rejection.
    pub const STATUS: u16 = 429;

    pub fn status(&self) -> u16 {
        Self::STATUS
    }

    pub fn retry_after(&self) -> Duration {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AdmitError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        // Retry-After is whole seconds; never advertise 0 for a rejection
        let secs = self.retry_after().as_secs_f64().ceil().max(1.0) as u64;
        let mut response = (StatusCode::TOO_MANY_REQUESTS, REJECTION_REASON).into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from(secs),
        );
        response
    }
}
