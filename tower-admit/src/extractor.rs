/// Key charged for every request whose client can't be identified.
///
/// All such requests share one bucket, so a single noisy client that can't be
/// identified competes with every other unidentifiable client for the same
/// budget.
pub const FALLBACK_KEY: &str = "unknown";

/// Maps a request to the client key its tokens are charged to.
///
/// Implemented for any `Fn(&Req) -> Option<String>`, so a closure is usually
/// all you need. Keys are compared verbatim; normalise them here if needed.
pub trait KeyExtractor<Req>: Send + Sync {
    /// Returns `None` when the client can't be determined.
    fn extract(&self, req: &Req) -> Option<String>;
}

impl<Req, F> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> Option<String> + Send + Sync,
{
    fn extract(&self, req: &Req) -> Option<String> {
        self(req)
    }
}

/// Extract a key, substituting [`FALLBACK_KEY`] for a missing or empty one.
pub(crate) fn key_or_fallback<Req, E>(extractor: &E, req: &Req) -> String
where
    E: KeyExtractor<Req> + ?Sized,
{
    match extractor.extract(req) {
        Some(key) if !key.is_empty() => key,
        _ => {
            tracing::debug!("client key unavailable; charging fallback bucket");
            FALLBACK_KEY.to_owned()
        }
    }
}
