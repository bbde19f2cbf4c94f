use std::sync::Arc;

use admit_limit::LimiterRegistry;
use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::AdmissionLayer;

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add per-client admission control keyed by `extractor`
    fn admission<E>(
        self,
        registry: Arc<LimiterRegistry>,
        extractor: E,
    ) -> ServiceBuilder<Stack<AdmissionLayer<E>, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn admission<E>(
        self,
        registry: Arc<LimiterRegistry>,
        extractor: E,
    ) -> ServiceBuilder<Stack<AdmissionLayer<E>, L>> {
        self.layer(AdmissionLayer::new(registry, extractor))
    }
}
