use std::fmt;
use std::sync::Arc;

use admit_limit::LimiterRegistry;
use tower::Layer;

use crate::service::AdmissionService;

/// Callback invoked with `(key, allowed)` after every admission decision.
pub type DecisionObserver = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Applies per-client admission control to requests.
pub struct AdmissionLayer<E> {
    registry: Arc<LimiterRegistry>,
    extractor: Arc<E>,
    observer: Option<DecisionObserver>,
}

impl<E> Clone for AdmissionLayer<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            extractor: Arc::clone(&self.extractor),
            observer: self.observer.clone(),
        }
    }
}

impl<E> fmt::Debug for AdmissionLayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionLayer")
            .field("registry", &self.registry)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<E> AdmissionLayer<E> {
    /// Create an AdmissionLayer
    ///
    /// Every service produced by this layer (and its clones) charges the same
    /// registry, so clients are limited across all of them.
    pub fn new(registry: Arc<LimiterRegistry>, extractor: E) -> Self {
        AdmissionLayer {
            registry,
            extractor: Arc::new(extractor),
            observer: None,
        }
    }

    /// Report each decision to `observer`, typically for telemetry.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }
}

impl<E, S> Layer<S> for AdmissionLayer<E> {
    type Service = AdmissionService<E, S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = AdmissionService::new(service, self.registry.clone(), self.extractor.clone());
        match &self.observer {
            Some(observer) => svc.with_observer(observer.clone()),
            None => svc,
        }
    }
}
