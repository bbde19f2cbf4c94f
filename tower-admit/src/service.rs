use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use admit_limit::LimiterRegistry;
use admit_limit::Reason;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use tracing::trace;

use crate::error::AdmitError;
use crate::extractor::KeyExtractor;
use crate::extractor::key_or_fallback;
use crate::layer::DecisionObserver;

#[derive(Clone, Debug)]
struct AdmissionServiceMetrics {
    decisions: Counter<u64>,
}

/// Charges each request to its client's token bucket before forwarding it.
///
/// Readiness is entirely the inner service's. The admission decision needs
/// the request (to find its key), so it is taken in `call`.
pub struct AdmissionService<E, S> {
    inner: S,
    registry: Arc<LimiterRegistry>,
    extractor: Arc<E>,
    observer: Option<DecisionObserver>,
    instruments: AdmissionServiceMetrics,
}

pin_project! {
    /// Either the inner service's future, or an immediate rejection.
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Rejected {
            error: AdmitError,
        },
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { error } => Poll::Ready(Err(Box::new(error.clone()))),
        }
    }
}

impl<E, S> Clone for AdmissionService<E, S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: Arc::clone(&self.registry),
            extractor: Arc::clone(&self.extractor),
            observer: self.observer.clone(),
            instruments: self.instruments.clone(),
        }
    }
}

impl<E, S> fmt::Debug for AdmissionService<E, S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionService")
            .field("inner", &self.inner)
            .field("registry", &self.registry)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<E, S, Req> Service<Req> for AdmissionService<E, S>
where
    E: KeyExtractor<Req>,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = key_or_fallback(self.extractor.as_ref(), &req);
        let decision = self.registry.check(&key);
        self.record(&key, decision.is_continue());

        match decision {
            ControlFlow::Continue(()) => ResponseFuture::Admitted {
                inner: self.inner.call(req),
            },
            ControlFlow::Break(Reason::Overloaded { retry_after }) => ResponseFuture::Rejected {
                error: AdmitError::RateLimited { retry_after },
            },
        }
    }
}

impl<E, S> AdmissionService<E, S> {
    pub fn new(inner: S, registry: Arc<LimiterRegistry>, extractor: Arc<E>) -> Self {
        let meter = global::meter("admission_service");
        let instruments = AdmissionServiceMetrics {
            decisions: meter.u64_counter("admission_decisions").build(),
        };

        Self {
            inner,
            registry,
            extractor,
            observer: None,
            instruments,
        }
    }

    pub fn with_observer(mut self, observer: DecisionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    fn record(&self, key: &str, allowed: bool) {
        trace!(key, allowed, "admission decision");

        let decision = if allowed { "allowed" } else { "denied" };
        self.instruments
            .decisions
            .add(1, &[KeyValue::new("decision", decision)]);

        if let Some(observer) = &self.observer {
            observer(key, allowed);
        }
    }
}
