use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Service, ServiceExt};

use super::AdmissionController;

/// Applies the admission hook pair around every call to the wrapped
/// transport: admit before dispatch, release when the response future
/// resolves, unconditionally.
///
/// Sits *inside* the retry middleware, so each retried attempt is a fresh
/// network call that re-enters both gates, and no concurrency slot is held
/// through a backoff sleep.
#[derive(Clone)]
pub struct AdmissionLimit<S> {
    inner: S,
    controller: Arc<AdmissionController>,
}

impl<S> AdmissionLimit<S> {
    pub fn new(inner: S, controller: Arc<AdmissionController>) -> Self {
        Self { inner, controller }
    }
}

impl<S, Request> Service<Request> for AdmissionLimit<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Admission waits inside the response future, so readiness is
        // unconditional and waiters never pile up in poll_ready.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let controller = Arc::clone(&self.controller);
        let inner = self.inner.clone();
        Box::pin(async move {
            let _permit = controller.admit().await;
            // The permit lives until the transport call resolves or this
            // future is dropped, whichever comes first.
            inner.oneshot(request).await
        })
    }
}
