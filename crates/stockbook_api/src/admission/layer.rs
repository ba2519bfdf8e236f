use std::sync::Arc;

use tower::Layer;

use super::{AdmissionController, AdmissionLimit};

/// Layer form of [`AdmissionLimit`]. Every service built from one layer
/// shares the same controller, so stacking it in several places never
/// multiplies the admission budget.
#[derive(Clone)]
pub struct AdmissionLimitLayer {
    controller: Arc<AdmissionController>,
}

impl AdmissionLimitLayer {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }
}

impl<S> Layer<S> for AdmissionLimitLayer {
    type Service = AdmissionLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionLimit::new(inner, Arc::clone(&self.controller))
    }
}
