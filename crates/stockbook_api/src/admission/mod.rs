//! Admission control for outbound Stockbook API calls.
//!
//! Stockbook publishes two independent account-level limits: an aggregate
//! requests-per-second ceiling and a cap on simultaneously in-flight
//! requests. The two are modeled as separate components — a [`TokenBucket`]
//! and a [`ConcurrencyGate`] — composed by the [`AdmissionController`] into
//! the single before/after hook pair the dispatch stack applies around every
//! network call. Nothing in the client may reach the transport without
//! passing through [`AdmissionLimit`].
//!
//! Both components are injected at client construction, never ambient:
//! independent clients for different accounts do not cross-throttle, while
//! clients derived from one another share the same controller by reference.

mod bucket;
mod controller;
mod gate;
pub mod layer;
pub mod service;

pub use bucket::TokenBucket;
pub use controller::{AdmissionController, AdmissionPermit};
pub use gate::{ConcurrencyGate, GatePermit};
pub use layer::AdmissionLimitLayer;
pub use service::AdmissionLimit;

use bon::Builder;

/// Admission limits applied to one account's traffic.
///
/// Defaults mirror the limits Stockbook documents for a production account:
/// 15 requests per second with an equal burst allowance, and at most 5
/// requests in flight at once.
#[derive(Clone, Copy, Debug, Builder)]
pub struct AdmissionSettings {
    /// Hard ceiling on requests issued per second, independent of how many
    /// are concurrently outstanding.
    #[builder(default = 15.0)]
    pub(crate) queries_per_second: f64,

    /// Bucket capacity: how many requests may be issued back to back after
    /// an idle spell before the fixed rate takes over.
    #[builder(default = 15)]
    pub(crate) burst: u32,

    /// Documented "max parallel requests per account" cap, distinct from raw
    /// throughput.
    #[builder(default = 5)]
    pub(crate) max_concurrent: usize,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            queries_per_second: 15.0,
            burst: 15,
            max_concurrent: 5,
        }
    }
}

impl AdmissionSettings {
    pub fn queries_per_second(&self) -> f64 {
        self.queries_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
