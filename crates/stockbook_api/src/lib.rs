//! Admission-controlled HTTP dispatch core for the Stockbook REST API.
//!
//! Every resource wrapper in the Stockbook client family issues its calls
//! through this crate. The core combines three concerns that the generated
//! wrapper surface must never reimplement:
//!
//! 1. **Admission control** — Stockbook enforces a global requests-per-second
//!    ceiling plus a per-account cap on parallel requests. Both are modeled
//!    here as explicit components (a token bucket and a concurrency gate)
//!    composed into a single before/after hook pair around every network
//!    call. See [`admission`].
//! 2. **Retry policy** — HTTP 429 and gateway failures (>= 502) are re-issued
//!    with jittered exponential backoff up to an attempt ceiling. Any other
//!    status is surfaced to the caller untouched. See [`retries`].
//! 3. **Typed dispatch** — a single generic [`RequestBuilder`] maps every
//!    operation onto GET/POST/PUT/DELETE with typed success and error
//!    decoding, so resource wrappers stay one-liners.
//!
//! # Sharing invariant
//!
//! Deriving a client with different credentials via
//! [`ApiClient::with_credential`] shares the limiter and the gate by
//! reference. Rate and concurrency budgets are per account on the Stockbook
//! side, so they must stay global across derived clients in this process.
//!
//! # Basic usage
//!
//! ```no_run
//! use stockbook_api::{ApiClient, ClientConfig, Credential};
//!
//! # async fn run() -> Result<(), stockbook_api::Error> {
//! let client = ApiClient::new(
//!     ClientConfig::builder()
//!         .base_url("https://api.stockbook.io/api/v2")
//!         .credential(Credential::Bearer("token".into()))
//!         .build(),
//! )?;
//!
//! let endpoint = client.endpoint("entity/product");
//! let product: serde_json::Value = endpoint.request("12345").get().await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub mod admission;
pub mod client;
pub mod endpoint;
pub mod error;
mod internal_event;
pub mod params;
pub mod request;
pub mod retries;
pub mod task;
pub mod transport;

pub use client::{ApiClient, ClientConfig, Credential};
pub use endpoint::Endpoint;
pub use error::{ApiError, Error};
pub use params::QueryParams;
pub use request::RequestBuilder;
pub use task::DeferredTask;

/// Boxed error used where the concrete failure type is not interesting.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
