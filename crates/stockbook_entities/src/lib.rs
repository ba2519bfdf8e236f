//! Typed resource services over the Stockbook dispatch core.
//!
//! A thin sample of the generated wrapper surface: one service struct per
//! resource type, each holding an [`stockbook_api::Endpoint`] and mapping
//! CRUD operations onto the generic request builder. Services never touch
//! the transport directly — admission control and retry come from the core,
//! uniformly.

pub mod counterparties;
pub mod models;
pub mod products;

pub use counterparties::CounterpartyService;
pub use models::{Counterparty, CounterpartyDraft, ListEnvelope, ListMeta, Product, ProductDraft};
pub use products::ProductService;
