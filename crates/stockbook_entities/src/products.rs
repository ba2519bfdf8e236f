use stockbook_api::{ApiClient, DeferredTask, Endpoint, Error, QueryParams};
use tracing::debug;

use crate::models::{ListEnvelope, Product, ProductDraft};

/// CRUD operations on `entity/product`.
#[derive(Clone)]
pub struct ProductService {
    endpoint: Endpoint,
}

impl ProductService {
    pub fn new(client: &ApiClient) -> Self {
        Self {
            endpoint: client.endpoint("entity/product"),
        }
    }

    pub async fn list(&self, params: &QueryParams) -> Result<ListEnvelope<Product>, Error> {
        self.endpoint.request("").query(params).get().await
    }

    pub async fn get(&self, id: &str) -> Result<Product, Error> {
        self.endpoint.request(id).get().await
    }

    pub async fn create(&self, draft: &ProductDraft) -> Result<Product, Error> {
        debug!(target: "stockbook_entities::products", name = %draft.name, "creating product");
        self.endpoint.request("").json_body(draft)?.post().await
    }

    pub async fn update(&self, id: &str, draft: &ProductDraft) -> Result<Product, Error> {
        self.endpoint.request(id).json_body(draft)?.put().await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, Error> {
        self.endpoint.request::<Product>(id).delete().await
    }

    /// Bulk import convenience: creates the product server-side and returns
    /// a handle to the deferred task.
    pub async fn create_deferred(&self, draft: &ProductDraft) -> Result<DeferredTask, Error> {
        self.endpoint
            .request::<Product>("")
            .json_body(draft)?
            .post_deferred()
            .await
    }
}
