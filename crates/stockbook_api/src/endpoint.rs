use serde::de::DeserializeOwned;

use crate::client::ApiClient;
use crate::request::RequestBuilder;

/// Immutable (client, base path) pair a resource wrapper is built from.
///
/// Constructed once per resource type and never mutated afterwards. Every
/// endpoint over the same client shares that client's limiter and gate;
/// creating more endpoints never multiplies the admission budget. This is
/// the only thing resource wrappers need from the dispatch core.
#[derive(Clone)]
pub struct Endpoint {
    client: ApiClient,
    base_path: String,
}

impl Endpoint {
    pub fn new(client: ApiClient, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into().trim_matches('/').to_string();
        Self { client, base_path }
    }

    /// Starts a request against `relative_path`, resolved under this
    /// endpoint's base path. An empty relative path addresses the
    /// collection itself.
    pub fn request<T: DeserializeOwned>(&self, relative_path: &str) -> RequestBuilder<T> {
        RequestBuilder::new(self, relative_path)
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
