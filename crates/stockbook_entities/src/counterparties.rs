use stockbook_api::{ApiClient, Endpoint, Error, QueryParams};

use crate::models::{Counterparty, CounterpartyDraft, ListEnvelope};

/// CRUD operations on `entity/counterparty`.
#[derive(Clone)]
pub struct CounterpartyService {
    endpoint: Endpoint,
}

impl CounterpartyService {
    pub fn new(client: &ApiClient) -> Self {
        Self {
            endpoint: client.endpoint("entity/counterparty"),
        }
    }

    pub async fn list(&self, params: &QueryParams) -> Result<ListEnvelope<Counterparty>, Error> {
        self.endpoint.request("").query(params).get().await
    }

    pub async fn get(&self, id: &str) -> Result<Counterparty, Error> {
        self.endpoint.request(id).get().await
    }

    pub async fn create(&self, draft: &CounterpartyDraft) -> Result<Counterparty, Error> {
        self.endpoint.request("").json_body(draft)?.post().await
    }

    pub async fn update(&self, id: &str, draft: &CounterpartyDraft) -> Result<Counterparty, Error> {
        self.endpoint.request(id).json_body(draft)?.put().await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, Error> {
        self.endpoint.request::<Counterparty>(id).delete().await
    }
}
