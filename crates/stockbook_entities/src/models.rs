//! Wire models shared by the entity services.

use serde::{Deserialize, Serialize};

/// Paging envelope around every collection response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ListEnvelope<T> {
    pub meta: ListMeta,
    pub rows: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ListMeta {
    /// Total matching entities on the server, not just this page.
    pub size: u32,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Minor currency units.
    #[serde(default, rename = "salePrice", skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub archived: bool,
}

/// Creation/update payload for a product; the server assigns the id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "salePrice", skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counterparty {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CounterpartyDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
