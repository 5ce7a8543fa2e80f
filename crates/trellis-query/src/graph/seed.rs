//! Schema seed files.
//!
//! A seed lists the catalog as four flat tables, the same shape the graph
//! loader writes into a graph database: collections, embedded arrays,
//! collection references and embedded references.
//!
//! ```toml
//! collections = ["orders", "customers", "products"]
//!
//! [[references]]
//! src = "orders"
//! dst = "customers"
//! alias = "customer"
//! local_field = "customerId"
//! foreign_field = "_id"
//!
//! [[embedded_references]]
//! owner = "orders"
//! path = "items"
//! dst = "products"
//! alias = "product"
//! local_field = "productId"
//! foreign_field = "_id"
//! ```

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSeed {
    #[serde(default)]
    pub collections: Vec<String>,
    /// Embedded arrays with no outgoing reference
    #[serde(default)]
    pub embedded: Vec<EmbeddedDecl>,
    #[serde(default)]
    pub references: Vec<ReferenceDecl>,
    #[serde(default)]
    pub embedded_references: Vec<EmbeddedReferenceDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedDecl {
    pub owner: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDecl {
    pub src: String,
    pub dst: String,
    pub alias: String,
    #[serde(alias = "localField")]
    pub local_field: String,
    #[serde(alias = "foreignField", default = "default_foreign_field")]
    pub foreign_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedReferenceDecl {
    pub owner: String,
    pub path: String,
    pub dst: String,
    pub alias: String,
    #[serde(alias = "localField")]
    pub local_field: String,
    #[serde(alias = "foreignField", default = "default_foreign_field")]
    pub foreign_field: String,
}

fn default_foreign_field() -> String {
    "_id".to_string()
}

impl SchemaSeed {
    pub fn from_toml_str(input: &str) -> Result<Self, ResolveError> {
        toml::from_str(input).map_err(|e| ResolveError::query(format!("invalid schema seed: {e}")))
    }

    pub fn from_json_str(input: &str) -> Result<Self, ResolveError> {
        serde_json::from_str(input)
            .map_err(|e| ResolveError::query(format!("invalid schema seed: {e}")))
    }
}
