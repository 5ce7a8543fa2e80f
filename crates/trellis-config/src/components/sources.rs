//! Where the schema catalog and documents come from

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relationship graph source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Schema seed file (TOML, or JSON by extension)
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

/// Document store source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON fixtures: collection name to array of documents
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
}
