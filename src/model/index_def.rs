/*!
Secondary index definitions (spec §3, §4.5). An [IndexDefinition] is stored
alongside a namespace's [super::metadata::TableMetadata] but is versioned
independently by the index substrate itself.
*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of index substrate backing an [IndexDefinition].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Exact-match hash index.
    Hash,
    /// Full-text search (BM25) index.
    Fts,
    /// Approximate nearest-neighbor vector index (HNSW).
    Vector,
}

/// A single field an index is built over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexField {
    /// Dotted path into the entity, e.g. `profile.email`.
    pub path: String,
}

/// Declarative definition of a secondary index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Unique index name within the namespace.
    pub name: String,
    /// Substrate backing the index.
    #[serde(rename = "type")]
    pub type_: IndexType,
    /// Fields the index is built over.
    pub fields: Vec<IndexField>,
    /// Substrate-specific options (e.g. HNSW `m`/`efConstruction`, bloom `fpr`).
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl IndexDefinition {
    /// Convenience constructor for a single-field hash index.
    pub fn hash(name: impl Into<String>, field_path: impl Into<String>) -> Self {
        IndexDefinition {
            name: name.into(),
            type_: IndexType::Hash,
            fields: vec![IndexField {
                path: field_path.into(),
            }],
            options: HashMap::new(),
        }
    }
}
