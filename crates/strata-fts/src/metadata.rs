//! Index metadata and schema fingerprints.
//!
//! Every on-disk index carries a small JSON file next to the tantivy files
//! recording which entity it mirrors and the fingerprint of the schema it was
//! created with. The fingerprint is a hash of the serialized tantivy schema,
//! so any change in field names, types or options changes it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_fts::metadata::{schema_fingerprint, IndexMetadata};
//!
//! let metadata = IndexMetadata::new(&spec, schema_fingerprint(&schema)?);
//! metadata.save(&index_path)?;
//!
//! if let Some(stored) = IndexMetadata::load(&index_path)? {
//!     println!("created at {}", stored.created_at);
//! }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_core::{Error, Result};
use tantivy::schema::Schema;

use crate::schema::{IndexSpec, SCHEMA_VERSION};

/// Metadata filename stored in the index directory.
pub const METADATA_FILE: &str = "strata-index.json";

/// Metadata about an on-disk index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Index name.
    pub index_name: String,

    /// Entity type mirrored into the index.
    pub entity_type: String,

    /// Fingerprint of the schema the index was created with.
    pub schema_fingerprint: String,

    /// Derivation rules version.
    pub schema_version: u32,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl IndexMetadata {
    /// Metadata for a freshly created index.
    pub fn new(spec: &IndexSpec, schema_fingerprint: String) -> Self {
        Self {
            index_name: spec.name.clone(),
            entity_type: spec.entity_type.clone(),
            schema_fingerprint,
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Load metadata from the index directory.
    ///
    /// Returns `Ok(None)` if the metadata file doesn't exist.
    /// Returns `Err` if the file exists but cannot be parsed.
    pub fn load(index_path: &Path) -> Result<Option<Self>> {
        let metadata_path = index_path.join(METADATA_FILE);

        if !metadata_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&metadata_path)
            .map_err(|e| Error::io_with_path(e, &metadata_path))?;

        let metadata = serde_json::from_str(&content)?;
        Ok(Some(metadata))
    }

    /// Save metadata to the index directory.
    pub fn save(&self, index_path: &Path) -> Result<()> {
        if !index_path.exists() {
            std::fs::create_dir_all(index_path).map_err(|e| Error::io_with_path(e, index_path))?;
        }

        let metadata_path = index_path.join(METADATA_FILE);
        let content = serde_json::to_string_pretty(self)?;

        std::fs::write(&metadata_path, content)
            .map_err(|e| Error::io_with_path(e, &metadata_path))?;

        Ok(())
    }
}

/// Fingerprint of a tantivy schema, as 16 hex digits.
pub fn schema_fingerprint(schema: &Schema) -> Result<String> {
    let serialized = serde_json::to_string(schema)?;
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}

// ============================================================================
// Tests
// ============================================================================
