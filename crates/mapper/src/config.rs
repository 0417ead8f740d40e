//! Mapper configuration
//!
//! Conventions shared by every mapper built from the same configuration:
//! default primary key column, the namespace used for pivot columns in
//! hydrated rows, timestamp column names and write strictness.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Primary key column used when a schema does not name one
    pub primary_key: String,
    /// Prefix that namespaces pivot columns in joined rows
    pub pivot_prefix: String,
    pub created_at_column: String,
    pub updated_at_column: String,
    /// Treat an update or delete that affects zero rows as `NotFound`
    pub require_affected_rows: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            primary_key: "id".to_string(),
            pivot_prefix: "_pivot_".to_string(),
            created_at_column: "created_at".to_string(),
            updated_at_column: "updated_at".to_string(),
            require_affected_rows: true,
        }
    }
}

impl MapperConfig {
    pub fn from_yaml_str(content: &str) -> ModelResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ModelError::Configuration(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Column name a pivot column is projected under
    pub fn pivot_alias(&self, column: &str) -> String {
        format!("{}{}", self.pivot_prefix, column)
    }
}
