//! Tree-wide configuration.
//!
//! Loaded from YAML or JSON; every field has a default so partial documents
//! are accepted.

use serde::{Deserialize, Serialize};

use crate::error::PropertyError;

fn default_root_error_key() -> String {
    "root".to_string()
}

fn default_snapshot_value_key() -> String {
    "_value".to_string()
}

fn default_constraint_message() -> String {
    "Constraint '{key}' failed".to_string()
}

/// Options shared by every node of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Key under which `validate_deep` reports the traversal root's own errors.
    #[serde(default = "default_root_error_key")]
    pub root_error_key: String,

    /// Reserved key holding a branch node's own value in `snapshot()`.
    #[serde(default = "default_snapshot_value_key")]
    pub snapshot_value_key: String,

    /// Message used when a failing constraint has no `message` metadata.
    /// `{key}` is replaced with the constraint key.
    #[serde(default = "default_constraint_message")]
    pub default_constraint_message: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_error_key: default_root_error_key(),
            snapshot_value_key: default_snapshot_value_key(),
            default_constraint_message: default_constraint_message(),
        }
    }
}

impl TreeConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, PropertyError> {
        serde_yaml::from_str(source).map_err(|e| PropertyError::Config(e.to_string()))
    }

    pub fn from_json_str(source: &str) -> Result<Self, PropertyError> {
        serde_json::from_str(source).map_err(|e| PropertyError::Config(e.to_string()))
    }

    pub fn constraint_message(&self, key: &str) -> String {
        self.default_constraint_message.replace("{key}", key)
    }
}
