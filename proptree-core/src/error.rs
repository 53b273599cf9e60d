//! Error types for the property tree.
//!
//! Only hard failures are errors. Navigational absence (missing child,
//! unresolved reference) is reported as `None` / `false` by the callers.

use thiserror::Error;

/// Failures raised by evaluation, node lifecycle, and the JSON codec.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// An operator expression was evaluated without any registry in scope.
    #[error("Configuration error: no operator registry available for evaluation")]
    MissingRegistry,

    /// An operator expression named a handler that is not registered.
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// A registered handler returned an error.
    #[error("Operator '{name}' failed: {source}")]
    Operator {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The node handle was used after `destroy()`.
    #[error("Node has been destroyed")]
    Destroyed,

    /// A JSON record did not match the property layout.
    #[error("Invalid property record: {0}")]
    InvalidJson(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every addressable node slot of the tree is in use.
    #[error("Node arena is full")]
    CapacityExceeded,

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PropertyError {
    /// Wrap a handler failure with the operator name.
    pub fn operator(name: impl Into<String>, source: anyhow::Error) -> Self {
        PropertyError::Operator {
            name: name.into(),
            source,
        }
    }

    /// Errors that indicate the host wired the tree incorrectly rather than
    /// a data problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PropertyError::MissingRegistry | PropertyError::UnknownOperator(_)
        )
    }
}
