//! Error types for the workflow engine
//!
//! Only structural and programmer/data-corruption failures are errors.
//! Unresolved references are `None` and validation problems are
//! [`Issue`](crate::validation::Issue)s.

use thiserror::Error;

use crate::types::NodeId;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the workflow engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A DTO carried a type tag outside the closed type enumeration
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    /// No descriptor is registered for a node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node does not exist in the document
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    /// The node may not be removed
    #[error("Node '{node_id}' cannot be removed: {reason}")]
    NotRemovable { node_id: NodeId, reason: String },

    /// A line endpoint does not resolve to a live node or port
    #[error("Invalid line endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The line policy of the source node forbids removing this line
    #[error("Line '{0}' cannot be removed")]
    LineNotRemovable(String),

    /// Replaying a history entry failed; the document was left unchanged
    #[error("History replay failed: {0}")]
    HistoryReplay(String),

    /// Undo/redo requested on an empty stack
    #[error("Nothing to {0}")]
    NothingToReplay(&'static str),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a not-removable error with a reason
    pub fn not_removable(node_id: impl Into<NodeId>, reason: impl Into<String>) -> Self {
        Self::NotRemovable {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-endpoint error with a reason
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a synchronous rejection of a structural mutation
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NotRemovable { .. }
                | Self::InvalidEndpoint { .. }
                | Self::LineNotRemovable(_)
                | Self::DuplicateNodeId(_)
                | Self::NodeNotFound(_)
        )
    }
}
