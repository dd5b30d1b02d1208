//! Error types for graph construction and execution
//!
//! Failures are split by time:
//!
//! ```text
//! GraphError
//! ├── build time (structural, reported once by AsyncGraphBuilder::build)
//! │   ├── EmptyGraph
//! │   ├── DuplicateNode
//! │   ├── UnknownNode
//! │   ├── SelfLink
//! │   ├── InvalidNode
//! │   ├── CycleDetected
//! │   └── Validation
//! └── run time (plumbing only)
//!     ├── Store        - the operation store stopped
//!     ├── RunClosed    - the traversal already finished
//!     └── Execution    - the traversal task panicked or was aborted
//! ```
//!
//! Failures of the tracked operations themselves are never errors here: they
//! are `error` resolutions routed along `error` links.

use async_store::StoreError;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building or running an async graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// The graph has no nodes
    #[error("Graph is empty - no nodes defined")]
    EmptyGraph,

    /// Two nodes share an id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// A link references a node that was never added
    #[error("Link {master} -> {slave} references unknown node '{missing}'")]
    UnknownNode {
        master: String,
        slave: String,
        /// The id that could not be found
        missing: String,
    },

    /// A node links to itself
    #[error("Node '{0}' cannot link to itself")]
    SelfLink(String),

    /// A node definition is malformed
    #[error("Invalid node '{node}': {reason}")]
    InvalidNode { node: String, reason: String },

    /// The links form a cycle
    ///
    /// # Example
    ///
    /// ```rust
    /// use async_graph::{AsyncGraphBuilder, GraphError, NodeSpec};
    ///
    /// let mut builder = AsyncGraphBuilder::new();
    /// builder
    ///     .add_node("a", NodeSpec::new("fetch"))
    ///     .add_node("b", NodeSpec::new("fetch"))
    ///     .next("a", "b")
    ///     .next("b", "a");
    ///
    /// assert!(matches!(builder.build(), Err(GraphError::CycleDetected { .. })));
    /// ```
    #[error("Cycle detected in async graph: {path}")]
    CycleDetected {
        /// Human-readable cycle, e.g. `a -> b -> a`
        path: String,
    },

    /// Generic structural error
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// The operation store is unavailable
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The run has already finished and no longer accepts commands
    #[error("Graph run '{0}' is closed")]
    RunClosed(String),

    /// The traversal task failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn cycle(path: impl Into<String>) -> Self {
        Self::CycleDetected { path: path.into() }
    }

    pub fn invalid_node(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_node(
        master: impl Into<String>,
        slave: impl Into<String>,
        missing: impl Into<String>,
    ) -> Self {
        Self::UnknownNode {
            master: master.into(),
            slave: slave.into(),
            missing: missing.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            GraphError::cycle("a -> b -> a").to_string(),
            "Cycle detected in async graph: a -> b -> a"
        );
        assert_eq!(
            GraphError::unknown_node("a", "z", "z").to_string(),
            "Link a -> z references unknown node 'z'"
        );
    }
}
