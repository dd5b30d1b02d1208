//! YAML-based graph definitions
//!
//! ```yaml
//! name: checkout
//! nodes:
//!   charge:
//!     kind: payment
//!   receipt:
//!     kind: email
//!   refund:
//!     kind: payment
//!     mode: raceAndCancel
//! links:
//!   - from: charge
//!     to: receipt
//!   - from: charge
//!     to: refund
//!     mode: error
//! ```

use crate::builder::{AsyncGraphBuilder, NodeSpec};
use crate::error::{GraphError, Result};
use crate::graph::{AsyncGraph, LinkMode, NodeId, NodeMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level YAML graph definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlGraphDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Node definitions keyed by node id
    pub nodes: BTreeMap<NodeId, YamlNodeDef>,

    #[serde(default)]
    pub links: Vec<YamlLinkDef>,
}

/// Node definition in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlNodeDef {
    /// Type tag of the node's operation records
    pub kind: String,

    #[serde(default)]
    pub mode: NodeMode,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Link definition in YAML; `mode` defaults to `next`, `target` to `true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlLinkDef {
    #[serde(alias = "master")]
    pub from: NodeId,

    #[serde(alias = "slave")]
    pub to: NodeId,

    #[serde(default = "default_link_mode")]
    pub mode: LinkMode,

    #[serde(default = "default_target")]
    pub target: bool,
}

fn default_concurrency() -> usize {
    1
}

fn default_link_mode() -> LinkMode {
    LinkMode::Next
}

fn default_target() -> bool {
    true
}

impl YamlGraphDef {
    /// Load graph definition from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse graph definition from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check that every link references a declared node.
    ///
    /// Structural checks beyond that (cycles, self links, concurrency) run
    /// in [`build`](Self::build).
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(GraphError::Validation(format!(
                "Graph '{}' declares no nodes",
                self.name
            )));
        }
        for link in &self.links {
            for end in [&link.from, &link.to] {
                if !self.nodes.contains_key(end) {
                    return Err(GraphError::Validation(format!(
                        "Link {} -> {} references unknown node '{}'",
                        link.from, link.to, end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and convert into a built graph
    pub fn build(&self) -> Result<AsyncGraph> {
        self.validate()?;

        let mut builder = AsyncGraphBuilder::new();
        for (id, node) in &self.nodes {
            let mut spec = NodeSpec::new(node.kind.clone())
                .mode(node.mode)
                .concurrency(node.concurrency);
            if let Some(payload) = &node.payload {
                spec = spec.payload(payload.clone());
            }
            builder.add_node(id.clone(), spec);
        }
        for link in &self.links {
            builder.add_link(link.from.clone(), link.to.clone(), link.mode, link.target);
        }

        tracing::debug!(graph = %self.name, "Building graph from YAML definition");
        builder.build()
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
