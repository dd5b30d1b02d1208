//! Graph model: nodes, typed links and join/race modes
//!
//! An [`AsyncGraph`] is a directed acyclic graph of [`GraphNode`]s connected
//! by [`GraphLink`]s. Each node stands for one logical operation, backed by
//! `concurrency` physical operation records once it fires.
//!
//! ```text
//!            next (target)          next (target)
//!   fetch ─────────────────▶ parse ───────────────▶ save     mode: all
//!     │                                              ▲
//!     │ error                                        │ next (target)
//!     ▼                                   audit ─────┘
//!   fallback
//! ```
//!
//! - [`NodeMode`] decides when a node fires and how its own operations
//!   combine into the node's resolution.
//! - [`LinkMode`] decides which outcome of the master activates the link.
//! - `target = true` links are blocking dependencies that count toward the
//!   slave's join threshold ([`GraphNode::master_ref_count`]).
//!
//! Topology is immutable once built (see [`AsyncGraphBuilder`](crate::AsyncGraphBuilder)).
//! Run-time counters live in the engine, one fresh set per run.

use async_store::ResolvedStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Node identifier, unique within a graph
pub type NodeId = String;

/// How a node fires and resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeMode {
    /// Fire on the first satisfied incoming link; the first own operation to
    /// succeed or fail decides the node. Losers keep running.
    #[default]
    Race,
    /// Like [`NodeMode::Race`], but losers still pending are cancelled.
    RaceAndCancel,
    /// Fire once every blocking predecessor succeeded; fail fast when one of
    /// them errors or is cancelled. Every own operation must succeed.
    All,
}

/// Which master outcome activates a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkMode {
    Next,
    Error,
    Cancel,
}

impl LinkMode {
    /// Whether a master resolved with `outcome` activates this link
    pub fn is_satisfied_by(self, outcome: ResolvedStatus) -> bool {
        matches!(
            (self, outcome),
            (LinkMode::Next, ResolvedStatus::Success)
                | (LinkMode::Error, ResolvedStatus::Error)
                | (LinkMode::Cancel, ResolvedStatus::Cancel)
        )
    }
}

/// Directed edge `master -> slave`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub master: NodeId,
    pub slave: NodeId,
    pub mode: LinkMode,
    /// Counts toward the slave's join threshold when `true`
    pub target: bool,
}

/// A composition point over one logical operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    /// Type tag given to the node's operation records
    pub kind: String,
    pub mode: NodeMode,
    /// Number of physical operations created when the node fires
    pub concurrency: usize,
    /// Handed to the node's operations when fired
    pub payload: Option<Value>,
    /// Outgoing links, in declaration order
    pub links: Vec<GraphLink>,
    /// Number of incoming `target = true` links
    pub master_ref_count: usize,
}

/// Validated, immutable dependency graph
#[derive(Debug, Clone)]
pub struct AsyncGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeId, usize>,
    incoming: Vec<Vec<GraphLink>>,
}

impl AsyncGraph {
    /// Assemble a graph from already validated nodes.
    pub(crate) fn from_parts(nodes: Vec<GraphNode>) -> Self {
        let index: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        let mut incoming = vec![Vec::new(); nodes.len()];
        for link in nodes.iter().flat_map(|n| n.links.iter()) {
            if let Some(&slave) = index.get(&link.slave) {
                incoming[slave].push(link.clone());
            }
        }
        Self {
            nodes,
            index,
            incoming,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Incoming links of a node
    pub fn incoming(&self, id: &str) -> &[GraphLink] {
        self.index
            .get(id)
            .map(|&i| self.incoming[i].as_slice())
            .unwrap_or(&[])
    }

    /// Every link in the graph
    pub fn links(&self) -> impl Iterator<Item = &GraphLink> {
        self.nodes.iter().flat_map(|n| n.links.iter())
    }

    /// Nodes without incoming links; they fire as soon as a run starts
    pub fn roots(&self) -> Vec<&NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.incoming[*i].is_empty())
            .map(|(_, n)| &n.id)
            .collect()
    }

    /// Every node reachable from `id` through any link, breadth first.
    /// `id` itself is not included.
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        self.index
            .get(id)
            .map(|&i| {
                self.descendant_indices(i)
                    .into_iter()
                    .map(|d| self.nodes[d].id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node ids ordered so that every master precedes its slaves
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(self.nodes[i].id.clone());
            for slave in self.slave_indices(i) {
                in_degree[slave] = in_degree[slave].saturating_sub(1);
                if in_degree[slave] == 0 {
                    queue.push_back(slave);
                }
            }
        }
        order
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    /// Slave index of every outgoing link of a node, one entry per link
    pub(crate) fn slave_indices(&self, index: usize) -> Vec<usize> {
        self.nodes[index]
            .links
            .iter()
            .filter_map(|link| self.index.get(&link.slave).copied())
            .collect()
    }

    pub(crate) fn descendant_indices(&self, index: usize) -> Vec<usize> {
        let mut seen = HashSet::from([index]);
        let mut queue = VecDeque::from([index]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for slave in self.slave_indices(current) {
                if seen.insert(slave) {
                    found.push(slave);
                    queue.push_back(slave);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AsyncGraphBuilder, NodeSpec};

    fn diamond() -> AsyncGraph {
        let mut builder = AsyncGraphBuilder::new();
        builder
            .add_node("a", NodeSpec::new("fetch"))
            .add_node("b", NodeSpec::new("fetch"))
            .add_node("c", NodeSpec::new("fetch"))
            .add_node("d", NodeSpec::new("merge").mode(NodeMode::All))
            .next("a", "b")
            .next("a", "c")
            .next("b", "d")
            .next("c", "d");
        builder.build().unwrap()
    }

    #[test]
    fn test_link_mode_satisfaction() {
        assert!(LinkMode::Next.is_satisfied_by(ResolvedStatus::Success));
        assert!(!LinkMode::Next.is_satisfied_by(ResolvedStatus::Error));
        assert!(LinkMode::Error.is_satisfied_by(ResolvedStatus::Error));
        assert!(!LinkMode::Error.is_satisfied_by(ResolvedStatus::Cancel));
        assert!(LinkMode::Cancel.is_satisfied_by(ResolvedStatus::Cancel));
        assert!(!LinkMode::Cancel.is_satisfied_by(ResolvedStatus::Success));
    }

    #[test]
    fn test_roots_and_incoming() {
        let graph = diamond();
        assert_eq!(graph.roots(), vec!["a"]);
        assert_eq!(graph.incoming("d").len(), 2);
        assert!(graph.incoming("missing").is_empty());
        assert_eq!(graph.node("d").unwrap().master_ref_count, 2);
    }

    #[test]
    fn test_descendants_visit_each_node_once() {
        let graph = diamond();
        let mut descendants = graph.descendants("a");
        descendants.sort();
        assert_eq!(descendants, vec!["b", "c", "d"]);
        assert!(graph.descendants("d").is_empty());
    }

    #[test]
    fn test_topological_order() {
        let graph = diamond();
        let order = graph.topological_order();
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_value(NodeMode::RaceAndCancel).unwrap(),
            serde_json::json!("raceAndCancel")
        );
        assert_eq!(
            serde_json::from_value::<LinkMode>(serde_json::json!("error")).unwrap(),
            LinkMode::Error
        );
    }
}
