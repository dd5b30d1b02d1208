//! Graph construction and structural validation
//!
//! [`AsyncGraphBuilder`] collects nodes and links, then [`build`](AsyncGraphBuilder::build)
//! validates the topology once and freezes it into an [`AsyncGraph`].
//!
//! # Example
//!
//! ```rust
//! use async_graph::{AsyncGraphBuilder, LinkMode, NodeMode, NodeSpec};
//! use serde_json::json;
//!
//! let mut builder = AsyncGraphBuilder::new();
//! builder
//!     .add_node("user", NodeSpec::new("fetch").payload(json!({"url": "/user"})))
//!     .add_node("posts", NodeSpec::new("fetch"))
//!     .add_node("fallback", NodeSpec::new("cache"))
//!     .add_node("render", NodeSpec::new("render").mode(NodeMode::All))
//!     .next("user", "posts")
//!     .on_error("user", "fallback")
//!     .next("posts", "render")
//!     .add_link("fallback", "render", LinkMode::Next, false);
//!
//! let graph = builder.build().unwrap();
//! assert_eq!(graph.node("render").unwrap().master_ref_count, 1);
//! ```

use crate::error::{GraphError, Result};
use crate::graph::{AsyncGraph, GraphLink, GraphNode, LinkMode, NodeId, NodeMode};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Declaration of a node before the graph is built
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub kind: String,
    pub mode: NodeMode,
    pub concurrency: usize,
    pub payload: Option<Value>,
}

impl NodeSpec {
    /// A race-mode node owning one operation of the given type
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            mode: NodeMode::Race,
            concurrency: 1,
            payload: None,
        }
    }

    pub fn mode(mut self, mode: NodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Mutable collection of nodes and links, validated by [`build`](Self::build)
#[derive(Debug, Clone, Default)]
pub struct AsyncGraphBuilder {
    nodes: Vec<(NodeId, NodeSpec)>,
    links: Vec<GraphLink>,
}

impl AsyncGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, spec: NodeSpec) -> &mut Self {
        self.nodes.push((id.into(), spec));
        self
    }

    /// Add a link with an explicit mode and target flag
    pub fn add_link(
        &mut self,
        master: impl Into<NodeId>,
        slave: impl Into<NodeId>,
        mode: LinkMode,
        target: bool,
    ) -> &mut Self {
        self.links.push(GraphLink {
            master: master.into(),
            slave: slave.into(),
            mode,
            target,
        });
        self
    }

    /// Blocking `next` link: `slave` depends on `master` succeeding
    pub fn next(&mut self, master: impl Into<NodeId>, slave: impl Into<NodeId>) -> &mut Self {
        self.add_link(master, slave, LinkMode::Next, true)
    }

    /// `error` link: route a failure of `master` to `slave`
    pub fn on_error(&mut self, master: impl Into<NodeId>, slave: impl Into<NodeId>) -> &mut Self {
        self.add_link(master, slave, LinkMode::Error, true)
    }

    /// `cancel` link: run `slave` when `master` is cancelled
    pub fn on_cancel(&mut self, master: impl Into<NodeId>, slave: impl Into<NodeId>) -> &mut Self {
        self.add_link(master, slave, LinkMode::Cancel, true)
    }

    /// Validate and freeze the graph.
    ///
    /// # Errors
    ///
    /// - [`GraphError::EmptyGraph`] when no node was added
    /// - [`GraphError::DuplicateNode`] when two nodes share an id
    /// - [`GraphError::InvalidNode`] for an empty id or zero concurrency
    /// - [`GraphError::UnknownNode`] when a link references a missing node
    /// - [`GraphError::SelfLink`] when a node links to itself
    /// - [`GraphError::CycleDetected`] when the links form a cycle
    pub fn build(self) -> Result<AsyncGraph> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let mut ids = HashSet::with_capacity(self.nodes.len());
        for (id, spec) in &self.nodes {
            if id.trim().is_empty() {
                return Err(GraphError::invalid_node(id, "node id cannot be empty"));
            }
            if !ids.insert(id.as_str()) {
                return Err(GraphError::DuplicateNode(id.clone()));
            }
            if spec.concurrency == 0 {
                return Err(GraphError::invalid_node(
                    id,
                    "concurrency must be at least 1",
                ));
            }
        }

        for link in &self.links {
            for end in [&link.master, &link.slave] {
                if !ids.contains(end.as_str()) {
                    return Err(GraphError::unknown_node(&link.master, &link.slave, end));
                }
            }
            if link.master == link.slave {
                return Err(GraphError::SelfLink(link.master.clone()));
            }
        }

        check_acyclic(&self.nodes, &self.links)?;

        let mut outgoing: HashMap<&str, Vec<GraphLink>> = HashMap::new();
        let mut master_refs: HashMap<&str, usize> = HashMap::new();
        for link in &self.links {
            outgoing
                .entry(link.master.as_str())
                .or_default()
                .push(link.clone());
            if link.target {
                *master_refs.entry(link.slave.as_str()).or_insert(0) += 1;
            }
        }

        let nodes = self
            .nodes
            .iter()
            .map(|(id, spec)| GraphNode {
                id: id.clone(),
                kind: spec.kind.clone(),
                mode: spec.mode,
                concurrency: spec.concurrency,
                payload: spec.payload.clone(),
                links: outgoing.remove(id.as_str()).unwrap_or_default(),
                master_ref_count: master_refs.get(id.as_str()).copied().unwrap_or(0),
            })
            .collect();

        let graph = AsyncGraph::from_parts(nodes);
        tracing::debug!(nodes = graph.len(), links = self.links.len(), "Built async graph");
        Ok(graph)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search reporting the first cycle found as `a -> b -> a`.
fn check_acyclic(nodes: &[(NodeId, NodeSpec)], links: &[GraphLink]) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in links {
        adjacency
            .entry(link.master.as_str())
            .or_default()
            .push(link.slave.as_str());
    }

    let mut marks: HashMap<&str, Mark> = nodes
        .iter()
        .map(|(id, _)| (id.as_str(), Mark::Unvisited))
        .collect();

    for (id, _) in nodes {
        if marks.get(id.as_str()) == Some(&Mark::Unvisited) {
            let mut path = Vec::new();
            visit(id.as_str(), &adjacency, &mut marks, &mut path)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    marks.insert(node, Mark::InProgress);
    path.push(node);

    for &next in adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]) {
        match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
            Mark::InProgress => {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(next);
                return Err(GraphError::cycle(cycle.join(" -> ")));
            }
            Mark::Unvisited => visit(next, adjacency, marks, path)?,
            Mark::Done => {}
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    Ok(())
}
