//! # async-graph - Dependency graphs over tracked asynchronous operations
//!
//! Compose operations tracked by [`async_store`] into a directed acyclic graph
//! and let an engine fire them as their dependencies resolve.
//!
//! ## Core Concepts
//!
//! - [`AsyncGraphBuilder`] / [`YamlGraphDef`] - declare nodes and typed links,
//!   validated once into an immutable [`AsyncGraph`]
//! - [`NodeMode`] - `race`, `raceAndCancel` or `all` join semantics
//! - [`LinkMode`] - `next`, `error` or `cancel`: which master outcome
//!   activates a link
//! - [`AsyncGraphEngine`] - runs a graph: creates operation records, hands
//!   them to an [`OperationLauncher`] and routes their outcomes
//! - [`RunHandle`] - cancel nodes, watch [`RunEvent`]s and collect the
//!   final [`RunReport`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_graph::{
//!     AsyncGraphBuilder, AsyncGraphEngine, EngineConfig, Launch, NodeMode, NodeSpec, TaskLauncher,
//! };
//! use async_store::{AsyncActionService, ResolvedStatus, StoreConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> async_graph::Result<()> {
//!     let mut builder = AsyncGraphBuilder::new();
//!     builder
//!         .add_node("user", NodeSpec::new("fetch"))
//!         .add_node("posts", NodeSpec::new("fetch"))
//!         .add_node("page", NodeSpec::new("render").mode(NodeMode::All))
//!         .next("user", "page")
//!         .next("posts", "page");
//!     let graph = Arc::new(builder.build()?);
//!
//!     let actions = AsyncActionService::spawn(StoreConfig::default());
//!     let launcher = TaskLauncher::new(|launch: Launch| async move {
//!         Ok::<_, serde_json::Value>(json!(launch.node))
//!     });
//!     let engine = AsyncGraphEngine::new(actions, launcher, EngineConfig::default());
//!
//!     let report = engine.run(graph)?.wait().await?;
//!     assert_eq!(report.status("page"), Some(ResolvedStatus::Success));
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod launcher;
pub mod yaml;

pub use builder::{AsyncGraphBuilder, NodeSpec};
pub use config::EngineConfig;
pub use engine::{
    AsyncGraphEngine, NodeOutcome, NodePhase, NodeReport, NodeResolution, RunEvent, RunHandle,
    RunReport,
};
pub use error::{GraphError, Result};
pub use graph::{AsyncGraph, GraphLink, GraphNode, LinkMode, NodeId, NodeMode};
pub use launcher::{ChannelLauncher, Launch, OperationLauncher, TaskLauncher};
pub use yaml::{YamlGraphDef, YamlLinkDef, YamlNodeDef};
