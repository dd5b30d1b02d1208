//! Graph engine: runs a declared graph against the operation store
//!
//! [`AsyncGraphEngine::run`] starts one traversal task per run. The task
//! fires root nodes, watches the records of every operation it started, and
//! reacts to each resolution by evaluating the resolved node's outgoing
//! links:
//!
//! ```text
//!   fire(node) ──▶ create + start records ──▶ launcher.launch(..)
//!        ▲                                          │ external work
//!        │                                          ▼
//!   visit(slave) ◀── links of node ◀── node resolved ◀── resolve* via facade
//! ```
//!
//! # Firing rules
//!
//! - `race` / `raceAndCancel` nodes fire on the first satisfied incoming link.
//! - `all` nodes fire once satisfied `target` links reach
//!   [`master_ref_count`](crate::GraphNode::master_ref_count), and fail fast
//!   when a `target` master ends `error` or `cancel` without satisfying its
//!   link.
//! - A node fires at most once per run, however many links reach it.
//!
//! # Cancellation
//!
//! Cancelling a node (explicitly, or because its own operations all ended
//! cancelled) resolves every still-pending descendant as cancelled, then
//! activates the `cancel` links of every node cancelled this way. Resolved
//! descendants keep their outcome. Cancellation is cooperative: the engine
//! resolves records as cancelled and stops observing them, the external work
//! has to notice on its own.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_graph::{AsyncGraphBuilder, AsyncGraphEngine, EngineConfig, Launch, NodeSpec};
//! use async_store::{AsyncActionService, StoreConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> async_graph::Result<()> {
//!     let mut builder = AsyncGraphBuilder::new();
//!     builder
//!         .add_node("fetch", NodeSpec::new("http"))
//!         .add_node("render", NodeSpec::new("ui"))
//!         .next("fetch", "render");
//!     let graph = Arc::new(builder.build()?);
//!
//!     let actions = AsyncActionService::spawn(StoreConfig::default());
//!     let engine = AsyncGraphEngine::new(
//!         actions,
//!         |launch: Launch| {
//!             let _ = launch.succeed(Some(json!({"node": launch.node})));
//!         },
//!         EngineConfig::default(),
//!     );
//!
//!     let report = engine.run(graph)?.wait().await?;
//!     assert!(report.fired("render"));
//!     Ok(())
//! }
//! ```

mod traversal;

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{AsyncGraph, NodeId};
use crate::launcher::OperationLauncher;
use async_store::{AsyncActionService, ResolvedStatus};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;
use traversal::Traversal;

const EVENT_CAPACITY: usize = 1024;

/// Where a node stands within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "phase", content = "status")]
pub enum NodePhase {
    /// Not fired yet
    Waiting,
    /// Fired, waiting for its operations
    Pending,
    Resolved(ResolvedStatus),
    /// The run finished before the node could fire
    Skipped,
}

/// How a node resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResolution {
    pub status: ResolvedStatus,
    /// Operation that decided the node, if any
    pub operation: Option<String>,
    pub result: Option<Value>,
}

impl NodeResolution {
    pub(crate) fn cancelled() -> Self {
        Self {
            status: ResolvedStatus::Cancel,
            operation: None,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeOutcome {
    Resolved(NodeResolution),
    Skipped,
}

/// Final state of one node in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub outcome: NodeOutcome,
    /// Whether the node's operations were created and started
    pub fired: bool,
    /// Satisfied incoming links that reached the node
    pub visit_ref_count: usize,
    /// Ids of the operation records the node owned
    pub operations: Vec<String>,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub nodes: HashMap<NodeId, NodeReport>,
}

impl RunReport {
    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.get(id)
    }

    /// Resolution status of a node, `None` if it was skipped or is unknown
    pub fn status(&self, id: &str) -> Option<ResolvedStatus> {
        match &self.nodes.get(id)?.outcome {
            NodeOutcome::Resolved(resolution) => Some(resolution.status),
            NodeOutcome::Skipped => None,
        }
    }

    pub fn resolution(&self, id: &str) -> Option<&NodeResolution> {
        match &self.nodes.get(id)?.outcome {
            NodeOutcome::Resolved(resolution) => Some(resolution),
            NodeOutcome::Skipped => None,
        }
    }

    pub fn fired(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.fired)
    }

    pub fn is_skipped(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.outcome == NodeOutcome::Skipped)
    }
}

/// Progress notifications of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEvent {
    NodeFired {
        node: NodeId,
        operations: Vec<String>,
    },
    NodeResolved {
        node: NodeId,
        status: ResolvedStatus,
    },
    NodeSkipped {
        node: NodeId,
    },
    Finished {
        run_id: String,
    },
}

#[derive(Debug)]
pub(crate) enum RunCommand {
    Cancel(NodeId),
    CancelAll,
}

pub(crate) type SharedPhases = Arc<RwLock<HashMap<NodeId, NodePhase>>>;

/// Drives graphs through an [`AsyncActionService`]
#[derive(Clone)]
pub struct AsyncGraphEngine {
    actions: AsyncActionService,
    launcher: Arc<dyn OperationLauncher>,
    config: EngineConfig,
}

impl AsyncGraphEngine {
    pub fn new(
        actions: AsyncActionService,
        launcher: impl OperationLauncher + 'static,
        config: EngineConfig,
    ) -> Self {
        Self {
            actions,
            launcher: Arc::new(launcher),
            config,
        }
    }

    pub fn actions(&self) -> &AsyncActionService {
        &self.actions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a traversal of `graph` with fresh run-time counters.
    ///
    /// Fails with [`GraphError::InvalidNode`] when a node id contains the
    /// operation id separator, since its operation ids could collide with
    /// another node's. Must be called from within a Tokio runtime.
    pub fn run(&self, graph: Arc<AsyncGraph>) -> Result<RunHandle> {
        let separator = &self.config.op_id_separator;
        if let Some(node) = graph
            .nodes()
            .iter()
            .find(|n| n.id.contains(separator.as_str()))
        {
            return Err(GraphError::invalid_node(
                node.id.clone(),
                format!("node id cannot contain the operation id separator '{separator}'"),
            ));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, first_events) = broadcast::channel(EVENT_CAPACITY);
        let phases: SharedPhases = Arc::new(RwLock::new(
            graph
                .nodes()
                .iter()
                .map(|n| (n.id.clone(), NodePhase::Waiting))
                .collect(),
        ));

        let traversal = Traversal::new(
            run_id.clone(),
            graph,
            self.actions.clone(),
            Arc::clone(&self.launcher),
            self.config.clone(),
            events.clone(),
            Arc::clone(&phases),
        );
        let span = tracing::info_span!("graph_run", run = %run_id);
        let task = tokio::spawn(traversal.run(command_rx).instrument(span));

        Ok(RunHandle {
            run_id,
            commands,
            events,
            first_events: Some(first_events),
            phases,
            task,
        })
    }
}

impl std::fmt::Debug for AsyncGraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGraphEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Control and observation handle for one run
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    commands: mpsc::UnboundedSender<RunCommand>,
    events: broadcast::Sender<RunEvent>,
    first_events: Option<broadcast::Receiver<RunEvent>>,
    phases: SharedPhases,
    task: JoinHandle<Result<RunReport>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Cancel a node: a pending node has its operations resolved as
    /// cancelled, a node that has not fired yet will never fire. Cancelling
    /// a resolved node is a no-op.
    pub fn cancel(&self, node: impl Into<NodeId>) -> Result<()> {
        self.send(RunCommand::Cancel(node.into()))
    }

    /// Cancel every node pending at the time the command is processed
    pub fn cancel_all(&self) -> Result<()> {
        self.send(RunCommand::CancelAll)
    }

    fn send(&self, command: RunCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| GraphError::RunClosed(self.run_id.clone()))
    }

    /// Event stream of the run.
    ///
    /// The first call returns a receiver that has seen every event since the
    /// run started; later calls only see events from that point on.
    pub fn subscribe(&mut self) -> broadcast::Receiver<RunEvent> {
        self.first_events
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Current phase of a node
    pub fn phase(&self, node: &str) -> Option<NodePhase> {
        self.phases.read().get(node).copied()
    }

    /// Current phase of every node
    pub fn phases(&self) -> HashMap<NodeId, NodePhase> {
        self.phases.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| GraphError::Execution(e.to_string()))?
    }
}
