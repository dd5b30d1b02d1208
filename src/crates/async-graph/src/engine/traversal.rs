//! One run of a graph: firing, resolution and cancellation bookkeeping

use super::{
    NodeOutcome, NodePhase, NodeReport, NodeResolution, RunCommand, RunEvent, RunReport,
    SharedPhases,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{AsyncGraph, GraphLink, NodeMode};
use crate::launcher::{Launch, OperationLauncher};
use async_store::{AsyncActionService, AsyncRecord, RecordStream, ResolvedStatus, StoreError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{StreamExt, StreamMap};

/// Why a node is being settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    /// Its own operations or an explicit cancel decided it
    Direct,
    /// An ancestor was cancelled
    Cascade,
    /// A blocking master of an `all` node ended error or cancel
    FailFast,
}

#[derive(Debug)]
struct OperationRun {
    id: String,
    outcome: Option<(ResolvedStatus, Option<Value>)>,
}

#[derive(Debug)]
struct NodeRun {
    phase: NodePhase,
    fired: bool,
    visit_ref_count: usize,
    satisfied_targets: usize,
    operations: Vec<OperationRun>,
    resolution: Option<NodeResolution>,
}

impl NodeRun {
    fn new() -> Self {
        Self {
            phase: NodePhase::Waiting,
            fired: false,
            visit_ref_count: 0,
            satisfied_targets: 0,
            operations: Vec::new(),
            resolution: None,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self.phase, NodePhase::Resolved(_) | NodePhase::Skipped)
    }
}

pub(crate) struct Traversal {
    run_id: String,
    graph: Arc<AsyncGraph>,
    actions: AsyncActionService,
    launcher: Arc<dyn OperationLauncher>,
    config: EngineConfig,
    events: broadcast::Sender<RunEvent>,
    phases: SharedPhases,
    nodes: Vec<NodeRun>,
    /// Record streams of operations that have not resolved yet
    observed: StreamMap<String, RecordStream>,
    owners: HashMap<String, usize>,
    /// Every record id this run created, in creation order
    created: Vec<String>,
}

impl Traversal {
    pub(crate) fn new(
        run_id: String,
        graph: Arc<AsyncGraph>,
        actions: AsyncActionService,
        launcher: Arc<dyn OperationLauncher>,
        config: EngineConfig,
        events: broadcast::Sender<RunEvent>,
        phases: SharedPhases,
    ) -> Self {
        let nodes = (0..graph.len()).map(|_| NodeRun::new()).collect();
        Self {
            run_id,
            graph,
            actions,
            launcher,
            config,
            events,
            phases,
            nodes,
            observed: StreamMap::new(),
            owners: HashMap::new(),
            created: Vec::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RunCommand>,
    ) -> Result<RunReport> {
        tracing::info!(nodes = self.graph.len(), "Starting graph run");

        let roots: Vec<usize> = self
            .graph
            .roots()
            .into_iter()
            .filter_map(|id| self.graph.index_of(id))
            .collect();
        for root in roots {
            self.fire(root).await?;
        }

        loop {
            if !self.has_pending() {
                break;
            }
            // A pending node always has an unresolved operation under
            // observation; losing every stream means the store task is gone.
            if self.observed.is_empty() {
                tracing::error!("Store closed while nodes were pending");
                return Err(StoreError::Closed.into());
            }

            tokio::select! {
                Some((operation, record)) = self.observed.next() => {
                    self.on_record(operation, record).await?;
                }
                Some(command) = commands.recv() => {
                    self.on_command(command).await?;
                }
                else => continue,
            }
        }

        self.finish()
    }

    fn has_pending(&self) -> bool {
        self.nodes.iter().any(|n| n.phase == NodePhase::Pending)
    }

    fn set_phase(&mut self, index: usize, phase: NodePhase) {
        self.nodes[index].phase = phase;
        let id = &self.graph.node_at(index).id;
        self.phases.write().insert(id.clone(), phase);
    }

    fn emit(&self, event: RunEvent) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }

    /// Create, start and launch the operations of a waiting node
    async fn fire(&mut self, index: usize) -> Result<()> {
        if self.nodes[index].phase != NodePhase::Waiting {
            return Ok(());
        }
        let graph = Arc::clone(&self.graph);
        let node = graph.node_at(index);

        self.nodes[index].fired = true;
        self.set_phase(index, NodePhase::Pending);

        let mut operations = Vec::with_capacity(node.concurrency);
        for i in 0..node.concurrency {
            let id = self
                .config
                .operation_id(&self.run_id, &node.id, i, node.concurrency);
            self.actions
                .create(id.clone(), node.kind.clone(), node.payload.clone())?;
            self.actions.start(id.clone())?;
            let stream = self.actions.select(id.clone()).await?;

            self.observed.insert(id.clone(), stream);
            self.owners.insert(id.clone(), index);
            self.created.push(id.clone());
            self.nodes[index].operations.push(OperationRun {
                id: id.clone(),
                outcome: None,
            });
            operations.push(id);
        }

        tracing::debug!(node = %node.id, operations = operations.len(), "Node fired");
        self.emit(RunEvent::NodeFired {
            node: node.id.clone(),
            operations: operations.clone(),
        });

        for (i, operation) in operations.into_iter().enumerate() {
            self.launcher.launch(Launch {
                run_id: self.run_id.clone(),
                node: node.id.clone(),
                operation,
                index: i,
                kind: node.kind.clone(),
                payload: node.payload.clone(),
                actions: self.actions.clone(),
            });
        }
        Ok(())
    }

    async fn on_record(&mut self, operation: String, record: Option<AsyncRecord>) -> Result<()> {
        let Some(&index) = self.owners.get(&operation) else {
            return Ok(());
        };
        let outcome = match &record {
            None => {
                tracing::debug!(operation = %operation, "Operation deleted while pending");
                (ResolvedStatus::Cancel, None)
            }
            Some(record) => match record.outcome() {
                Some(status) => (status, record.result.clone()),
                None => return Ok(()),
            },
        };

        self.observed.remove(&operation);
        if self.nodes[index].phase != NodePhase::Pending {
            return Ok(());
        }
        if let Some(op) = self.nodes[index]
            .operations
            .iter_mut()
            .find(|op| op.id == operation)
        {
            op.outcome = Some(outcome.clone());
        }

        if let Some(resolution) = self.decide(index, operation, outcome) {
            self.settle(index, resolution, Cause::Direct).await?;
        }
        Ok(())
    }

    /// Combine the outcomes of a node's own operations, `None` while undecided
    fn decide(
        &self,
        index: usize,
        operation: String,
        (status, result): (ResolvedStatus, Option<Value>),
    ) -> Option<NodeResolution> {
        let node = self.graph.node_at(index);
        let run = &self.nodes[index];
        let decided = |status, result| {
            Some(NodeResolution {
                status,
                operation: Some(operation.clone()),
                result,
            })
        };

        match (node.mode, status) {
            (NodeMode::Race | NodeMode::RaceAndCancel, ResolvedStatus::Success)
            | (NodeMode::Race | NodeMode::RaceAndCancel, ResolvedStatus::Error)
            | (NodeMode::All, ResolvedStatus::Error)
            | (NodeMode::All, ResolvedStatus::Cancel) => decided(status, result),
            (NodeMode::Race | NodeMode::RaceAndCancel, ResolvedStatus::Cancel) => {
                let all_cancelled = run
                    .operations
                    .iter()
                    .all(|op| matches!(op.outcome, Some((ResolvedStatus::Cancel, _))));
                if all_cancelled {
                    decided(ResolvedStatus::Cancel, None)
                } else {
                    None
                }
            }
            (NodeMode::All, ResolvedStatus::Success) => {
                let mut results = Vec::with_capacity(run.operations.len());
                for op in &run.operations {
                    match &op.outcome {
                        Some((ResolvedStatus::Success, result)) => {
                            results.push(result.clone().unwrap_or(Value::Null))
                        }
                        _ => return None,
                    }
                }
                let result = if results.len() == 1 {
                    result
                } else {
                    Some(Value::Array(results))
                };
                decided(ResolvedStatus::Success, result)
            }
        }
    }

    async fn on_command(&mut self, command: RunCommand) -> Result<()> {
        match command {
            RunCommand::Cancel(node) => {
                let Some(index) = self.graph.index_of(&node) else {
                    tracing::warn!(node = %node, "Cancel requested for unknown node");
                    return Ok(());
                };
                if self.nodes[index].is_settled() {
                    tracing::debug!(node = %node, "Cancel ignored, node already resolved");
                    return Ok(());
                }
                tracing::info!(node = %node, "Cancelling node");
                self.settle(index, NodeResolution::cancelled(), Cause::Direct)
                    .await
            }
            RunCommand::CancelAll => {
                let pending: Vec<usize> = (0..self.nodes.len())
                    .filter(|&i| self.nodes[i].phase == NodePhase::Pending)
                    .collect();
                tracing::info!(nodes = pending.len(), "Cancelling every pending node");
                for index in pending {
                    if self.nodes[index].phase == NodePhase::Pending {
                        self.settle(index, NodeResolution::cancelled(), Cause::Direct)
                            .await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Resolve a node, then let the consequences ripple through the graph.
    ///
    /// Cascaded cancellations are applied before any outgoing link of the
    /// resolved nodes is evaluated.
    async fn settle(&mut self, index: usize, resolution: NodeResolution, cause: Cause) -> Result<()> {
        let mut queue = VecDeque::from([(index, resolution, cause)]);
        let mut resolved = VecDeque::new();

        loop {
            while let Some((index, resolution, cause)) = queue.pop_front() {
                if self.nodes[index].is_settled() {
                    continue;
                }
                let status = resolution.status;
                self.resolve(index, resolution, cause)?;
                resolved.push_back(index);

                if status == ResolvedStatus::Cancel && cause == Cause::Direct {
                    for descendant in self.graph.descendant_indices(index) {
                        if self.nodes[descendant].phase == NodePhase::Pending {
                            queue.push_back((
                                descendant,
                                NodeResolution::cancelled(),
                                Cause::Cascade,
                            ));
                        }
                    }
                }
            }

            let Some(index) = resolved.pop_front() else {
                break;
            };
            let Some(resolution) = self.nodes[index].resolution.clone() else {
                continue;
            };
            let graph = Arc::clone(&self.graph);
            for link in &graph.node_at(index).links {
                self.visit(link, &resolution, &mut queue).await?;
            }
        }
        Ok(())
    }

    /// Record a node's resolution and bring its operation records in line
    fn resolve(&mut self, index: usize, resolution: NodeResolution, cause: Cause) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let node = graph.node_at(index);

        for op in &self.nodes[index].operations {
            self.observed.remove(&op.id);
        }

        if self.nodes[index].fired {
            let cancel_rest = match (node.mode, resolution.status) {
                (_, ResolvedStatus::Cancel) => true,
                (NodeMode::RaceAndCancel, _) => true,
                (NodeMode::All, ResolvedStatus::Error) => true,
                (NodeMode::Race, _) | (NodeMode::All, ResolvedStatus::Success) => false,
            };
            if cancel_rest {
                for op in self.nodes[index]
                    .operations
                    .iter_mut()
                    .filter(|op| op.outcome.is_none())
                {
                    self.actions.cancel(op.id.clone())?;
                    self.actions.resolve_cancel(op.id.clone())?;
                    op.outcome = Some((ResolvedStatus::Cancel, None));
                    tracing::debug!(operation = %op.id, "Cancelled outstanding operation");
                }
            }
        } else {
            // Never fired: the records exist only to carry the outcome
            for i in 0..node.concurrency {
                let id = self
                    .config
                    .operation_id(&self.run_id, &node.id, i, node.concurrency);
                self.actions
                    .create(id.clone(), node.kind.clone(), node.payload.clone())?;
                match resolution.status {
                    ResolvedStatus::Success => {
                        self.actions.resolve_success(id.clone(), resolution.result.clone())?
                    }
                    ResolvedStatus::Error => {
                        self.actions.resolve_error(id.clone(), resolution.result.clone())?
                    }
                    ResolvedStatus::Cancel => self.actions.resolve_cancel(id.clone())?,
                }
                self.created.push(id.clone());
                self.nodes[index].operations.push(OperationRun {
                    id,
                    outcome: Some((resolution.status, resolution.result.clone())),
                });
            }
        }

        tracing::debug!(
            node = %node.id,
            status = %resolution.status,
            cause = ?cause,
            "Node resolved"
        );
        self.set_phase(index, NodePhase::Resolved(resolution.status));
        self.emit(RunEvent::NodeResolved {
            node: node.id.clone(),
            status: resolution.status,
        });
        self.nodes[index].resolution = Some(resolution);
        Ok(())
    }

    /// Evaluate one outgoing link of a resolved master
    async fn visit(
        &mut self,
        link: &GraphLink,
        master: &NodeResolution,
        queue: &mut VecDeque<(usize, NodeResolution, Cause)>,
    ) -> Result<()> {
        let Some(slave) = self.graph.index_of(&link.slave) else {
            return Ok(());
        };
        let satisfied = link.mode.is_satisfied_by(master.status);
        if satisfied {
            self.nodes[slave].visit_ref_count += 1;
        }
        if self.nodes[slave].phase != NodePhase::Waiting {
            return Ok(());
        }

        let graph = Arc::clone(&self.graph);
        let node = graph.node_at(slave);
        if satisfied {
            if link.target {
                self.nodes[slave].satisfied_targets += 1;
            }
            let ready = match node.mode {
                NodeMode::Race | NodeMode::RaceAndCancel => true,
                NodeMode::All => self.nodes[slave].satisfied_targets >= node.master_ref_count,
            };
            if ready {
                self.fire(slave).await?;
            }
        } else if link.target
            && node.mode == NodeMode::All
            && master.status != ResolvedStatus::Success
        {
            tracing::debug!(
                master = %link.master,
                slave = %link.slave,
                status = %master.status,
                "Blocking master did not succeed, failing join"
            );
            let result = match master.status {
                ResolvedStatus::Error => master.result.clone(),
                _ => None,
            };
            queue.push_back((
                slave,
                NodeResolution {
                    status: master.status,
                    operation: None,
                    result,
                },
                Cause::FailFast,
            ));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<RunReport> {
        for index in 0..self.nodes.len() {
            if self.nodes[index].phase == NodePhase::Waiting {
                self.set_phase(index, NodePhase::Skipped);
                self.emit(RunEvent::NodeSkipped {
                    node: self.graph.node_at(index).id.clone(),
                });
            }
        }

        if self.config.purge_on_finish {
            for id in &self.created {
                self.actions.delete(id.clone())?;
            }
            tracing::debug!(records = self.created.len(), "Purged run records");
        }

        let skipped = self
            .nodes
            .iter()
            .filter(|n| n.phase == NodePhase::Skipped)
            .count();
        tracing::info!(
            nodes = self.nodes.len(),
            skipped,
            "Graph run finished"
        );
        self.emit(RunEvent::Finished {
            run_id: self.run_id.clone(),
        });

        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, run)| {
                let report = NodeReport {
                    outcome: run
                        .resolution
                        .map(NodeOutcome::Resolved)
                        .unwrap_or(NodeOutcome::Skipped),
                    fired: run.fired,
                    visit_ref_count: run.visit_ref_count,
                    operations: run.operations.into_iter().map(|op| op.id).collect(),
                };
                (self.graph.node_at(index).id.clone(), report)
            })
            .collect();

        Ok(RunReport {
            run_id: self.run_id,
            nodes,
        })
    }
}
