// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::JobGraph;
use crate::dag::job::{JobId, WorkflowMessage};
use crate::dag::node_info::{NodeInfo, NodeRunState, NodeState, ScheduledJob};
use crate::dag::scheduler_step::SchedulerStep;
use crate::errors::{JobGraphError, Result};
use crate::types::WorkflowStatus;

/// Counters accumulated over one graph run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub dispatches: u64,
    pub backtracks: u64,
    pub execution_errors: u64,
}

/// Per-run state machine over a snapshot of a job graph.
///
/// It is responsible for:
/// - deciding which pending nodes are ready (every predecessor completed)
/// - recording results as running nodes report back
/// - sending a node and its direct predecessors back to pending when the
///   node reports `INPUT_DATA_ERROR`, carrying the lesson upstream
/// - enforcing the optional per-edge backtrack ceiling
///
/// It performs no IO; `engine::Runtime` drives it.
#[derive(Debug)]
pub struct Scheduler {
    nodes: HashMap<JobId, NodeInfo>,
    /// Scan order for readiness: ascending job id.
    order: Vec<JobId>,
    max_backtracks_per_edge: Option<u32>,
    /// Backtracks per `(predecessor, reporter)` edge. A reporter without
    /// predecessors is keyed against itself.
    edge_backtracks: HashMap<(JobId, JobId), u32>,
    stats: RunStats,
}

impl Scheduler {
    /// Capture `graph` for a run. Every node starts pending.
    ///
    /// Fails with `NotADag` on a cycle and `Structural` if a node lacks its
    /// job or expert.
    pub fn from_graph(graph: &JobGraph, max_backtracks_per_edge: Option<u32>) -> Result<Self> {
        graph.topological_order()?;

        let mut nodes = HashMap::with_capacity(graph.node_count());
        let mut order = Vec::with_capacity(graph.node_count());
        for id in graph.nodes() {
            let (Some(job), Some(expert_id)) = (graph.job(id), graph.expert_id(id)) else {
                return Err(JobGraphError::Structural(format!(
                    "node {id} has no job or no assigned expert"
                )));
            };
            let info = NodeInfo::new(
                id.to_string(),
                job.clone(),
                expert_id.to_string(),
                graph.predecessors(id).to_vec(),
            );
            nodes.insert(id.to_string(), info);
            order.push(id.to_string());
        }

        Ok(Self {
            nodes,
            order,
            max_backtracks_per_edge,
            edge_backtracks: HashMap::new(),
            stats: RunStats::default(),
        })
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn state_of(&self, id: &str) -> NodeRunState {
        self.nodes.get(id).map(|n| n.state).into()
    }

    pub fn result_of(&self, id: &str) -> Option<&WorkflowMessage> {
        self.nodes.get(id)?.result.as_ref()
    }

    pub fn attempts_of(&self, id: &str) -> u32 {
        self.nodes.get(id).map(|n| n.attempts).unwrap_or(0)
    }

    pub fn has_pending(&self) -> bool {
        self.nodes.values().any(|n| n.state == NodeState::Pending)
    }

    pub fn running_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.state == NodeState::Running)
            .count()
    }

    /// Every node holds a result.
    pub fn is_finished(&self) -> bool {
        self.nodes.values().all(|n| n.state == NodeState::Completed)
    }

    /// Pending nodes whose predecessors have all completed, marked running
    /// and returned ready for dispatch.
    pub fn collect_ready(&mut self) -> Vec<ScheduledJob> {
        // Decide first, then mutate, so one pass sees a consistent snapshot.
        let ready: Vec<JobId> = self
            .order
            .iter()
            .filter(|id| self.is_ready(id))
            .cloned()
            .collect();

        let mut scheduled = Vec::with_capacity(ready.len());
        for id in ready {
            let predecessor_results = self.predecessor_results(&id);
            let Some(info) = self.nodes.get_mut(&id) else {
                continue;
            };

            for lesson in info.pending_lessons.drain(..) {
                info.job.add_lesson(&lesson);
            }
            info.state = NodeState::Running;
            info.attempts += 1;
            self.stats.dispatches += 1;

            if info.attempts > 1 {
                info!(job_id = %id, expert_id = %info.expert_id, attempt = info.attempts, "re-dispatching job");
            } else {
                info!(job_id = %id, expert_id = %info.expert_id, "dispatching job");
            }

            scheduled.push(ScheduledJob {
                job_id: id.clone(),
                expert_id: info.expert_id.clone(),
                job: info.job.clone(),
                predecessor_results,
                attempt: info.attempts,
            });
        }
        scheduled
    }

    /// Handle a result reported by a running node.
    pub fn handle_completion(&mut self, id: &str, result: WorkflowMessage) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.nodes.get(id).map(|n| n.state) {
            Some(NodeState::Running) => {}
            Some(state) => {
                warn!(job_id = %id, ?state, "completion for a node that is not running; ignoring");
                return step;
            }
            None => {
                warn!(job_id = %id, "completion for unknown node; ignoring");
                return step;
            }
        }

        if result.status == WorkflowStatus::InputDataError {
            if self.backtrack(id, &result, &mut step) {
                step.run_just_finished = self.is_finished();
                return step;
            }
            step.ceiling_hit = true;
        }

        self.record(id, result);
        step.recorded = Some(id.to_string());
        step.run_just_finished = self.is_finished();
        if step.run_just_finished {
            info!(nodes = self.nodes.len(), "all jobs completed");
        }
        step
    }

    fn is_ready(&self, id: &str) -> bool {
        let Some(info) = self.nodes.get(id) else {
            return false;
        };
        info.state == NodeState::Pending
            && info.preds.iter().all(|p| {
                self.nodes
                    .get(p)
                    .is_none_or(|pred| pred.state == NodeState::Completed)
            })
    }

    fn predecessor_results(&self, id: &str) -> Vec<WorkflowMessage> {
        let Some(info) = self.nodes.get(id) else {
            return Vec::new();
        };
        info.preds
            .iter()
            .filter_map(|p| self.nodes.get(p)?.result.clone())
            .collect()
    }

    fn record(&mut self, id: &str, result: WorkflowMessage) {
        let Some(info) = self.nodes.get_mut(id) else {
            return;
        };
        if result.status == WorkflowStatus::ExecutionError {
            self.stats.execution_errors += 1;
            warn!(job_id = %id, error = %result.scratchpad, "job ended with an execution error");
        } else {
            debug!(job_id = %id, status = %result.status, "job completed");
        }
        info.state = NodeState::Completed;
        info.result = Some(result);
    }

    /// Send `id` and its direct predecessors back to pending.
    ///
    /// Returns `false` without changing anything when an edge involved has
    /// used up its backtrack budget.
    fn backtrack(&mut self, id: &str, result: &WorkflowMessage, step: &mut SchedulerStep) -> bool {
        let lesson = result.lesson_or_default().to_string();
        let preds = self
            .nodes
            .get(id)
            .map(|n| n.preds.clone())
            .unwrap_or_default();

        let edges: Vec<(JobId, JobId)> = if preds.is_empty() {
            vec![(id.to_string(), id.to_string())]
        } else {
            preds.iter().map(|p| (p.clone(), id.to_string())).collect()
        };

        if let Some(max) = self.max_backtracks_per_edge {
            if let Some((pred, _)) = edges
                .iter()
                .find(|edge| self.edge_backtracks.get(*edge).copied().unwrap_or(0) >= max)
            {
                warn!(
                    job_id = %id,
                    predecessor = %pred,
                    max_backtracks = max,
                    "backtrack ceiling reached; keeping INPUT_DATA_ERROR as final result"
                );
                return false;
            }
        }

        for edge in edges {
            *self.edge_backtracks.entry(edge).or_insert(0) += 1;
        }
        self.stats.backtracks += 1;

        if let Some(info) = self.nodes.get_mut(id) {
            info.state = NodeState::Pending;
            info.result = None;
            if preds.is_empty() {
                info.pending_lessons.push(lesson.clone());
            }
        }
        step.requeued.push(id.to_string());

        for pred in &preds {
            let Some(info) = self.nodes.get_mut(pred) else {
                continue;
            };
            match info.state {
                NodeState::Completed => {
                    info.state = NodeState::Pending;
                    info.result = None;
                    step.requeued.push(pred.clone());
                    step.cleared.push(pred.clone());
                }
                NodeState::Running => step.lesson_only.push(pred.clone()),
                NodeState::Pending => {}
            }
            info.pending_lessons.push(lesson.clone());
        }

        info!(
            job_id = %id,
            predecessors = ?preds,
            lesson = %lesson,
            "input data error; re-running predecessors"
        );
        true
    }
}
