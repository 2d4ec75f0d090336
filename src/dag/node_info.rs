// src/dag/node_info.rs

//! Per-run node state and the dispatch descriptor handed to the runtime.

use crate::dag::job::{Job, JobId, WorkflowMessage};

/// Per-run state of a node (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting for predecessors, or sent back by a backtrack.
    Pending,
    /// Dispatched to its expert.
    Running,
    /// Holds a result for this run.
    Completed,
}

/// Public, read-only view of a node's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRunState {
    /// The node is not part of the graph being run.
    Unknown,
    Pending,
    Running,
    Completed,
}

impl From<Option<NodeState>> for NodeRunState {
    fn from(state: Option<NodeState>) -> Self {
        match state {
            None => NodeRunState::Unknown,
            Some(NodeState::Pending) => NodeRunState::Pending,
            Some(NodeState::Running) => NodeRunState::Running,
            Some(NodeState::Completed) => NodeRunState::Completed,
        }
    }
}

/// Static node information captured from the graph, plus per-run state.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: JobId,
    /// The job as it will be dispatched next, lessons included.
    pub job: Job,
    pub expert_id: String,
    /// Direct predecessors, in graph order.
    pub preds: Vec<JobId>,
    pub state: NodeState,
    pub result: Option<WorkflowMessage>,
    /// Lessons received since the last dispatch.
    pub pending_lessons: Vec<String>,
    /// How many times this node has been dispatched.
    pub attempts: u32,
}

impl NodeInfo {
    pub fn new(id: JobId, job: Job, expert_id: String, preds: Vec<JobId>) -> Self {
        Self {
            id,
            job,
            expert_id,
            preds,
            state: NodeState::Pending,
            result: None,
            pending_lessons: Vec::new(),
            attempts: 0,
        }
    }
}

/// A node the scheduler wants the runtime to execute now.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: JobId,
    pub expert_id: String,
    pub job: Job,
    /// Results of the direct predecessors, in graph order.
    pub predecessor_results: Vec<WorkflowMessage>,
    /// 1 for the first dispatch, incremented on every re-dispatch.
    pub attempt: u32,
}
