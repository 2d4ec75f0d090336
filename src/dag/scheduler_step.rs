// src/dag/scheduler_step.rs

//! Result type for a single completion handled by the scheduler.

use crate::dag::job::JobId;

/// What changed when one running node reported back.
///
/// The runtime uses it to mirror the change into the shared job graph; tests
/// use it to assert on backtracking without running anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Node whose result was recorded as final for this attempt.
    pub recorded: Option<JobId>,
    /// Nodes moved back to pending (the reporting node first).
    pub requeued: Vec<JobId>,
    /// Predecessors whose stored result was discarded.
    pub cleared: Vec<JobId>,
    /// Running predecessors that only received the lesson.
    pub lesson_only: Vec<JobId>,
    /// An `INPUT_DATA_ERROR` hit the backtrack ceiling and was kept as final.
    pub ceiling_hit: bool,
    /// Every node now holds a result.
    pub run_just_finished: bool,
}
