// src/dag/job.rs

//! Jobs and the results experts hand back for them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::WorkflowStatus;

/// Identifier of a job (and of the graph node carrying it).
pub type JobId = String;

/// Number of times a job may be pushed back for further decomposition.
pub const DEFAULT_LIFE_CYCLE: u32 = 3;

pub const DEFAULT_OUTPUT_SCHEMA: &str = "Output schema is not determined.";

/// Lesson attached to an `INPUT_DATA_ERROR` that came back without one.
pub const DEFAULT_INPUT_DATA_LESSON: &str = "The output data is not valid";

/// A unit of work: a goal plus the textual context needed to reach it.
///
/// A job produced by decomposition (a "sub-job") additionally records the
/// job it was split from in `original_job_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub session_id: String,
    pub goal: String,
    pub context: String,
    pub output_schema: String,
    pub life_cycle: u32,
    /// Set by the caller to skip planning and hand the job to one expert.
    pub assigned_expert_name: Option<String>,
    pub original_job_id: Option<JobId>,
    /// Planner reasoning kept for diagnostics.
    pub thinking: Option<String>,
}

impl Job {
    /// New top-level job with fresh job and session ids.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: Uuid::new_v4().to_string(),
            goal: goal.into(),
            context: String::new(),
            output_schema: DEFAULT_OUTPUT_SCHEMA.to_string(),
            life_cycle: DEFAULT_LIFE_CYCLE,
            assigned_expert_name: None,
            original_job_id: None,
            thinking: None,
        }
    }

    /// Sub-job split out of `parent`. Shares the parent's session.
    pub fn subjob(parent: &Job, goal: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: parent.session_id.clone(),
            goal: goal.into(),
            context: context.into(),
            output_schema: DEFAULT_OUTPUT_SCHEMA.to_string(),
            life_cycle: parent.life_cycle,
            assigned_expert_name: None,
            original_job_id: Some(parent.id.clone()),
            thinking: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_assigned_expert(mut self, name: impl Into<String>) -> Self {
        self.assigned_expert_name = Some(name.into());
        self
    }

    pub fn is_subjob(&self) -> bool {
        self.original_job_id.is_some()
    }

    /// Append a lesson to the context, one per line.
    pub fn add_lesson(&mut self, lesson: &str) {
        if !self.context.is_empty() {
            self.context.push('\n');
        }
        self.context.push_str(lesson);
    }
}

/// Result of one expert execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub status: WorkflowStatus,
    /// Free-text deliverable.
    pub scratchpad: String,
    pub evaluation: String,
    pub lesson: Option<String>,
}

impl WorkflowMessage {
    pub fn new(status: WorkflowStatus, scratchpad: impl Into<String>) -> Self {
        Self {
            status,
            scratchpad: scratchpad.into(),
            evaluation: String::new(),
            lesson: None,
        }
    }

    pub fn success(scratchpad: impl Into<String>) -> Self {
        Self::new(WorkflowStatus::Success, scratchpad)
    }

    pub fn input_data_error(lesson: impl Into<String>) -> Self {
        let lesson = lesson.into();
        Self {
            status: WorkflowStatus::InputDataError,
            scratchpad: String::new(),
            evaluation: lesson.clone(),
            lesson: Some(lesson),
        }
    }

    /// Synthesized by the engine when an expert call fails outright.
    pub fn execution_error(detail: impl Into<String>) -> Self {
        Self::new(WorkflowStatus::ExecutionError, detail)
    }

    pub fn with_evaluation(mut self, evaluation: impl Into<String>) -> Self {
        self.evaluation = evaluation.into();
        self
    }

    pub fn with_lesson(mut self, lesson: impl Into<String>) -> Self {
        self.lesson = Some(lesson.into());
        self
    }

    /// Lesson to feed back upstream, falling back to a generic one.
    pub fn lesson_or_default(&self) -> &str {
        match self.lesson.as_deref() {
            Some(lesson) if !lesson.trim().is_empty() => lesson,
            _ => DEFAULT_INPUT_DATA_LESSON,
        }
    }
}
