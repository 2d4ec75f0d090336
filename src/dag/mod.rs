// src/dag/mod.rs

//! Job graph representation and scheduling.
//!
//! - [`job`] holds jobs and the results experts return for them.
//! - [`graph`] is the adjacency-map job graph.
//! - [`surgery`] splices subgraphs into a job graph.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs are ready and how `INPUT_DATA_ERROR` backtracks.
//! - [`node_info`] provides per-run node state and dispatch descriptors.
//! - [`scheduler_step`] defines the result type for a handled completion.

pub mod graph;
pub mod job;
pub mod node_info;
pub mod scheduler;
pub mod scheduler_step;
pub mod surgery;

pub use graph::{JobGraph, JobNode};
pub use job::{Job, JobId, WorkflowMessage};
pub use node_info::{NodeRunState, ScheduledJob};
pub use scheduler::{RunStats, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use surgery::replace_subgraph;
