// src/lib.rs

//! Multi-agent job-graph execution engine.
//!
//! A goal is decomposed into a DAG of sub-jobs, each owned by an expert, and
//! the DAG is executed with dependency ordering, concurrent dispatch of
//! independent jobs and backward retry when a job reports defective inputs.

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod registry;
pub mod types;

pub use dag::{Job, JobGraph, JobId, WorkflowMessage};
pub use engine::{JobQueryResult, Leader, RunSummary, Runtime, query_result};
pub use errors::{JobGraphError, Result};
pub use exec::{Expert, ExpertConfig, ExpertFactory};
pub use plan::{Decomposer, Planner};
pub use registry::{Registry, RunOutcome, SharedJobGraph};
pub use types::{LogLevel, QueryStatus, WorkflowStatus};
