// src/exec/expert.rs

//! The contract experts and expert factories satisfy.
//!
//! Experts are external collaborators: the engine never looks inside one, it
//! only hands it a job plus its predecessors' results and reads back a
//! [`WorkflowMessage`]. Errors cross this seam as `anyhow::Error`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dag::{Job, WorkflowMessage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything needed to build an expert. Registered once per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Opaque reference to the reasoning backend.
    pub reasoner: String,
    /// Opaque reference to the expert's internal workflow.
    pub workflow: String,
}

/// A stateful worker that executes jobs.
///
/// One instance exists per expert id for the life of a [`crate::Registry`],
/// shared by every session, so implementations must tolerate concurrent
/// calls.
pub trait Expert: Send + Sync {
    fn id(&self) -> &str;

    /// Execute `job` given the results of its direct predecessors, in no
    /// particular order.
    fn execute<'a>(
        &'a self,
        job: &'a Job,
        predecessor_results: &'a [WorkflowMessage],
    ) -> BoxFuture<'a, anyhow::Result<WorkflowMessage>>;
}

/// Builds expert instances on first use.
pub trait ExpertFactory: Send + Sync {
    fn create<'a>(
        &'a self,
        config: &'a ExpertConfig,
    ) -> BoxFuture<'a, anyhow::Result<Arc<dyn Expert>>>;
}
