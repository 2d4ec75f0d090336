// src/engine/leader.rs

//! End-to-end handling of a submitted job.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigFile, SchedulerSection};
use crate::dag::Job;
use crate::engine::query::{JobQueryResult, query_result};
use crate::engine::runtime::{RunSummary, Runtime};
use crate::errors::Result;
use crate::exec::ExpertFactory;
use crate::plan::{Decomposer, Planner};
use crate::registry::Registry;

/// Decomposes a job, executes the resulting graph and reports its result.
///
/// The graph of a submitted job is keyed by the job's id.
pub struct Leader {
    registry: Arc<Registry>,
    decomposer: Decomposer,
    runtime: Runtime,
}

impl fmt::Debug for Leader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leader")
            .field("decomposer", &self.decomposer)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl Leader {
    pub fn new(
        registry: Arc<Registry>,
        planner: Arc<dyn Planner>,
        settings: SchedulerSection,
        decomposer_retries: u32,
    ) -> Self {
        Self {
            decomposer: Decomposer::new(Arc::clone(&registry), planner, decomposer_retries),
            runtime: Runtime::new(Arc::clone(&registry), settings),
            registry,
        }
    }

    /// Wire a registry, decomposer and runtime from a validated config.
    pub fn from_config(
        cfg: &ConfigFile,
        planner: Arc<dyn Planner>,
        factory: Arc<dyn ExpertFactory>,
    ) -> Result<Self> {
        let registry = Arc::new(Registry::from_config(cfg, factory)?);
        Ok(Self::new(
            registry,
            planner,
            cfg.scheduler.clone(),
            cfg.decomposer.retries,
        ))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Decompose `job`, merge the sub-jobs into its graph and run them.
    pub async fn execute_original_job(&self, job: &Job) -> Result<JobQueryResult> {
        self.execute_original_job_with_summary(job)
            .await
            .map(|(result, _)| result)
    }

    pub async fn execute_original_job_with_summary(&self, job: &Job) -> Result<(JobQueryResult, RunSummary)> {
        info!(job_id = %job.id, goal = %job.goal, "executing original job");

        let subgraph = self.decomposer.decompose(job).await?;
        self.registry.replace_subgraph(&job.id, &subgraph, None)?;

        let summary = self.runtime.execute_job_graph(&job.id).await?;
        let result = query_result(&self.registry, &job.id)?;
        Ok((result, summary))
    }

    pub fn query_result(&self, job_id: &str) -> Result<JobQueryResult> {
        query_result(&self.registry, job_id)
    }
}
