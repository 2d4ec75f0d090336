// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSection;
use crate::dag::{JobId, ScheduledJob, Scheduler, SchedulerStep, WorkflowMessage};
use crate::errors::{JobGraphError, Result};
use crate::exec::run_node;
use crate::registry::{Registry, SharedJobGraph, lock_graph};

/// Outcome of a finished graph run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub graph_id: String,
    pub nodes: usize,
    pub dispatches: u64,
    pub backtracks: u64,
    pub execution_errors: u64,
    pub elapsed_ms: u128,
}

type NodeOutcome = Result<WorkflowMessage>;

/// Executes job graphs held by a [`Registry`].
///
/// This is the async shell around [`Scheduler`]: the scheduler decides what
/// is ready and how results change node state, the runtime spawns expert
/// calls, waits for the first of them to finish, and mirrors every change
/// into the registry's shared graph.
pub struct Runtime {
    registry: Arc<Registry>,
    settings: SchedulerSection,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(registry: Arc<Registry>, settings: SchedulerSection) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the graph of `graph_id` until every node holds a result.
    pub async fn execute_job_graph(&self, graph_id: &str) -> Result<RunSummary> {
        self.run(graph_id, None).await
    }

    /// Like [`Runtime::execute_job_graph`], but a message on `cancel` aborts
    /// every running expert call and returns `Cancelled`. Dropping the
    /// sender without sending does not cancel.
    pub async fn execute_job_graph_with_cancel(
        &self,
        graph_id: &str,
        cancel: oneshot::Receiver<()>,
    ) -> Result<RunSummary> {
        self.run(graph_id, Some(cancel)).await
    }

    /// Every error after the graph is found leaves a terminal outcome in the
    /// registry: `Cancelled` stops the graph, anything else fails it.
    async fn run(&self, graph_id: &str, cancel: Option<oneshot::Receiver<()>>) -> Result<RunSummary> {
        let shared = self
            .registry
            .job_graph(graph_id)
            .ok_or_else(|| JobGraphError::NotFound(format!("job graph '{graph_id}'")))?;
        self.registry.clear_run_outcome(graph_id);

        let outcome = self.drive(graph_id, &shared, cancel).await;
        match &outcome {
            Ok(_) => {}
            Err(err @ JobGraphError::Cancelled(_)) => {
                self.registry.stop_job_graph(graph_id, err.to_string());
            }
            Err(err) => self.registry.fail_job_graph(graph_id, err.to_string()),
        }
        outcome
    }

    async fn drive(
        &self,
        graph_id: &str,
        shared: &SharedJobGraph,
        mut cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let mut scheduler = {
            let graph = lock_graph(shared);
            Scheduler::from_graph(&graph, self.settings.max_backtracks_per_edge)?
        };
        info!(graph_id = %graph_id, nodes = scheduler.node_count(), "executing job graph");

        let mut running: JoinSet<NodeOutcome> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, JobId> = HashMap::new();
        let mut stalls: u32 = 0;

        while !scheduler.is_finished() {
            let ready = scheduler.collect_ready();
            let dispatched = !ready.is_empty();
            for scheduled in ready {
                self.dispatch(shared, scheduled, &mut running, &mut in_flight);
            }

            if running.is_empty() {
                if dispatched || !scheduler.has_pending() {
                    continue;
                }
                stalls += 1;
                if stalls > self.settings.max_stall_polls {
                    error!(graph_id = %graph_id, stalls, "no job can make progress");
                    return Err(JobGraphError::Deadlock(format!(
                        "graph {graph_id} has pending jobs but none can run"
                    )));
                }
                debug!(graph_id = %graph_id, stalls, "nothing ready and nothing running; waiting");
                tokio::time::sleep(self.settings.stall_poll_interval()).await;
                continue;
            }
            stalls = 0;

            tokio::select! {
                signal = cancel_requested(&mut cancel) => {
                    if signal {
                        running.abort_all();
                        warn!(graph_id = %graph_id, aborted = in_flight.len(), "graph run cancelled");
                        return Err(JobGraphError::Cancelled(format!("graph {graph_id}")));
                    }
                    // Sender dropped: run to completion.
                    cancel = None;
                }
                Some(joined) = running.join_next_with_id() => {
                    self.absorb(shared, &mut scheduler, &mut in_flight, joined)?;
                    while let Some(joined) = running.try_join_next_with_id() {
                        self.absorb(shared, &mut scheduler, &mut in_flight, joined)?;
                    }
                }
            }
        }

        let stats = scheduler.stats();
        let summary = RunSummary {
            graph_id: graph_id.to_string(),
            nodes: scheduler.node_count(),
            dispatches: stats.dispatches,
            backtracks: stats.backtracks,
            execution_errors: stats.execution_errors,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            graph_id = %graph_id,
            dispatches = summary.dispatches,
            backtracks = summary.backtracks,
            execution_errors = summary.execution_errors,
            elapsed_ms = summary.elapsed_ms as u64,
            "job graph finished"
        );
        Ok(summary)
    }

    /// Spawn one expert call. The expert is resolved inside the task, so a
    /// slow construction is aborted by cancel like any running call.
    fn dispatch(
        &self,
        shared: &SharedJobGraph,
        scheduled: ScheduledJob,
        running: &mut JoinSet<NodeOutcome>,
        in_flight: &mut HashMap<task::Id, JobId>,
    ) {
        // Lessons picked up since the last attempt live in the job context.
        if scheduled.attempt > 1 {
            let mut graph = lock_graph(shared);
            if let Some(job) = graph.job_mut(&scheduled.job_id) {
                job.context.clone_from(&scheduled.job.context);
            }
        }

        let job_id = scheduled.job_id.clone();
        let timeout = self.settings.node_timeout();
        let registry = Arc::clone(&self.registry);
        let handle = running.spawn(async move {
            let expert = registry
                .get_or_create_expert_by_id(&scheduled.expert_id)
                .await?;
            run_node(expert, scheduled, timeout).await
        });
        in_flight.insert(handle.id(), job_id);
    }

    /// Feed one finished unit into the scheduler and mirror the result.
    fn absorb(
        &self,
        shared: &SharedJobGraph,
        scheduler: &mut Scheduler,
        in_flight: &mut HashMap<task::Id, JobId>,
        joined: std::result::Result<(task::Id, NodeOutcome), JoinError>,
    ) -> Result<()> {
        let (job_id, result) = match joined {
            Ok((id, outcome)) => {
                let job_id = in_flight.remove(&id).unwrap_or_default();
                match outcome {
                    Ok(result) => (job_id, result),
                    Err(fatal) => {
                        error!(job_id = %job_id, error = %fatal, "fatal node outcome; stopping graph run");
                        return Err(fatal);
                    }
                }
            }
            Err(join_err) => {
                let job_id = in_flight.remove(&join_err.id()).unwrap_or_default();
                if join_err.is_cancelled() {
                    debug!(job_id = %job_id, "node task cancelled");
                    return Ok(());
                }
                error!(job_id = %job_id, error = %join_err, "expert task panicked");
                (
                    job_id,
                    WorkflowMessage::execution_error(format!("expert task panicked: {join_err}")),
                )
            }
        };

        let step = scheduler.handle_completion(&job_id, result.clone());
        mirror_step(shared, &step, &result);
        Ok(())
    }
}

fn mirror_step(shared: &SharedJobGraph, step: &SchedulerStep, result: &WorkflowMessage) {
    let mut graph = lock_graph(shared);
    if let Some(id) = &step.recorded {
        graph.set_result(id, result.clone());
    }
    for id in &step.cleared {
        graph.clear_result(id);
    }
}

/// Resolves to `true` on a cancel message and `false` if the sender is gone.
/// Never resolves when there is nothing to listen to.
async fn cancel_requested(cancel: &mut Option<oneshot::Receiver<()>>) -> bool {
    match cancel {
        Some(rx) => rx.await.is_ok(),
        None => std::future::pending().await,
    }
}
