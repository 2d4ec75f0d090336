// src/engine/query.rs

//! Read-only view of a graph's progress for whoever submitted the job.

use serde::Serialize;

use crate::errors::{JobGraphError, Result};
use crate::registry::{Registry, RunOutcome, lock_graph};
use crate::types::QueryStatus;

/// Text returned while at least one sink job is still without a result.
pub const NOT_COMPLETED_TEXT: &str = "The job is not completed yet.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobQueryResult {
    pub job_id: String,
    pub status: QueryStatus,
    /// Concatenated sink scratchpads once finished, each followed by `\n`.
    pub result: String,
}

/// Report on the graph of `graph_id` through its sink jobs.
///
/// A run that failed or was stopped reports `FAILED` or `STOPPED` with the
/// error text, whatever results its sinks hold. `FINISHED` requires every sink to hold a result; sinks are read in job-id
/// order. An empty graph has no sinks and reports `FINISHED` with empty text.
pub fn query_result(registry: &Registry, graph_id: &str) -> Result<JobQueryResult> {
    let shared = registry.job_graph(graph_id).ok_or_else(|| {
        JobGraphError::NotFound(format!(
            "job {graph_id} not found in the registry, or not yet submitted"
        ))
    })?;

    if let Some(outcome) = registry.run_outcome(graph_id) {
        let (status, result) = match outcome {
            RunOutcome::Failed(reason) => (QueryStatus::Failed, reason),
            RunOutcome::Stopped(reason) => (QueryStatus::Stopped, reason),
        };
        return Ok(JobQueryResult {
            job_id: graph_id.to_string(),
            status,
            result,
        });
    }

    let graph = lock_graph(&shared);

    let mut aggregate = String::new();
    for sink in graph.sink_nodes() {
        match graph.result(&sink) {
            Some(result) => {
                aggregate.push_str(&result.scratchpad);
                aggregate.push('\n');
            }
            None => {
                return Ok(JobQueryResult {
                    job_id: graph_id.to_string(),
                    status: QueryStatus::Running,
                    result: NOT_COMPLETED_TEXT.to_string(),
                });
            }
        }
    }

    Ok(JobQueryResult {
        job_id: graph_id.to_string(),
        status: QueryStatus::Finished,
        result: aggregate,
    })
}
