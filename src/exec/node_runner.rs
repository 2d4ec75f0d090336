// src/exec/node_runner.rs

//! Runs one scheduled job against its expert.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::dag::{ScheduledJob, WorkflowMessage};
use crate::errors::{JobGraphError, Result};
use crate::exec::expert::Expert;
use crate::types::WorkflowStatus;

/// Execute `scheduled` and classify the expert's answer.
///
/// - `SUCCESS` and `INPUT_DATA_ERROR` come back as `Ok` for the scheduler.
/// - An expert error or a missed deadline becomes an `EXECUTION_ERROR`
///   result, also `Ok`: the failure stays local to this node.
/// - `JOB_TOO_COMPLICATED_ERROR` and any other status are fatal for the run.
pub async fn run_node(
    expert: Arc<dyn Expert>,
    scheduled: ScheduledJob,
    timeout: Option<Duration>,
) -> Result<WorkflowMessage> {
    let job_id = scheduled.job_id.as_str();
    debug!(
        job_id = %job_id,
        expert_id = %expert.id(),
        attempt = scheduled.attempt,
        inputs = scheduled.predecessor_results.len(),
        "calling expert"
    );

    let call = expert.execute(&scheduled.job, &scheduled.predecessor_results);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(res) => res,
            Err(_) => {
                warn!(job_id = %job_id, timeout_ms = limit.as_millis() as u64, "expert timed out");
                return Ok(WorkflowMessage::execution_error(format!(
                    "expert {} timed out after {}ms",
                    expert.id(),
                    limit.as_millis()
                )));
            }
        },
        None => call.await,
    };

    let message = match outcome {
        Ok(message) => message,
        Err(err) => {
            error!(
                job_id = %job_id,
                expert_id = %expert.id(),
                error = %format!("{err:#}"),
                "expert execution error"
            );
            return Ok(WorkflowMessage::execution_error(format!("{err:#}")));
        }
    };

    match message.status {
        WorkflowStatus::Success | WorkflowStatus::InputDataError => Ok(message),
        WorkflowStatus::JobTooComplicatedError => {
            error!(job_id = %job_id, "expert reported the job as too complicated");
            Err(JobGraphError::JobTooComplicated(scheduled.job_id.clone()))
        }
        status => {
            error!(job_id = %job_id, status = %status, "expert returned an unsupported status");
            Err(JobGraphError::ProtocolViolation {
                job_id: scheduled.job_id.clone(),
                status,
            })
        }
    }
}
