use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use jobgraph::exec::BoxFuture;
use jobgraph::{Job, Planner, WorkflowMessage};

/// One recorded planning request.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub job_id: String,
    pub prompt: String,
    pub lesson: Option<String>,
}

/// Planner that answers with canned texts, in order. The last text repeats
/// once the queue is drained.
pub struct StaticPlanner {
    texts: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    error: Option<String>,
    requests: Mutex<Vec<PlanRequest>>,
}

impl StaticPlanner {
    pub fn new(texts: Vec<&str>) -> Self {
        Self {
            texts: Mutex::new(texts.into_iter().map(str::to_string).collect()),
            last: Mutex::new(String::new()),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A planner whose every call fails with `msg`.
    pub fn failing(msg: &str) -> Self {
        let mut planner = Self::new(Vec::new());
        planner.error = Some(msg.to_string());
        planner
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Planner for StaticPlanner {
    fn plan<'a>(
        &'a self,
        job: &'a Job,
        prompt: &'a str,
        lesson: Option<&'a str>,
    ) -> BoxFuture<'a, anyhow::Result<WorkflowMessage>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(PlanRequest {
                job_id: job.id.clone(),
                prompt: prompt.to_string(),
                lesson: lesson.map(str::to_string),
            });

            if let Some(msg) = &self.error {
                return Err(anyhow!(msg.clone()));
            }

            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.texts.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(WorkflowMessage::success(last.clone()))
        })
    }
}

/// A fenced plan with one entry per `(key, goal, expert, deps)`, where
/// `deps` is a comma-separated list of keys (empty for none).
pub fn plan_text(entries: &[(&str, &str, &str, &str)]) -> String {
    let body = entries
        .iter()
        .map(|(key, goal, expert, deps)| {
            let deps = deps
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| format!("\"{d}\""))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "  \"{key}\": {{\"goal\": \"{goal}\", \"context\": \"context of {key}\", \
                 \"completion_criteria\": \"{key} is done\", \"dependencies\": [{deps}], \
                 \"assigned_expert\": \"{expert}\", \"thinking\": \"because\"}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("Here is the plan:\n```json\n{{\n{body}\n}}\n```\n")
}
