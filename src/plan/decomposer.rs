// src/plan/decomposer.rs

//! Turning one goal into a validated graph of sub-jobs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dag::{Job, JobGraph, WorkflowMessage};
use crate::errors::{JobGraphError, Result};
use crate::exec::{BoxFuture, ExpertConfig};
use crate::plan::extract::extract_json_blocks;
use crate::registry::Registry;

/// Keys every planned sub-job must carry.
pub const REQUIRED_KEYS: [&str; 4] = ["goal", "context", "completion_criteria", "assigned_expert"];

/// The external planning pipeline.
///
/// Receives the job being decomposed, the rendered planning prompt and, on
/// a retry, a lesson describing what was wrong with the previous answer. Its
/// `scratchpad` is expected to hold one fenced JSON block.
pub trait Planner: Send + Sync {
    fn plan<'a>(
        &'a self,
        job: &'a Job,
        prompt: &'a str,
        lesson: Option<&'a str>,
    ) -> BoxFuture<'a, anyhow::Result<WorkflowMessage>>;
}

/// One entry of a parsed plan, keyed by the planner's own sub-job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubJob {
    pub key: String,
    pub goal: String,
    pub context: String,
    pub completion_criteria: String,
    pub dependencies: Vec<String>,
    pub assigned_expert: String,
    pub thinking: Option<String>,
}

pub struct Decomposer {
    registry: Arc<Registry>,
    planner: Arc<dyn Planner>,
    retries: u32,
}

impl fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decomposer")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl Decomposer {
    pub fn new(registry: Arc<Registry>, planner: Arc<dyn Planner>, retries: u32) -> Self {
        Self {
            registry,
            planner,
            retries,
        }
    }

    /// Decompose `job` into an acyclic graph of sub-jobs.
    ///
    /// A job with `assigned_expert_name` skips planning and becomes a single
    /// sub-job for that expert. Otherwise the planner is consulted, with up
    /// to `retries` further attempts when its answer does not parse or
    /// validate. Nothing is returned unless the graph is acyclic.
    pub async fn decompose(&self, job: &Job) -> Result<JobGraph> {
        if let Some(name) = job.assigned_expert_name.as_deref() {
            return self.single_expert_graph(job, name).await;
        }

        let configs = self.registry.expert_configs();
        let prompt = render_prompt(job, &configs);
        let (plan, raw) = self.plan_with_retries(job, &prompt, &configs).await?;
        self.build_graph(job, plan, &raw).await
    }

    async fn single_expert_graph(&self, job: &Job, name: &str) -> Result<JobGraph> {
        let config = self
            .registry
            .get_expert_config(name)
            .ok_or_else(|| JobGraphError::NotFound(format!("expert config '{name}'")))?;
        self.registry.get_or_create_expert_by_name(name).await?;

        let mut subjob = Job::subjob(job, job.goal.clone(), format!("{}\n{}", job.goal, job.context));
        subjob.assigned_expert_name = Some(name.to_string());

        info!(job_id = %job.id, expert = %name, "job pre-assigned; skipping decomposition");
        let mut graph = JobGraph::new();
        graph.add_node(subjob.id.clone(), subjob, config.id);
        Ok(graph)
    }

    /// Returns the validated plan and the raw text it came from.
    async fn plan_with_retries(
        &self,
        job: &Job,
        prompt: &str,
        configs: &BTreeMap<String, ExpertConfig>,
    ) -> Result<(Vec<PlannedSubJob>, String)> {
        let expert_names: Vec<&str> = configs.keys().map(|s| s.as_str()).collect();
        let mut lesson: Option<String> = None;
        let mut last_error = String::new();
        let mut last_raw = String::new();

        for attempt in 0..=self.retries {
            debug!(job_id = %job.id, attempt, "requesting decomposition");
            let message = self.planner.plan(job, prompt, lesson.as_deref()).await?;

            match parse_plan(&message.scratchpad, &expert_names) {
                Ok(plan) => {
                    info!(job_id = %job.id, attempt, subjobs = plan.len(), "decomposition parsed");
                    return Ok((plan, message.scratchpad));
                }
                Err(err) => {
                    warn!(job_id = %job.id, attempt, error = %err, "decomposition rejected");
                    lesson = Some(retry_lesson(&expert_names, &err));
                    last_error = err;
                    last_raw = message.scratchpad;
                }
            }
        }

        Err(JobGraphError::Planning {
            message: format!(
                "job {} could not be decomposed after {} attempt(s): {last_error}",
                job.id,
                self.retries + 1
            ),
            raw: last_raw,
        })
    }

    async fn build_graph(&self, job: &Job, plan: Vec<PlannedSubJob>, raw: &str) -> Result<JobGraph> {
        let mut ids: HashMap<String, String> = HashMap::new();
        let mut graph = JobGraph::new();

        for entry in &plan {
            let config = self
                .registry
                .get_expert_config(&entry.assigned_expert)
                .ok_or_else(|| JobGraphError::NotFound(format!("expert config '{}'", entry.assigned_expert)))?;
            self.registry
                .get_or_create_expert_by_name(&entry.assigned_expert)
                .await?;

            let mut subjob = Job::subjob(
                job,
                entry.goal.clone(),
                format!("{}\n{}", entry.context, entry.completion_criteria),
            );
            subjob.assigned_expert_name = Some(entry.assigned_expert.clone());
            subjob.thinking = entry.thinking.clone();

            ids.insert(entry.key.clone(), subjob.id.clone());
            graph.add_node(subjob.id.clone(), subjob, config.id);
        }

        for entry in &plan {
            for dep in &entry.dependencies {
                if let (Some(from), Some(to)) = (ids.get(dep), ids.get(&entry.key)) {
                    graph.add_edge(from.clone(), to.clone());
                }
            }
        }

        if let Err(err) = graph.topological_order() {
            return Err(JobGraphError::Planning {
                message: err.to_string(),
                raw: raw.to_string(),
            });
        }
        Ok(graph)
    }
}

/// Planning prompt listing the goal and every registered expert.
pub fn render_prompt(job: &Job, configs: &BTreeMap<String, ExpertConfig>) -> String {
    let experts = configs
        .values()
        .map(|c| format!("Expert name: {}\nDescription: {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Goal: {goal}\n\
         Context: {context}\n\n\
         Available experts:\n{experts}\n\n\
         Split the goal into sub-jobs. Answer with a single ```json block mapping each \
         sub-job id to an object with the keys goal, context, completion_criteria, \
         dependencies (ids of sub-jobs that must finish first), assigned_expert (one \
         expert name from the list) and thinking.",
        goal = job.goal,
        context = job.context,
    )
}

fn retry_lesson(expert_names: &[&str], error: &str) -> String {
    format!(
        "The decomposition must be a single ```json block. Every sub-job needs the keys \
         {REQUIRED_KEYS:?}, dependencies must name other sub-job ids, and assigned_expert \
         must be one of {expert_names:?}.\nError info: {error}"
    )
}

/// Parse and validate planner output.
///
/// Errors are plain strings: they are fed back to the planner as lessons.
pub fn parse_plan(text: &str, expert_names: &[&str]) -> std::result::Result<Vec<PlannedSubJob>, String> {
    let mut blocks = extract_json_blocks(text).map_err(|e| e.to_string())?;
    if blocks.is_empty() {
        return Err("no fenced JSON block found in planner output".to_string());
    }
    let value = blocks
        .remove(0)
        .map_err(|e| format!("decomposition block is not valid JSON: {e}"))?;
    let Value::Object(map) = value else {
        return Err("decomposition result must be a JSON object".to_string());
    };
    if map.is_empty() {
        return Err("decomposition result cannot be empty".to_string());
    }

    let mut plan = Vec::with_capacity(map.len());
    for (key, data) in &map {
        plan.push(parse_entry(key, data, &map, expert_names)?);
    }

    let mut shape = JobGraph::new();
    for entry in &plan {
        shape.add_vertex(entry.key.clone());
        for dep in &entry.dependencies {
            shape.add_edge(dep.clone(), entry.key.clone());
        }
    }
    if let Err(err) = shape.topological_order() {
        return Err(err.to_string());
    }

    Ok(plan)
}

fn parse_entry(
    key: &str,
    data: &Value,
    all: &Map<String, Value>,
    expert_names: &[&str],
) -> std::result::Result<PlannedSubJob, String> {
    let Value::Object(fields) = data else {
        return Err(format!("sub-job '{key}' must be a JSON object"));
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| !fields.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(format!("sub-job '{key}' is missing required keys: {missing:?}"));
    }

    let text = |field: &str| -> std::result::Result<String, String> {
        match fields.get(field) {
            Some(v) => as_text(v).ok_or_else(|| format!("sub-job '{key}' key '{field}' must be a string")),
            None => Ok(String::new()),
        }
    };

    let dependencies = match fields.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|d| match d {
                Value::String(s) => Ok(s.clone()),
                other => Err(format!("sub-job '{key}' has a non-string dependency: {other}")),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(_) => return Err(format!("sub-job '{key}' key 'dependencies' must be a list")),
    };
    if let Some(unknown) = dependencies.iter().find(|d| !all.contains_key(d.as_str())) {
        return Err(format!(
            "sub-job '{key}' has an invalid dependency: '{unknown}' does not exist"
        ));
    }

    let assigned_expert = text("assigned_expert")?;
    if !expert_names.contains(&assigned_expert.as_str()) {
        return Err(format!(
            "sub-job '{key}' assigned expert '{assigned_expert}' not found in available experts: {expert_names:?}"
        ));
    }

    let thinking = match fields.get("thinking") {
        None | Some(Value::Null) => None,
        Some(_) => Some(text("thinking")?),
    };

    Ok(PlannedSubJob {
        key: key.to_string(),
        goal: text("goal")?,
        context: text("context")?,
        completion_criteria: text("completion_criteria")?,
        dependencies,
        assigned_expert,
        thinking,
    })
}

/// Strings as-is, lists joined by newlines, objects re-serialized.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Value::Object(_) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPERTS: [&str; 2] = ["writer", "coder"];

    #[test]
    fn valid_plan_is_parsed() {
        let text = r#"
```json
{
  "s1": {"goal": "g1", "context": "c1", "completion_criteria": "done1",
         "dependencies": [], "assigned_expert": "writer", "thinking": "t"},
  "s2": {"goal": ["line a", "line b"], "context": "c2", "completion_criteria": "done2",
         "dependencies": ["s1"], "assigned_expert": "coder"}
}
```"#;
        let plan = parse_plan(text, &EXPERTS).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].goal, "line a\nline b");
        assert_eq!(plan[1].dependencies, ["s1"]);
        assert_eq!(plan[0].thinking.as_deref(), Some("t"));
        assert_eq!(plan[1].thinking, None);
    }

    #[test]
    fn missing_block_is_rejected() {
        let err = parse_plan("I refuse to plan.", &EXPERTS).unwrap_err();
        assert!(err.contains("no fenced JSON block"));
    }

    #[test]
    fn unknown_dependency_and_expert_are_rejected() {
        let dep = "```json\n{\"a\": {\"goal\": \"g\", \"context\": \"c\", \"completion_criteria\": \"x\", \"dependencies\": [\"zz\"], \"assigned_expert\": \"writer\"}}\n```";
        assert!(parse_plan(dep, &EXPERTS).unwrap_err().contains("'zz' does not exist"));

        let expert = "```json\n{\"a\": {\"goal\": \"g\", \"context\": \"c\", \"completion_criteria\": \"x\", \"assigned_expert\": \"painter\"}}\n```";
        assert!(parse_plan(expert, &EXPERTS).unwrap_err().contains("painter"));
    }

    #[test]
    fn cyclic_plan_is_rejected() {
        let text = "```json\n{\
            \"a\": {\"goal\": \"g\", \"context\": \"c\", \"completion_criteria\": \"x\", \"dependencies\": [\"b\"], \"assigned_expert\": \"writer\"},\
            \"b\": {\"goal\": \"g\", \"context\": \"c\", \"completion_criteria\": \"x\", \"dependencies\": [\"a\"], \"assigned_expert\": \"writer\"}\
        }\n```";
        assert!(parse_plan(text, &EXPERTS).unwrap_err().contains("not a DAG"));
    }

    #[test]
    fn missing_keys_are_listed() {
        let text = "```json\n{\"a\": {\"goal\": \"g\", \"assigned_expert\": \"writer\"}}\n```";
        let err = parse_plan(text, &EXPERTS).unwrap_err();
        assert!(err.contains("context") && err.contains("completion_criteria"));
    }
}
