use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use jobgraph::exec::{BoxFuture, Expert, ExpertConfig, ExpertFactory};
use jobgraph::{Job, WorkflowMessage};
use tracing::debug;

/// What a scripted expert does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `SUCCESS` with the job's goal as scratchpad.
    Echo,
    /// Return this message verbatim.
    Message(WorkflowMessage),
    /// Return `Err` from `execute`.
    Fail(String),
    /// Panic inside `execute`.
    Panic,
    /// Sleep, then echo.
    Slow(Duration),
}

/// One recorded call to a scripted expert.
#[derive(Debug, Clone)]
pub struct Call {
    pub job_id: String,
    pub goal: String,
    pub context: String,
    /// Scratchpads of the predecessor results, in the order received.
    pub inputs: Vec<String>,
}

/// An expert that replays scripted replies.
///
/// Scripts are keyed by job id or goal (id wins). Each call pops the next
/// reply for its key; once the script is empty the default reply is used.
pub struct ScriptedExpert {
    id: String,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    default_reply: Reply,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExpert {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            scripts: Mutex::new(HashMap::new()),
            default_reply: Reply::Echo,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Queue `replies` for the job with this id or goal.
    pub fn script(self, key: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls for the job with this id or goal.
    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == key || c.goal == key)
            .count()
    }

    /// Job ids in call order.
    pub fn call_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.job_id.clone())
            .collect()
    }

    fn next_reply(&self, job: &Job) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        for key in [&job.id, &job.goal] {
            if let Some(reply) = scripts.get_mut(key.as_str()).and_then(|q| q.pop_front()) {
                return reply;
            }
        }
        self.default_reply.clone()
    }
}

impl Expert for ScriptedExpert {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute<'a>(
        &'a self,
        job: &'a Job,
        predecessor_results: &'a [WorkflowMessage],
    ) -> BoxFuture<'a, anyhow::Result<WorkflowMessage>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call {
                job_id: job.id.clone(),
                goal: job.goal.clone(),
                context: job.context.clone(),
                inputs: predecessor_results
                    .iter()
                    .map(|r| r.scratchpad.clone())
                    .collect(),
            });

            let reply = self.next_reply(job);
            debug!(expert_id = %self.id, job_id = %job.id, ?reply, "scripted reply");
            match reply {
                Reply::Echo => Ok(WorkflowMessage::success(job.goal.clone())),
                Reply::Message(message) => Ok(message),
                Reply::Fail(msg) => Err(anyhow!(msg)),
                Reply::Panic => panic!("scripted panic in job {}", job.id),
                Reply::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(WorkflowMessage::success(job.goal.clone()))
                }
            }
        })
    }
}

/// Factory handing out pre-registered scripted experts, or fresh echoing
/// ones for ids it has not seen. Counts every construction.
pub struct FakeExpertFactory {
    experts: Mutex<HashMap<String, Arc<ScriptedExpert>>>,
    constructions: AtomicUsize,
    build_delay: Option<Duration>,
    build_delays_by_id: HashMap<String, Duration>,
}

impl FakeExpertFactory {
    pub fn new() -> Self {
        Self {
            experts: Mutex::new(HashMap::new()),
            constructions: AtomicUsize::new(0),
            build_delay: None,
            build_delays_by_id: HashMap::new(),
        }
    }

    /// Sleep inside `create`, widening the window for racing callers.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Like [`FakeExpertFactory::with_build_delay`], for one expert id only.
    pub fn with_build_delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.build_delays_by_id.insert(id.to_string(), delay);
        self
    }

    pub fn with_expert(self, expert: ScriptedExpert) -> Self {
        self.experts
            .lock()
            .unwrap()
            .insert(expert.id.clone(), Arc::new(expert));
        self
    }

    /// The scripted expert for `id`, once registered or built.
    pub fn expert(&self, id: &str) -> Option<Arc<ScriptedExpert>> {
        self.experts.lock().unwrap().get(id).cloned()
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl Default for FakeExpertFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpertFactory for FakeExpertFactory {
    fn create<'a>(
        &'a self,
        config: &'a ExpertConfig,
    ) -> BoxFuture<'a, anyhow::Result<Arc<dyn Expert>>> {
        Box::pin(async move {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            let delay = self
                .build_delays_by_id
                .get(&config.id)
                .copied()
                .or(self.build_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let expert = self
                .experts
                .lock()
                .unwrap()
                .entry(config.id.clone())
                .or_insert_with(|| Arc::new(ScriptedExpert::new(&config.id)))
                .clone();
            Ok::<Arc<dyn Expert>, anyhow::Error>(expert)
        })
    }
}
