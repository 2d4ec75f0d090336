// src/registry.rs

//! Owner of every session's job graph and of the process-wide expert
//! instances.
//!
//! Construct one `Registry` at startup and share it as `Arc<Registry>`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::dag::{JobGraph, surgery};
use crate::errors::{JobGraphError, Result};
use crate::exec::{Expert, ExpertConfig, ExpertFactory};

/// A job graph shared between the registry, the runtime and queries.
pub type SharedJobGraph = Arc<Mutex<JobGraph>>;

/// Lock a shared graph. A panic while the lock was held does not make the
/// graph unusable: every mutation leaves it structurally valid.
pub fn lock_graph(graph: &SharedJobGraph) -> MutexGuard<'_, JobGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the last run of a graph ended when it did not finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Failed(String),
    Stopped(String),
}

type ExpertCell = Arc<OnceCell<Arc<dyn Expert>>>;

pub struct Registry {
    graphs: Mutex<HashMap<String, SharedJobGraph>>,
    outcomes: Mutex<HashMap<String, RunOutcome>>,
    /// Keyed by expert name.
    configs: Mutex<BTreeMap<String, ExpertConfig>>,
    /// Keyed by expert id. The map lock is only held to fetch a cell; the
    /// cell serialises construction for its own id.
    experts: Mutex<HashMap<String, ExpertCell>>,
    factory: Arc<dyn ExpertFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("graphs", &lock(&self.graphs).len())
            .field("configs", &lock(&self.configs).keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(factory: Arc<dyn ExpertFactory>) -> Self {
        Self {
            graphs: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(HashMap::new()),
            configs: Mutex::new(BTreeMap::new()),
            experts: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Registry pre-loaded with every `[expert.<name>]` of a validated config.
    pub fn from_config(cfg: &ConfigFile, factory: Arc<dyn ExpertFactory>) -> Result<Self> {
        let registry = Self::new(factory);
        for config in cfg.expert_configs() {
            registry.add_expert_config(config.name.clone(), config)?;
        }
        Ok(registry)
    }

    /// The graph for `graph_id`, created empty on first request.
    pub fn get_or_create_job_graph(&self, graph_id: &str) -> SharedJobGraph {
        let mut graphs = lock(&self.graphs);
        graphs
            .entry(graph_id.to_string())
            .or_insert_with(|| {
                debug!(graph_id = %graph_id, "created job graph");
                Arc::new(Mutex::new(JobGraph::new()))
            })
            .clone()
    }

    /// The graph for `graph_id`, if one was ever created.
    pub fn job_graph(&self, graph_id: &str) -> Option<SharedJobGraph> {
        lock(&self.graphs).get(graph_id).cloned()
    }

    /// Mark the graph's run as failed with `reason`.
    pub fn fail_job_graph(&self, graph_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(graph_id = %graph_id, reason = %reason, "job graph failed");
        lock(&self.outcomes).insert(graph_id.to_string(), RunOutcome::Failed(reason));
    }

    /// Mark the graph's run as stopped with `reason`.
    pub fn stop_job_graph(&self, graph_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        info!(graph_id = %graph_id, reason = %reason, "job graph stopped");
        lock(&self.outcomes).insert(graph_id.to_string(), RunOutcome::Stopped(reason));
    }

    /// Terminal outcome of the graph's last run, if it failed or was stopped.
    pub fn run_outcome(&self, graph_id: &str) -> Option<RunOutcome> {
        lock(&self.outcomes).get(graph_id).cloned()
    }

    /// Forget a previous terminal outcome; called when a new run starts.
    pub fn clear_run_outcome(&self, graph_id: &str) {
        lock(&self.outcomes).remove(graph_id);
    }

    pub fn add_expert_config(&self, name: impl Into<String>, config: ExpertConfig) -> Result<()> {
        let name = name.into();
        let mut configs = lock(&self.configs);
        if configs.contains_key(&name) {
            return Err(JobGraphError::DuplicateConfig(name));
        }
        info!(expert = %name, expert_id = %config.id, "registered expert config");
        configs.insert(name, config);
        Ok(())
    }

    pub fn remove_expert_config(&self, name: &str) -> Option<ExpertConfig> {
        lock(&self.configs).remove(name)
    }

    pub fn get_expert_config(&self, name: &str) -> Option<ExpertConfig> {
        lock(&self.configs).get(name).cloned()
    }

    /// Snapshot of all registered configs, keyed by name.
    pub fn expert_configs(&self) -> BTreeMap<String, ExpertConfig> {
        lock(&self.configs).clone()
    }

    /// Number of expert instances built so far.
    pub fn expert_count(&self) -> usize {
        lock(&self.experts)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn get_or_create_expert_by_name(&self, name: &str) -> Result<Arc<dyn Expert>> {
        let config = self
            .get_expert_config(name)
            .ok_or_else(|| JobGraphError::NotFound(format!("expert config '{name}'")))?;
        self.get_or_create_expert_by_config(&config).await
    }

    pub async fn get_or_create_expert_by_id(&self, expert_id: &str) -> Result<Arc<dyn Expert>> {
        let config = lock(&self.configs)
            .values()
            .find(|c| c.id == expert_id)
            .cloned()
            .ok_or_else(|| JobGraphError::NotFound(format!("expert id '{expert_id}'")))?;
        self.get_or_create_expert_by_config(&config).await
    }

    /// Cached instance for `config.id`, built through the factory on a miss.
    ///
    /// Concurrent callers for the same id wait on its cell and then receive
    /// the instance built by the first. A failed or cancelled construction
    /// leaves the cell empty for the next caller.
    async fn get_or_create_expert_by_config(&self, config: &ExpertConfig) -> Result<Arc<dyn Expert>> {
        let cell = Arc::clone(lock(&self.experts).entry(config.id.clone()).or_default());

        let expert = cell
            .get_or_try_init(|| async {
                let expert = self
                    .factory
                    .create(config)
                    .await
                    .map_err(|e| e.context(format!("creating expert '{}'", config.id)))?;
                info!(expert = %config.name, expert_id = %config.id, "created expert instance");
                Ok::<_, JobGraphError>(expert)
            })
            .await?;
        Ok(Arc::clone(expert))
    }

    /// Splice `new` into the graph of `graph_id` in place of `old`, or merge
    /// it when `old` is `None`. See [`surgery::replace_subgraph`].
    pub fn replace_subgraph(&self, graph_id: &str, new: &JobGraph, old: Option<&JobGraph>) -> Result<()> {
        let shared = self.get_or_create_job_graph(graph_id);
        let mut graph = lock_graph(&shared);
        surgery::replace_subgraph(&mut graph, new, old)?;
        debug!(graph_id = %graph_id, nodes = graph.node_count(), "job graph updated");
        Ok(())
    }
}
