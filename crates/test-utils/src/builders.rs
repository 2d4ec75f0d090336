#![allow(dead_code)]

use std::sync::Arc;

use jobgraph::config::{ConfigFile, ExpertSection, RawConfigFile};
use jobgraph::exec::ExpertFactory;
use jobgraph::{ExpertConfig, Job, JobGraph, Registry};

pub const TEST_SESSION: &str = "session-test";

/// Builder for `Job` with a fixed id. The goal defaults to the id.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job::new(id).with_id(id).with_session_id(TEST_SESSION),
        }
    }

    pub fn goal(mut self, goal: &str) -> Self {
        self.job.goal = goal.to_string();
        self
    }

    pub fn context(mut self, context: &str) -> Self {
        self.job.context = context.to_string();
        self
    }

    pub fn assigned_expert(mut self, name: &str) -> Self {
        self.job.assigned_expert_name = Some(name.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for annotated `JobGraph`s.
///
/// ```ignore
/// let g = GraphBuilder::new("expert-a")
///     .chain(&["A", "B", "C"])
///     .build();
/// ```
pub struct GraphBuilder {
    graph: JobGraph,
    default_expert: String,
}

impl GraphBuilder {
    pub fn new(default_expert: &str) -> Self {
        Self {
            graph: JobGraph::new(),
            default_expert: default_expert.to_string(),
        }
    }

    /// Node with the default expert.
    pub fn node(mut self, id: &str) -> Self {
        let expert = self.default_expert.clone();
        self.graph.add_node(id, JobBuilder::new(id).build(), expert);
        self
    }

    pub fn node_with_expert(mut self, id: &str, expert_id: &str) -> Self {
        self.graph.add_node(id, JobBuilder::new(id).build(), expert_id);
        self
    }

    /// Edge between two nodes, annotating either endpoint if missing.
    pub fn edge(mut self, pred: &str, succ: &str) -> Self {
        for id in [pred, succ] {
            if !self.graph.is_annotated(id) {
                self = self.node(id);
            }
        }
        self.graph.add_edge(pred, succ);
        self
    }

    pub fn chain(mut self, ids: &[&str]) -> Self {
        for id in ids {
            if !self.graph.is_annotated(id) {
                self = self.node(id);
            }
        }
        for pair in ids.windows(2) {
            self = self.edge(pair[0], pair[1]);
        }
        self
    }

    pub fn build(self) -> JobGraph {
        self.graph
    }
}

/// Builder for `ExpertConfig`. The id defaults to `expert-<name>`.
pub struct ExpertConfigBuilder {
    config: ExpertConfig,
}

impl ExpertConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: ExpertConfig {
                id: format!("expert-{name}"),
                name: name.to_string(),
                description: format!("{name} expert"),
                reasoner: "test-reasoner".to_string(),
                workflow: "test-workflow".to_string(),
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.config.id = id.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.config.description = description.to_string();
        self
    }

    pub fn build(self) -> ExpertConfig {
        self.config
    }
}

/// Builder for a validated `ConfigFile`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_expert(mut self, name: &str, description: &str) -> Self {
        self.config.expert.insert(
            name.to_string(),
            ExpertSection {
                id: None,
                description: description.to_string(),
                reasoner: String::new(),
                workflow: String::new(),
            },
        );
        self
    }

    pub fn max_backtracks_per_edge(mut self, max: u32) -> Self {
        self.config.scheduler.max_backtracks_per_edge = Some(max);
        self
    }

    pub fn node_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.node_timeout_secs = Some(secs);
        self
    }

    pub fn decomposer_retries(mut self, retries: u32) -> Self {
        self.config.decomposer.retries = retries;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with one config per name, ids `expert-<name>`.
pub fn registry_with_experts(factory: Arc<dyn ExpertFactory>, names: &[&str]) -> Arc<Registry> {
    let registry = Registry::new(factory);
    for name in names {
        registry
            .add_expert_config(*name, ExpertConfigBuilder::new(name).build())
            .expect("duplicate expert name in test setup");
    }
    Arc::new(registry)
}
