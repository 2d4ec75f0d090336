// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::ExpertConfig;
use crate::types::LogLevel;

/// Raw configuration as deserialized from TOML, before validation.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [scheduler]
/// stall_poll_interval_ms = 50
/// max_stall_polls = 200
/// max_backtracks_per_edge = 3
/// node_timeout_secs = 600
///
/// [decomposer]
/// retries = 1
///
/// [expert.writer]
/// description = "Writes prose from bullet points"
/// reasoner = "gpt-4o"
/// workflow = "workflows/writer.yml"
/// ```
///
/// Every section except `[expert.<name>]` is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub decomposer: DecomposerSection,

    /// Keyed by expert *name*, which is what the planner refers to.
    #[serde(default)]
    pub expert: BTreeMap<String, ExpertSection>,
}

/// Validated configuration. Obtain one through `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub logging: LoggingSection,
    pub scheduler: SchedulerSection,
    pub decomposer: DecomposerSection,
    pub expert: BTreeMap<String, ExpertSection>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            logging: raw.logging,
            scheduler: raw.scheduler,
            decomposer: raw.decomposer,
            expert: raw.expert,
        }
    }

    /// Expert configs in name order, ids resolved.
    pub fn expert_configs(&self) -> Vec<ExpertConfig> {
        self.expert
            .iter()
            .map(|(name, section)| section.to_expert_config(name))
            .collect()
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    /// If unset, `JOBGRAPH_LOG` and then `info` apply.
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Sleep between rescans when nothing is ready and nothing is running.
    #[serde(default = "default_stall_poll_interval_ms")]
    pub stall_poll_interval_ms: u64,

    /// Consecutive stalled scans tolerated before giving up with `Deadlock`.
    #[serde(default = "default_max_stall_polls")]
    pub max_stall_polls: u32,

    /// Backtracks allowed per `(predecessor, node)` edge. Unset means no limit.
    #[serde(default)]
    pub max_backtracks_per_edge: Option<u32>,

    /// Per-node deadline; an expert exceeding it yields `EXECUTION_ERROR`.
    #[serde(default)]
    pub node_timeout_secs: Option<u64>,
}

fn default_stall_poll_interval_ms() -> u64 {
    50
}

fn default_max_stall_polls() -> u32 {
    200
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            stall_poll_interval_ms: default_stall_poll_interval_ms(),
            max_stall_polls: default_max_stall_polls(),
            max_backtracks_per_edge: None,
            node_timeout_secs: None,
        }
    }
}

impl SchedulerSection {
    pub fn stall_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stall_poll_interval_ms)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

/// `[decomposer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DecomposerSection {
    /// Extra planning attempts after the first one fails to parse or validate.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_retries() -> u32 {
    1
}

impl Default for DecomposerSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
        }
    }
}

/// `[expert.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpertSection {
    /// Defaults to `expert-<name>`.
    #[serde(default)]
    pub id: Option<String>,

    /// Shown to the planner next to the expert's name.
    pub description: String,

    #[serde(default)]
    pub reasoner: String,

    #[serde(default)]
    pub workflow: String,
}

impl ExpertSection {
    pub fn effective_id(&self, name: &str) -> String {
        self.id.clone().unwrap_or_else(|| format!("expert-{name}"))
    }

    pub fn to_expert_config(&self, name: &str) -> ExpertConfig {
        ExpertConfig {
            id: self.effective_id(name),
            name: name.to_string(),
            description: self.description.clone(),
            reasoner: self.reasoner.clone(),
            workflow: self.workflow.clone(),
        }
    }
}
