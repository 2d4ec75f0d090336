// src/config/validate.rs

use std::collections::HashMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobGraphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_experts(cfg)?;
    validate_scheduler(cfg)?;
    validate_experts(cfg)?;
    Ok(())
}

fn ensure_has_experts(cfg: &RawConfigFile) -> Result<()> {
    if cfg.expert.is_empty() {
        return Err(JobGraphError::ConfigError(
            "config must contain at least one [expert.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    if s.stall_poll_interval_ms == 0 {
        return Err(JobGraphError::ConfigError(
            "[scheduler].stall_poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.max_stall_polls == 0 {
        return Err(JobGraphError::ConfigError(
            "[scheduler].max_stall_polls must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.max_backtracks_per_edge == Some(0) {
        return Err(JobGraphError::ConfigError(
            "[scheduler].max_backtracks_per_edge must be >= 1 when set (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_experts(cfg: &RawConfigFile) -> Result<()> {
    let mut ids: HashMap<String, &str> = HashMap::new();
    for (name, expert) in cfg.expert.iter() {
        if expert.description.trim().is_empty() {
            return Err(JobGraphError::ConfigError(format!(
                "expert '{name}' must have a non-empty description"
            )));
        }
        let id = expert.effective_id(name);
        if let Some(other) = ids.insert(id.clone(), name) {
            return Err(JobGraphError::ConfigError(format!(
                "experts '{other}' and '{name}' share the id '{id}'"
            )));
        }
    }
    Ok(())
}
