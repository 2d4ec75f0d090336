// src/plan/mod.rs

//! Decomposition of a goal into sub-jobs.
//!
//! - [`extract`]: tolerant JSON extraction from planner text.
//! - [`decomposer`]: the `Planner` seam, plan validation and graph building.

pub mod decomposer;
pub mod extract;

pub use decomposer::{Decomposer, PlannedSubJob, Planner, parse_plan};
pub use extract::{extract_json_blocks, extract_json_blocks_between};
