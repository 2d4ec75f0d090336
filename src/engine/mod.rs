// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`runtime`] drives a job graph to completion around the pure
//!   [`crate::dag::Scheduler`].
//! - [`query`] reports a graph's aggregate status from its sink jobs.
//! - [`leader`] ties decomposition, execution and querying together.

pub mod leader;
pub mod query;
pub mod runtime;

pub use leader::Leader;
pub use query::{JobQueryResult, query_result};
pub use runtime::{RunSummary, Runtime};
