// src/exec/mod.rs

//! Expert execution.
//!
//! - [`expert`]: the `Expert` / `ExpertFactory` seam.
//! - [`node_runner`]: one dispatched node, status classification included.

pub mod expert;
pub mod node_runner;

pub use expert::{BoxFuture, Expert, ExpertConfig, ExpertFactory};
pub use node_runner::run_node;
