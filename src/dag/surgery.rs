// src/dag/surgery.rs

//! Splicing a freshly planned subgraph into an existing job graph.
//!
//! All checks run before the target graph is touched, so a failed call
//! leaves it exactly as it was.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::dag::graph::JobGraph;
use crate::dag::job::JobId;
use crate::errors::{JobGraphError, Result};

/// Replace `old` inside `target` with `new`, or merge `new` when there is
/// nothing to replace.
///
/// `old` must name nodes of `target` forming a region with exactly one entry
/// (a node with a predecessor outside the region) and exactly one exit (a
/// node with a successor outside the region). External predecessors of the
/// entry are wired to the first node of `new` in topological order, and the
/// last node of `new` is wired to the external successors of the exit.
pub fn replace_subgraph(target: &mut JobGraph, new: &JobGraph, old: Option<&JobGraph>) -> Result<()> {
    ensure_annotated(new)?;

    let Some(old) = old else {
        target.merge(new);
        debug!(nodes = new.node_count(), "merged subgraph into job graph");
        return Ok(());
    };

    let plan = plan_replacement(target, new, old)?;

    for id in old.nodes() {
        target.remove_node(id);
    }
    target.merge(new);

    for pred in &plan.external_preds {
        target.add_edge(pred.clone(), plan.head.clone());
    }
    for succ in &plan.external_succs {
        target.add_edge(plan.tail.clone(), succ.clone());
    }

    info!(
        entry = %plan.entry,
        exit = %plan.exit,
        head = %plan.head,
        tail = %plan.tail,
        removed = old.node_count(),
        added = new.node_count(),
        "replaced subgraph"
    );
    Ok(())
}

/// Everything needed to rewire the target, computed without mutating it.
#[derive(Debug)]
struct Replacement {
    entry: JobId,
    exit: JobId,
    external_preds: BTreeSet<JobId>,
    external_succs: BTreeSet<JobId>,
    head: JobId,
    tail: JobId,
}

fn ensure_annotated(new: &JobGraph) -> Result<()> {
    for id in new.nodes() {
        let Some(node) = new.node(id) else { continue };
        if node.job.is_none() {
            return Err(JobGraphError::Structural(format!(
                "node {id} is missing its job"
            )));
        }
        if node.expert_id.is_none() {
            return Err(JobGraphError::Structural(format!(
                "node {id} is missing its expert id"
            )));
        }
    }
    Ok(())
}

fn plan_replacement(target: &JobGraph, new: &JobGraph, old: &JobGraph) -> Result<Replacement> {
    if old.is_empty() {
        return Err(JobGraphError::Structural(
            "subgraph to replace is empty".to_string(),
        ));
    }
    if new.is_empty() {
        return Err(JobGraphError::Structural(
            "replacement subgraph is empty".to_string(),
        ));
    }
    if let Some(missing) = old.nodes().find(|id| !target.contains(id)) {
        return Err(JobGraphError::Structural(format!(
            "node {missing} of the subgraph to replace is not in the job graph"
        )));
    }

    let region: BTreeSet<&str> = old.nodes().collect();
    let mut entries = Vec::new();
    let mut exits = Vec::new();
    for id in old.nodes() {
        if target.predecessors(id).iter().any(|p| !region.contains(p.as_str())) {
            entries.push(id);
        }
        if target.successors(id).iter().any(|s| !region.contains(s.as_str())) {
            exits.push(id);
        }
    }

    let (entry, exit) = match (entries.as_slice(), exits.as_slice()) {
        ([entry], [exit]) => (entry.to_string(), exit.to_string()),
        _ => {
            return Err(JobGraphError::Structural(format!(
                "subgraph must have exactly one entry and one exit node, found entries [{}] and exits [{}]",
                entries.join(", "),
                exits.join(", ")
            )));
        }
    };

    let order = new.topological_order()?;
    let (Some(head), Some(tail)) = (order.first(), order.last()) else {
        return Err(JobGraphError::Structural(
            "replacement subgraph is empty".to_string(),
        ));
    };

    let external_preds = target
        .predecessors(&entry)
        .iter()
        .filter(|p| !region.contains(p.as_str()))
        .cloned()
        .collect();
    let external_succs = target
        .successors(&exit)
        .iter()
        .filter(|s| !region.contains(s.as_str()))
        .cloned()
        .collect();

    Ok(Replacement {
        head: head.clone(),
        tail: tail.clone(),
        entry,
        exit,
        external_preds,
        external_succs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::job::Job;

    fn chain(ids: &[&str]) -> JobGraph {
        let mut g = JobGraph::new();
        for id in ids {
            g.add_node(*id, Job::new(*id).with_id(*id), "expert");
        }
        for pair in ids.windows(2) {
            g.add_edge(pair[0], pair[1]);
        }
        g
    }

    fn edge_set(g: &JobGraph) -> BTreeSet<(String, String)> {
        g.edges().into_iter().collect()
    }

    #[test]
    fn single_node_is_replaced_by_chain() {
        let mut g = chain(&["A", "B", "C"]);
        let old = g.subgraph(["B"]);
        let new = chain(&["X", "Y"]);

        replace_subgraph(&mut g, &new, Some(&old)).unwrap();

        let expected: BTreeSet<(String, String)> = [("A", "X"), ("X", "Y"), ("Y", "C")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(edge_set(&g), expected);
        assert!(!g.contains("B"));
    }

    #[test]
    fn two_entries_are_rejected_without_mutation() {
        // A -> B, A -> C, B -> D, C -> D; region {B, C} has two entries.
        let mut g = chain(&["A", "B", "D"]);
        g.add_node("C", Job::new("C").with_id("C"), "expert");
        g.add_edge("A", "C");
        g.add_edge("C", "D");
        let before = edge_set(&g);

        let old = g.subgraph(["B", "C"]);
        let err = replace_subgraph(&mut g, &chain(&["X"]), Some(&old)).unwrap_err();

        assert!(matches!(err, JobGraphError::Structural(_)));
        assert_eq!(edge_set(&g), before);
        assert!(!g.contains("X"));
    }

    #[test]
    fn two_exits_are_rejected_without_mutation() {
        // A -> B -> C -> E, B -> D; region {B, C} leaves through B and C.
        let mut g = chain(&["A", "B", "C", "E"]);
        g.add_node("D", Job::new("D").with_id("D"), "expert");
        g.add_edge("B", "D");
        let before = edge_set(&g);

        let old = g.subgraph(["B", "C"]);
        let err = replace_subgraph(&mut g, &chain(&["X"]), Some(&old)).unwrap_err();

        assert!(matches!(err, JobGraphError::Structural(ref msg) if msg.contains("exits [B, C]")));
        assert_eq!(edge_set(&g), before);
        assert!(!g.contains("X"));
    }

    #[test]
    fn region_without_external_successor_is_rejected() {
        let mut g = chain(&["A", "B"]);
        let old = g.subgraph(["B"]);
        let err = replace_subgraph(&mut g, &chain(&["X"]), Some(&old)).unwrap_err();
        assert!(matches!(err, JobGraphError::Structural(ref msg) if msg.contains("exits []")));
        assert!(g.contains("B"));
        assert!(!g.contains("X"));
    }

    #[test]
    fn region_without_external_predecessor_is_rejected() {
        let mut g = chain(&["A", "B"]);
        let old = g.subgraph(["A"]);
        let err = replace_subgraph(&mut g, &chain(&["X"]), Some(&old)).unwrap_err();
        assert!(matches!(err, JobGraphError::Structural(_)));
        assert!(g.contains("A"));
    }

    #[test]
    fn unannotated_new_node_is_rejected_before_merge() {
        let mut g = chain(&["A"]);
        let mut new = chain(&["X"]);
        new.add_edge("X", "bare");

        let err = replace_subgraph(&mut g, &new, None).unwrap_err();
        assert!(matches!(err, JobGraphError::Structural(msg) if msg.contains("bare")));
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn without_old_subgraph_it_is_a_merge() {
        let mut via_surgery = chain(&["A", "B"]);
        let mut via_merge = via_surgery.clone();
        let new = chain(&["B", "C"]);

        replace_subgraph(&mut via_surgery, &new, None).unwrap();
        via_merge.merge(&new);

        assert_eq!(edge_set(&via_surgery), edge_set(&via_merge));
        assert_eq!(
            via_surgery.nodes().collect::<Vec<_>>(),
            via_merge.nodes().collect::<Vec<_>>()
        );
    }
}
