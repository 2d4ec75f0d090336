// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::dag::job::{Job, JobId, WorkflowMessage};
use crate::errors::{JobGraphError, Result};

/// Attributes carried by a graph node.
///
/// A node added through [`JobGraph::add_vertex`] or implicitly by
/// [`JobGraph::add_edge`] is "bare": it has neither a job nor an expert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobNode {
    pub job: Option<Job>,
    pub expert_id: Option<String>,
    pub result: Option<WorkflowMessage>,
}

impl JobNode {
    pub fn is_annotated(&self) -> bool {
        self.job.is_some() && self.expert_id.is_some()
    }
}

#[derive(Debug, Clone, Default)]
struct NodeEntry {
    data: JobNode,
    /// Direct predecessors in insertion order.
    preds: Vec<JobId>,
    /// Direct successors in insertion order.
    succs: Vec<JobId>,
}

/// Directed graph of jobs keyed by job id.
///
/// An edge `(u, v)` means `u` must complete before `v` starts. Acyclicity is
/// not enforced on insertion; callers check it with [`JobGraph::is_acyclic`]
/// before handing the graph to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    nodes: BTreeMap<JobId, NodeEntry>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or re-annotate a node. Existing edges are kept.
    pub fn add_node(&mut self, id: impl Into<JobId>, job: Job, expert_id: impl Into<String>) {
        let entry = self.nodes.entry(id.into()).or_default();
        entry.data.job = Some(job);
        entry.data.expert_id = Some(expert_id.into());
    }

    /// Insert a bare node if absent.
    pub fn add_vertex(&mut self, id: impl Into<JobId>) {
        self.nodes.entry(id.into()).or_default();
    }

    /// Add `pred -> succ`, creating missing endpoints as bare nodes.
    /// Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, pred: impl Into<JobId>, succ: impl Into<JobId>) {
        let pred = pred.into();
        let succ = succ.into();
        if self.has_edge(&pred, &succ) {
            return;
        }
        self.nodes
            .entry(pred.clone())
            .or_default()
            .succs
            .push(succ.clone());
        self.nodes.entry(succ).or_default().preds.push(pred);
    }

    pub fn predecessors(&self, id: &str) -> &[JobId] {
        self.nodes
            .get(id)
            .map(|n| n.preds.as_slice())
            .unwrap_or(&[])
    }

    pub fn successors(&self, id: &str) -> &[JobId] {
        self.nodes
            .get(id)
            .map(|n| n.succs.as_slice())
            .unwrap_or(&[])
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<JobNode> {
        let entry = self.nodes.remove(id)?;
        for pred in &entry.preds {
            if let Some(p) = self.nodes.get_mut(pred) {
                p.succs.retain(|s| s != id);
            }
        }
        for succ in &entry.succs {
            if let Some(s) = self.nodes.get_mut(succ) {
                s.preds.retain(|p| p != id);
            }
        }
        Some(entry.data)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_edge(&self, pred: &str, succ: &str) -> bool {
        self.nodes
            .get(pred)
            .is_some_and(|n| n.succs.iter().any(|s| s == succ))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.succs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// All edges, grouped by source id in ascending order.
    pub fn edges(&self) -> Vec<(JobId, JobId)> {
        self.nodes
            .iter()
            .flat_map(|(id, n)| n.succs.iter().map(move |s| (id.clone(), s.clone())))
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&JobNode> {
        self.nodes.get(id).map(|n| &n.data)
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.node(id)?.job.as_ref()
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.nodes.get_mut(id)?.data.job.as_mut()
    }

    pub fn expert_id(&self, id: &str) -> Option<&str> {
        self.node(id)?.expert_id.as_deref()
    }

    pub fn result(&self, id: &str) -> Option<&WorkflowMessage> {
        self.node(id)?.result.as_ref()
    }

    /// Attach a result. Returns `false` if the node does not exist.
    pub fn set_result(&mut self, id: &str, result: WorkflowMessage) -> bool {
        match self.nodes.get_mut(id) {
            Some(n) => {
                n.data.result = Some(result);
                true
            }
            None => false,
        }
    }

    pub fn clear_result(&mut self, id: &str) -> Option<WorkflowMessage> {
        self.nodes.get_mut(id)?.data.result.take()
    }

    pub fn is_annotated(&self, id: &str) -> bool {
        self.node(id).is_some_and(JobNode::is_annotated)
    }

    /// Nodes with no successors, in ascending id order.
    pub fn sink_nodes(&self) -> Vec<JobId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.succs.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Nodes with no predecessors, in ascending id order.
    pub fn source_nodes(&self) -> Vec<JobId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.preds.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_acyclic(&self) -> bool {
        self.kahn().len() == self.nodes.len()
    }

    /// Kahn's algorithm. Among nodes that become ready together the smaller
    /// id comes first, so the order is stable for a given graph.
    pub fn topological_order(&self) -> Result<Vec<JobId>> {
        let order = self.kahn();
        if order.len() != self.nodes.len() {
            let stuck: Vec<&str> = self
                .nodes
                .keys()
                .filter(|id| !order.contains(id))
                .map(|s| s.as_str())
                .collect();
            return Err(JobGraphError::NotADag(format!(
                "cycle through nodes: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    fn kahn(&self) -> Vec<JobId> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, n)| (id.as_str(), n.preds.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for succ in self.successors(id) {
                if let Some(deg) = in_degree.get_mut(succ.as_str()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert(succ.as_str());
                    }
                }
            }
        }
        order
    }

    /// Independent copy of the nodes in `ids` and the edges between them.
    /// Ids not present in the graph are skipped.
    pub fn subgraph<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> JobGraph {
        let keep: BTreeSet<&str> = ids.into_iter().filter(|id| self.contains(id)).collect();
        let mut sub = JobGraph::new();
        for id in &keep {
            if let Some(entry) = self.nodes.get(*id) {
                sub.nodes.insert(
                    id.to_string(),
                    NodeEntry {
                        data: entry.data.clone(),
                        preds: entry
                            .preds
                            .iter()
                            .filter(|p| keep.contains(p.as_str()))
                            .cloned()
                            .collect(),
                        succs: entry
                            .succs
                            .iter()
                            .filter(|s| keep.contains(s.as_str()))
                            .cloned()
                            .collect(),
                    },
                );
            }
        }
        sub
    }

    /// Union `other` into `self`. Attributes set on `other`'s nodes overwrite
    /// ours; unset ones leave ours alone. Edges are unioned.
    pub fn merge(&mut self, other: &JobGraph) {
        for (id, entry) in &other.nodes {
            let mine = self.nodes.entry(id.clone()).or_default();
            if let Some(job) = &entry.data.job {
                mine.data.job = Some(job.clone());
            }
            if let Some(expert_id) = &entry.data.expert_id {
                mine.data.expert_id = Some(expert_id.clone());
            }
            if let Some(result) = &entry.data.result {
                mine.data.result = Some(result.clone());
            }
        }
        for (pred, succ) in other.edges() {
            self.add_edge(pred, succ);
        }
    }
}
