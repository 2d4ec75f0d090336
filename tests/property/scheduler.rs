use std::collections::{BTreeSet, HashSet};

use jobgraph::dag::{JobGraph, NodeRunState, Scheduler};
use jobgraph::WorkflowMessage;
use jobgraph_test_utils::builders::GraphBuilder;
use proptest::prelude::*;

// Acyclic by construction: node N only depends on nodes 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = (JobGraph, Vec<Vec<usize>>)> {
    (1..=max_nodes).prop_flat_map(|num_nodes| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..num_nodes), num_nodes)
            .prop_map(move |raw_deps| {
                let mut builder = GraphBuilder::new("expert-prop");
                let mut deps_by_node = Vec::with_capacity(num_nodes);
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let name = node_name(i);
                    builder = builder.node(&name);
                    let deps: BTreeSet<usize> = if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    for &dep in &deps {
                        builder = builder.edge(&node_name(dep), &name);
                    }
                    deps_by_node.push(deps.into_iter().collect());
                }
                (builder.build(), deps_by_node)
            })
    })
}

fn node_name(i: usize) -> String {
    format!("job_{i:02}")
}

/// Drive the scheduler to completion, finishing running jobs in the order
/// picked by `picks`. Jobs in `flaky` report INPUT_DATA_ERROR the first time
/// they complete. Returns the number of completions handled.
fn drive(
    scheduler: &mut Scheduler,
    deps: &[Vec<usize>],
    picks: &[usize],
    flaky: &HashSet<String>,
) -> Result<usize, TestCaseError> {
    let mut running: Vec<String> = Vec::new();
    let mut already_failed: HashSet<String> = HashSet::new();
    let mut completions = 0;

    for step in 0..10_000 {
        for scheduled in scheduler.collect_ready() {
            let index: usize = scheduled.job_id[4..].parse().expect("numeric suffix");
            for &dep in &deps[index] {
                prop_assert_eq!(scheduler.state_of(&node_name(dep)), NodeRunState::Completed);
            }
            prop_assert_eq!(scheduled.predecessor_results.len(), deps[index].len());
            running.push(scheduled.job_id);
        }

        if running.is_empty() {
            prop_assert!(scheduler.is_finished(), "stalled with pending jobs");
            return Ok(completions);
        }

        let pick = picks.get(step % picks.len().max(1)).copied().unwrap_or(0) % running.len();
        let id = running.swap_remove(pick);
        let result = if flaky.contains(&id) && already_failed.insert(id.clone()) {
            WorkflowMessage::input_data_error(format!("{id} needs better inputs"))
        } else {
            WorkflowMessage::success(format!("out-{id}"))
        };
        scheduler.handle_completion(&id, result);
        completions += 1;
    }

    Err(TestCaseError::fail("scheduler did not terminate"))
}

proptest! {
    #[test]
    fn every_job_completes_exactly_once_without_failures(
        (graph, deps) in dag_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 1..20),
    ) {
        let mut scheduler = Scheduler::from_graph(&graph, None).expect("acyclic graph");
        let completions = drive(&mut scheduler, &deps, &picks, &HashSet::new())?;

        prop_assert_eq!(completions, graph.node_count());
        prop_assert_eq!(scheduler.stats().dispatches as usize, graph.node_count());
        prop_assert_eq!(scheduler.stats().backtracks, 0);
        for id in graph.nodes() {
            let result = scheduler.result_of(id).expect("every job has a result");
            prop_assert_eq!(&result.scratchpad, &format!("out-{id}"));
        }
    }

    #[test]
    fn one_time_input_errors_still_terminate_with_success(
        (graph, deps) in dag_strategy(10),
        picks in proptest::collection::vec(any::<usize>(), 1..20),
        flaky_indices in proptest::collection::vec(0..10usize, 0..4),
    ) {
        let flaky: HashSet<String> = flaky_indices
            .into_iter()
            .filter(|&i| i < graph.node_count())
            .map(node_name)
            .collect();

        let mut scheduler = Scheduler::from_graph(&graph, None).expect("acyclic graph");
        drive(&mut scheduler, &deps, &picks, &flaky)?;

        prop_assert!(scheduler.is_finished());
        prop_assert_eq!(scheduler.stats().backtracks as usize, flaky.len());
        for id in graph.nodes() {
            let result = scheduler.result_of(id).expect("every job has a result");
            prop_assert_eq!(&result.scratchpad, &format!("out-{id}"));
        }
        for id in &flaky {
            prop_assert!(scheduler.attempts_of(id) >= 2);
        }
    }
}
