//! The enablement analyzer (C5): labels every variable `Relevant`,
//! `AssumedRelevant`, or `Irrelevant` with respect to the current output
//! set, driven by the solution graph's topological order.
//!
//! Re-derived in full on every call, in keeping with the planner's
//! full-recompute convention: a variable is `Relevant` if it sits on an
//! actual dataflow path, through currently-selected methods, from a
//! source to a declared output, `AssumedRelevant` if that path exists but
//! crosses a prior-flagged input whose producer has not yet run this
//! tick, and `Irrelevant` otherwise. `relevant` additionally gets
//! refined up from `Irrelevant` to `AssumedRelevant` by a purely
//! structural connectivity walk over the whole declared graph, ignoring
//! which method is currently selected.

use crate::graph::ConstraintGraph;
use crate::ids::{MethodId, VariableId};
use crate::method::Vertex;
use crate::planner::SolutionGraph;
use crate::variable::{Fuzzy, Variable};
use std::collections::{HashMap, HashSet, VecDeque};

/// Re-labels every known variable's `contributing` and `relevant` fuzzy
/// flags in place.
///
/// `topo_order` is the full schedule C3 produced for the current
/// solution graph (not just this tick's batch): the assumed/not-assumed
/// distinction for a prior input depends on where its producer sits in
/// that stable order, not on which methods happened to run this tick.
pub fn label<T>(
    graph: &impl ConstraintGraph<T>,
    sgraph: &SolutionGraph,
    topo_order: &[MethodId],
    outputs: &HashSet<VariableId>,
    variables: &mut HashMap<VariableId, Variable<T>>,
) {
    let selected: Vec<MethodId> = sgraph.selected_methods();
    let position: HashMap<&MethodId, usize> =
        topo_order.iter().enumerate().map(|(i, m)| (m, i)).collect();

    let mut producer_of: HashMap<VariableId, MethodId> = HashMap::new();
    for mid in &selected {
        for output in graph.outputs_for(mid) {
            producer_of.insert(output, mid.clone());
        }
    }

    let mut forward: HashMap<VariableId, Fuzzy> = HashMap::new();
    for mid in topo_order {
        let Some(method) = graph.get_method(mid) else {
            continue;
        };
        let mut label = Fuzzy::Yes;
        for (i, input) in method.inputs().iter().enumerate() {
            let input_label = match producer_of.get(input) {
                None => Fuzzy::Yes, // no producer at all: a genuine root
                Some(producer) => {
                    let produced_before_this = position.get(producer).copied().unwrap_or(usize::MAX)
                        < position.get(mid).copied().unwrap_or(usize::MAX);
                    if method.is_prior_input(i) && !produced_before_this {
                        Fuzzy::Maybe
                    } else {
                        forward.get(input).copied().unwrap_or(Fuzzy::No)
                    }
                }
            };
            label = label.meet(input_label);
        }
        for output in method.outputs() {
            forward.insert(output.clone(), label);
        }
    }

    let leads_to_output = backward_reachable_in_solution(graph, &selected, outputs);

    for (var, variable) in variables.iter_mut() {
        let contributing = if leads_to_output.contains(var) {
            forward.get(var).copied().unwrap_or(Fuzzy::No)
        } else {
            Fuzzy::No
        };
        variable.set_contributing(contributing);

        let relevant = if contributing != Fuzzy::No {
            contributing
        } else if structurally_connected_to_an_output(graph, var, outputs) {
            Fuzzy::Maybe
        } else {
            Fuzzy::No
        };
        variable.set_relevant(relevant);
    }
}

/// BFS backward from the declared outputs through the currently selected
/// methods' output→input edges (prior inputs included): the set of
/// variables that actually feed, through this solution graph, into some
/// declared output.
fn backward_reachable_in_solution<T>(
    graph: &impl ConstraintGraph<T>,
    selected: &[MethodId],
    outputs: &HashSet<VariableId>,
) -> HashSet<VariableId> {
    let mut seen: HashSet<VariableId> = outputs.clone();
    let mut frontier: VecDeque<VariableId> = outputs.iter().cloned().collect();

    while let Some(var) = frontier.pop_front() {
        for mid in selected {
            let Some(method) = graph.get_method(mid) else {
                continue;
            };
            if method.outputs().contains(&var) {
                for input in method.inputs() {
                    if seen.insert(input.clone()) {
                        frontier.push_back(input.clone());
                    }
                }
            }
        }
    }
    seen
}

/// Whether `var` is connected to any declared output through some method
/// of some constraint, anywhere in the declared graph, regardless of
/// which method is currently selected. Treats each method as joining all
/// of its inputs and outputs into one connected component.
fn structurally_connected_to_an_output<T>(
    graph: &impl ConstraintGraph<T>,
    var: &VariableId,
    outputs: &HashSet<VariableId>,
) -> bool {
    if outputs.contains(var) {
        return true;
    }
    let mut seen: HashSet<VariableId> = HashSet::new();
    seen.insert(var.clone());
    let mut frontier = vec![var.clone()];

    while let Some(v) = frontier.pop() {
        for cid in graph.constraints_which_use(&v) {
            for mid in graph.methods_of(&cid) {
                let Some(method) = graph.get_method(&mid) else {
                    continue;
                };
                let members = method.inputs().iter().chain(method.outputs().iter());
                for other in members {
                    if outputs.contains(other) {
                        return true;
                    }
                    if seen.insert(other.clone()) {
                        frontier.push(other.clone());
                    }
                }
            }
        }
    }
    false
}
