//! The topological scheduler (C3): orders the planner's selected methods
//! into an evaluation order consistent with the solution graph's
//! dataflow, breaking ties by the planner's strength order.

use crate::graph::ConstraintGraph;
use crate::ids::{MethodId, VariableId};
use crate::planner::Planner;
use std::collections::HashMap;

/// The solution graph contained a cycle; scheduling failed. Since the
/// planner is supposed to guarantee acyclicity, seeing this means a
/// planner bug rather than a condition callers need to handle gracefully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Orders `selected` (the solution graph's chosen methods) so that every
/// method appears after every method that produces one of its inputs.
/// Where the dataflow leaves the order ambiguous, methods whose owning
/// constraint is stronger come first.
pub fn toposort<T>(
    graph: &impl ConstraintGraph<T>,
    selected: &[MethodId],
    planner: &dyn Planner<T>,
) -> Result<Vec<MethodId>, Cycle> {
    let mut producer_of: HashMap<VariableId, MethodId> = HashMap::new();
    for mid in selected {
        for output in graph.outputs_for(mid) {
            producer_of.insert(output, mid.clone());
        }
    }

    let mut successors: HashMap<MethodId, Vec<MethodId>> =
        selected.iter().map(|m| (m.clone(), Vec::new())).collect();
    for mid in selected {
        let method = graph.get_method(mid);
        let inputs = graph.inputs_for(mid);
        for (i, input) in inputs.iter().enumerate() {
            if let Some(m) = method {
                if m.is_prior_input(i) {
                    continue;
                }
            }
            if let Some(producer) = producer_of.get(input) {
                if producer != mid {
                    successors.get_mut(producer).unwrap().push(mid.clone());
                }
            }
        }
    }

    // Sorted weakest-first: the DFS below produces a postorder in this
    // same relative order among independent roots, and the final
    // `reverse()` flips it back to strongest-first.
    let mut roots: Vec<MethodId> = selected.to_vec();
    roots.sort_by(|a, b| {
        let ca = graph.constraint_for_method(a);
        let cb = graph.constraint_for_method(b);
        match (ca, cb) {
            (Some(ca), Some(cb)) => planner.compare(&ca, &cb),
            _ => std::cmp::Ordering::Equal,
        }
    });

    let mut marks: HashMap<MethodId, Mark> =
        selected.iter().map(|m| (m.clone(), Mark::Unvisited)).collect();
    let mut postorder = Vec::with_capacity(selected.len());

    for root in &roots {
        visit(root, &successors, &mut marks, &mut postorder)?;
    }

    postorder.reverse();
    Ok(postorder)
}

fn visit(
    node: &MethodId,
    successors: &HashMap<MethodId, Vec<MethodId>>,
    marks: &mut HashMap<MethodId, Mark>,
    postorder: &mut Vec<MethodId>,
) -> Result<(), Cycle> {
    match marks.get(node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => return Err(Cycle),
        _ => {}
    }
    marks.insert(node.clone(), Mark::Visiting);
    if let Some(succs) = successors.get(node) {
        for succ in succs.clone() {
            visit(&succ, successors, marks, postorder)?;
        }
    }
    marks.insert(node.clone(), Mark::Done);
    postorder.push(node.clone());
    Ok(())
}
