//! The evaluator (C4): runs the selected methods whose outputs are
//! downstream of a batch of changed constraints, in topological order,
//! committing promise-bearing outputs as it goes.

use crate::graph::ConstraintGraph;
use crate::ids::{MethodId, VariableId};
use crate::method::{Activation, Vertex};
use crate::planner::SolutionGraph;
use crate::variable::Variable;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;

/// Runs exactly the methods downstream of `needs_evaluating`, in the
/// order given by `topo_order` (the full schedule C3 produced for the
/// current solution graph), and returns the activation record for every
/// method it ran, in run order.
///
/// `prior_values` holds each variable's value as of the start of the
/// current update cycle; a method's prior-flagged inputs read from here
/// instead of from `variables`, so a method never observes a sibling
/// method's write from within the same cycle through a prior input.
pub fn evaluate<T>(
    graph: &impl ConstraintGraph<T>,
    sgraph: &SolutionGraph,
    topo_order: &[MethodId],
    needs_evaluating: &[crate::ids::ConstraintId],
    prior_values: &HashMap<VariableId, T>,
    variables: &mut HashMap<VariableId, Variable<T>>,
) -> Vec<Activation<T>>
where
    T: Clone + Debug + PartialEq + 'static,
{
    let seed_methods: Vec<MethodId> = needs_evaluating
        .iter()
        .filter_map(|cid| sgraph.selected_method(cid))
        .cloned()
        .collect();

    let mut seed_vars: HashSet<VariableId> = HashSet::new();
    for mid in &seed_methods {
        seed_vars.extend(graph.outputs_for(mid));
    }
    // Initial edit commit: make any already-resolved promise on the
    // edited variables visible before anything downstream runs.
    for var in &seed_vars {
        if let Some(v) = variables.get_mut(var) {
            v.commit_promise();
        }
    }

    let selected_methods: Vec<MethodId> = sgraph.selected_methods();
    let downstream = downstream_methods(graph, &selected_methods, &seed_vars);

    let scheduled: Vec<MethodId> = topo_order
        .iter()
        .filter(|mid| downstream.contains(*mid))
        .filter(|mid| !graph.get_method(mid).is_some_and(|m| m.is_stay()))
        .cloned()
        .collect();

    let mut activations = Vec::with_capacity(scheduled.len());

    for mid in &scheduled {
        let Some(method) = graph.get_method(mid) else {
            continue;
        };
        let inputs: Vec<T> = method
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, var)| {
                if method.is_prior_input(i) {
                    prior_values
                        .get(var)
                        .cloned()
                        .unwrap_or_else(|| variables[var].value().clone())
                } else {
                    variables[var].value().clone()
                }
            })
            .collect();

        let promises = method.apply(inputs);
        let mut outputs = Vec::with_capacity(promises.len());
        for (var, promise) in method.outputs().iter().zip(promises.into_iter()) {
            if let Some(v) = variables.get_mut(var) {
                v.attach_promise(promise.clone());
                // Commit immediately if this settled synchronously, so a
                // method later in this same topological pass sees the
                // fresh value rather than the one from before this tick.
                v.commit_promise();
            }
            outputs.push((var.clone(), promise));
        }

        activations.push(Activation {
            method: mid.clone(),
            inputs: method.inputs().to_vec(),
            outputs,
        });
    }

    activations
}

/// BFS over the selected methods' dataflow, starting from `seed_vars`,
/// following non-prior input edges, collecting every selected
/// (non-stay) method reached.
fn downstream_methods<T>(
    graph: &impl ConstraintGraph<T>,
    selected: &[MethodId],
    seed_vars: &HashSet<VariableId>,
) -> HashSet<MethodId> {
    let mut frontier: VecDeque<VariableId> = seed_vars.iter().cloned().collect();
    let mut seen_vars: HashSet<VariableId> = seed_vars.clone();
    let mut found = HashSet::new();

    while let Some(var) = frontier.pop_front() {
        for mid in selected {
            let Some(method) = graph.get_method(mid) else {
                continue;
            };
            for (i, input) in method.inputs().iter().enumerate() {
                if input == &var && !method.is_prior_input(i) {
                    found.insert(mid.clone());
                    for output in method.outputs() {
                        if seen_vars.insert(output.clone()) {
                            frontier.push_back(output.clone());
                        }
                    }
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::graph::CachingConstraintGraph;
    use crate::ids::ConstraintId;
    use crate::method::Method;
    use crate::promise::{pending, ready};
    use std::rc::Rc;

    fn sgraph_with(pairs: &[(&str, &str)]) -> SolutionGraph {
        let mut sgraph = SolutionGraph::new();
        for (cid, mid) in pairs {
            sgraph.insert((*cid).into(), (*mid).into());
        }
        sgraph
    }

    #[test]
    fn evaluate_runs_only_methods_downstream_of_the_edit() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::stay("a".into()));
        g.add_constraint(Constraint::new(
            "C1",
            vec![Method::new(
                "a_to_b",
                vec![("a".into(), false)],
                vec!["b".into()],
                Rc::new(|inputs: Vec<i32>| vec![ready(inputs[0] + 1)]),
            )
            .unwrap()],
        ));
        g.add_constraint(Constraint::new(
            "C2",
            vec![Method::new(
                "b_to_c",
                vec![("b".into(), false)],
                vec!["c".into()],
                Rc::new(|inputs: Vec<i32>| vec![ready(inputs[0] * 10)]),
            )
            .unwrap()],
        ));

        let sgraph = sgraph_with(&[
            ("_stay_a", "_stay_a"),
            ("C1", "a_to_b"),
            ("C2", "b_to_c"),
        ]);
        let topo_order: Vec<MethodId> =
            vec!["_stay_a".into(), "a_to_b".into(), "b_to_c".into()];

        let mut variables = HashMap::new();
        variables.insert("a".into(), Variable::new("a", 1));
        variables.insert("b".into(), Variable::new("b", 0));
        variables.insert("c".into(), Variable::new("c", 0));

        let prior_values = HashMap::new();
        let activations = evaluate(
            &g,
            &sgraph,
            &topo_order,
            &[ConstraintId::stay_of(&"a".into())],
            &prior_values,
            &mut variables,
        );

        assert_eq!(activations.len(), 2);
        assert_eq!(*variables[&VariableId::from("b")].value(), 2);
        assert_eq!(*variables[&VariableId::from("c")].value(), 20);
    }

    #[test]
    fn an_unresolved_promise_leaves_the_variable_pending() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::stay("a".into()));
        g.add_constraint(Constraint::new(
            "C1",
            vec![Method::new(
                "a_to_b",
                vec![("a".into(), false)],
                vec!["b".into()],
                Rc::new(|_inputs: Vec<i32>| {
                    let (p, _r) = pending::<i32>();
                    vec![p]
                }),
            )
            .unwrap()],
        ));

        let sgraph = sgraph_with(&[("_stay_a", "_stay_a"), ("C1", "a_to_b")]);
        let topo_order: Vec<MethodId> = vec!["_stay_a".into(), "a_to_b".into()];

        let mut variables = HashMap::new();
        variables.insert("a".into(), Variable::new("a", 1));
        variables.insert("b".into(), Variable::new("b", 0));

        let prior_values = HashMap::new();
        evaluate(
            &g,
            &sgraph,
            &topo_order,
            &[ConstraintId::stay_of(&"a".into())],
            &prior_values,
            &mut variables,
        );

        assert!(variables[&VariableId::from("b")].is_pending());
        assert_eq!(*variables[&VariableId::from("b")].value(), 0);
    }
}
