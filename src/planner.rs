//! The planner (C2): chooses one method per enforceable constraint so
//! that the combined dataflow is an acyclic solution graph, preferring
//! higher-strength constraints.
//!
//! `QuickPlanner` re-derives the whole solution graph on every call
//! rather than performing a fine-grained incremental retraction: it
//! walks every required constraint first, then every optional
//! constraint (stays included) in strength order, greedily picking the
//! first method whose outputs are free and whose addition keeps the
//! dataflow acyclic. This is the same greedy, strength-ordered,
//! try-and-check approach the constraint-planning literature's
//! hierarchical/batch planner uses, generalized to the string-id data
//! model and to a strength order that is queried rather than walked.
//! `changed` is still part of the contract (a future incremental planner
//! could use it to skip work) but this implementation only consults it
//! to short-circuit a call that touches nothing.

use crate::constraint::Constraint;
use crate::graph::{CachingConstraintGraph, ConstraintGraph};
use crate::ids::{ConstraintId, MethodId, VariableId};
use crate::method::Vertex;
use crate::strength::StrengthOrder;
use std::collections::{HashMap, HashSet, VecDeque};

/// The currently selected method (if any) for each enforceable
/// constraint. At most one method per constraint; the combined
/// input/output dataflow of every selected method is acyclic.
#[derive(Clone, Debug, Default)]
pub struct SolutionGraph {
    selected: HashMap<ConstraintId, MethodId>,
}

impl SolutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_method(&self, cid: &ConstraintId) -> Option<&MethodId> {
        self.selected.get(cid)
    }

    pub fn is_enforced(&self, cid: &ConstraintId) -> bool {
        self.selected.contains_key(cid)
    }

    pub fn enforced_constraints(&self) -> Vec<ConstraintId> {
        self.selected.keys().cloned().collect()
    }

    pub fn selected_methods(&self) -> Vec<MethodId> {
        self.selected.values().cloned().collect()
    }

    pub(crate) fn insert(&mut self, cid: ConstraintId, mid: MethodId) {
        self.selected.insert(cid, mid);
    }
}

/// Contract implemented by the planner.
pub trait Planner<T> {
    /// Produces a new solution graph given the constraints that have
    /// been (re)enforced since the last call. Returns `true` if a valid
    /// solution graph was produced (optional constraints may be left
    /// unenforced); `false` if a required constraint could not be
    /// enforced, in which case the planner's solution graph is left as
    /// it was before this call.
    fn plan(&mut self, graph: &CachingConstraintGraph<T>, changed: &[ConstraintId]) -> bool;

    fn get_sgraph(&self) -> &SolutionGraph;

    fn get_optionals(&self) -> Vec<ConstraintId>;
    fn set_optionals(&mut self, ids: Vec<ConstraintId>);
    fn set_max_strength(&mut self, id: &ConstraintId);
    fn set_min_strength(&mut self, id: &ConstraintId);
    fn remove_optional(&mut self, id: &ConstraintId);
    fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> std::cmp::Ordering;

    /// Registers a newly-declared optional constraint at its level's
    /// default position in the strength order.
    fn register_optional(&mut self, id: &ConstraintId, level: crate::variable::OptionalLevel);
    /// Registers a newly-created variable's stay at the weak end.
    fn register_stay(&mut self, id: &ConstraintId);

    /// Re-derives priorities from the last topological evaluation order,
    /// strongest first. Called by the update loop after every successful
    /// plan so that a variable which stops being a dataflow source also
    /// stops outranking whatever now computes it.
    fn adjust_priorities(&mut self, strongest_first: &[ConstraintId]);
}

/// The default, and currently only, planner.
pub struct QuickPlanner {
    sgraph: SolutionGraph,
    strength: StrengthOrder,
}

impl Default for QuickPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickPlanner {
    pub fn new() -> Self {
        Self {
            sgraph: SolutionGraph::new(),
            strength: StrengthOrder::new(),
        }
    }
}

/// Does selecting `candidate` (with the given non-prior inputs and
/// outputs) create a cycle given the methods already committed this
/// planning pass? True iff some already-committed method downstream of
/// one of `candidate`'s outputs eventually feeds back into one of its
/// own non-prior inputs.
fn would_create_cycle<T>(
    graph: &CachingConstraintGraph<T>,
    committed: &[MethodId],
    candidate_inputs: &HashSet<VariableId>,
    candidate_outputs: &[VariableId],
) -> bool {
    let mut frontier: VecDeque<VariableId> = candidate_outputs.iter().cloned().collect();
    let mut seen: HashSet<VariableId> = candidate_outputs.iter().cloned().collect();

    while let Some(var) = frontier.pop_front() {
        if candidate_inputs.contains(&var) {
            return true;
        }
        for mid in committed {
            let Some(method) = graph.get_method(mid) else {
                continue;
            };
            for (i, input) in method.inputs().iter().enumerate() {
                if input == &var && !method.is_prior_input(i) {
                    for output in method.outputs() {
                        if seen.insert(output.clone()) {
                            frontier.push_back(output.clone());
                        }
                    }
                }
            }
        }
    }
    false
}

/// Tries every method of `constraint` in declaration order, returning
/// the first whose outputs are all unclaimed and that introduces no
/// cycle with `committed`. `claimed` is updated in place on success.
fn try_enforce<T>(
    graph: &CachingConstraintGraph<T>,
    constraint: &Constraint<T>,
    claimed: &mut HashSet<VariableId>,
    committed: &mut Vec<MethodId>,
) -> Option<MethodId> {
    'methods: for method in constraint.methods() {
        for output in method.outputs() {
            if claimed.contains(output) {
                continue 'methods;
            }
        }
        let inputs: HashSet<VariableId> = method
            .inputs()
            .iter()
            .enumerate()
            .filter(|(i, _)| !method.is_prior_input(*i))
            .map(|(_, v)| v.clone())
            .collect();
        if would_create_cycle(graph, committed, &inputs, method.outputs()) {
            continue;
        }
        for output in method.outputs() {
            claimed.insert(output.clone());
        }
        committed.push(method.id().clone());
        return Some(method.id().clone());
    }
    None
}

impl<T: Clone + 'static> Planner<T> for QuickPlanner {
    fn plan(&mut self, graph: &CachingConstraintGraph<T>, _changed: &[ConstraintId]) -> bool {
        let previous = self.sgraph.clone();
        let mut claimed: HashSet<VariableId> = HashSet::new();
        let mut committed: Vec<MethodId> = Vec::new();
        let mut new_sgraph = SolutionGraph::new();

        let mut required_ids: Vec<ConstraintId> = graph
            .constraints()
            .into_iter()
            .filter(|cid| graph.get_constraint(cid).is_some_and(|c| c.is_required()))
            .collect();
        required_ids.sort();

        for cid in &required_ids {
            let constraint = graph.get_constraint(cid).unwrap();
            match try_enforce(graph, constraint, &mut claimed, &mut committed) {
                Some(mid) => new_sgraph.insert(cid.clone(), mid),
                None => {
                    self.sgraph = previous;
                    return false;
                }
            }
        }

        for cid in self.strength.ranking() {
            if new_sgraph.is_enforced(&cid) {
                continue;
            }
            let Some(constraint) = graph.get_constraint(&cid) else {
                continue;
            };
            if let Some(mid) = try_enforce(graph, constraint, &mut claimed, &mut committed) {
                new_sgraph.insert(cid, mid);
            }
        }

        self.sgraph = new_sgraph;
        true
    }

    fn get_sgraph(&self) -> &SolutionGraph {
        &self.sgraph
    }

    fn get_optionals(&self) -> Vec<ConstraintId> {
        self.strength.get_optionals()
    }

    fn set_optionals(&mut self, ids: Vec<ConstraintId>) {
        self.strength.set_optionals(ids);
    }

    fn set_max_strength(&mut self, id: &ConstraintId) {
        self.strength.set_max_strength(id);
    }

    fn set_min_strength(&mut self, id: &ConstraintId) {
        self.strength.set_min_strength(id);
    }

    fn remove_optional(&mut self, id: &ConstraintId) {
        self.strength.remove(id);
    }

    fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> std::cmp::Ordering {
        self.strength.compare(a, b)
    }

    fn register_optional(&mut self, id: &ConstraintId, level: crate::variable::OptionalLevel) {
        self.strength.insert_optional(id, level);
    }

    fn register_stay(&mut self, id: &ConstraintId) {
        self.strength.insert_stay(id);
    }

    fn adjust_priorities(&mut self, strongest_first: &[ConstraintId]) {
        self.strength.adjust(strongest_first);
    }
}
