//! The update loop (C6): the engine's external interface. Owns the
//! constraint graph and the planner, and drives C2 → C3 → C4 → C5 on
//! every update, coalescing edits that arrive between ticks.
//!
//! The reactive component/template layer that would produce
//! [`ComponentChanges`] is out of scope here; [`Component`] is the seam
//! it would plug into.

use crate::enablement;
use crate::evaluator;
use crate::event::{Diagnostic, Event, Scheduler, Signal, SYSTEM_UPDATE_PRIORITY};
use crate::graph::{CachingConstraintGraph, ConstraintGraph};
use crate::ids::{ConstraintId, MethodId, VariableId};
use crate::planner::{Planner, QuickPlanner, SolutionGraph};
use crate::scheduler;
use crate::touch::{self, TouchGraph};
use crate::variable::{Fuzzy, OptionalLevel, Variable};
use crate::Constraint;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::rc::Rc;

/// One change an external [`Component`] reports since it was last asked.
pub enum Change<T> {
    Variable(VariableId, T),
    Constraint(Constraint<T>),
    Output(VariableId),
    TouchDep(ConstraintId, ConstraintId),
}

/// Adds and removes a [`Component`] reports in one batch. Removes are
/// applied before adds.
#[derive(Default)]
pub struct ComponentChanges<T> {
    pub adds: Vec<Change<T>>,
    pub removes: Vec<Change<T>>,
}

impl<T> ComponentChanges<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// An external context whose declared variables/constraints/outputs/touch
/// dependencies can change over time. The dynamic component/template
/// layer that would implement this is out of scope; this trait is only
/// the seam such a layer would plug into.
pub trait Component<T> {
    fn report_updates(&mut self) -> ComponentChanges<T>;
}

/// Opaque handle for a registered [`Component`], returned by
/// [`PropertySystem::add_components`] and consumed by
/// [`PropertySystem::remove_components`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentHandle(u64);

/// The engine: a constraint graph, a planner, and the bookkeeping the
/// update loop needs to batch and drive them.
pub struct PropertySystem<T> {
    graph: CachingConstraintGraph<T>,
    planner: Box<dyn Planner<T>>,
    touch: TouchGraph,
    variables: HashMap<VariableId, Variable<T>>,
    outputs: HashMap<VariableId, usize>,
    components: HashMap<u64, Box<dyn Component<T>>>,
    next_component_handle: u64,

    need_updating: bool,
    need_enforcing: HashSet<ConstraintId>,
    need_evaluating: HashSet<ConstraintId>,
    last_topo_order: Vec<MethodId>,

    scheduler: Scheduler,
    pending_update: bool,
    schedule_update_on_change: bool,
    forward_emerging_sources: bool,

    solved: Signal<bool>,
    diagnostics: Signal<Diagnostic>,
}

impl<T: Clone + Debug + PartialEq + 'static> Default for PropertySystem<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Debug + PartialEq + 'static> PropertySystem<T> {
    pub fn new() -> Self {
        Self {
            graph: CachingConstraintGraph::new(),
            planner: Box::new(QuickPlanner::new()),
            touch: TouchGraph::new(),
            variables: HashMap::new(),
            outputs: HashMap::new(),
            components: HashMap::new(),
            next_component_handle: 0,

            need_updating: false,
            need_enforcing: HashSet::new(),
            need_evaluating: HashSet::new(),
            last_topo_order: Vec::new(),

            scheduler: Scheduler::new(),
            pending_update: false,
            schedule_update_on_change: true,
            forward_emerging_sources: false,

            solved: Signal::new(),
            diagnostics: Signal::new(),
        }
    }

    /// Configures whether `recordChange` self-schedules a batched update
    /// (see [`PropertySystem::pump`]), or only `update()` drives it.
    pub fn set_schedule_update_on_change(&mut self, enabled: bool) {
        self.schedule_update_on_change = enabled;
    }

    /// Configures whether a variable newly selected as a dataflow source
    /// gets its forwarded value committed and recomputed in the same
    /// update that made it a source.
    pub fn set_forward_emerging_sources(&mut self, enabled: bool) {
        self.forward_emerging_sources = enabled;
    }

    // -- direct mutators ---------------------------------------------

    pub fn add_variable(&mut self, id: impl Into<VariableId>, initial_value: T) {
        let id = id.into();
        if self.variables.contains_key(&id) {
            return;
        }
        self.graph.add_variable(id.clone());
        self.graph.add_constraint(Constraint::stay(id.clone()));
        self.variables.insert(id.clone(), Variable::new(id.clone(), initial_value));
        let stay_id = ConstraintId::stay_of(&id);
        self.planner.register_stay(&stay_id);
        self.need_enforcing.insert(stay_id);
        self.record_change();
    }

    pub fn remove_variable(&mut self, id: &VariableId) {
        if !self.graph.constraints_which_use(id).is_empty() {
            self.report(Diagnostic::VariableInUse(id.clone()));
            return;
        }
        let stay_id = ConstraintId::stay_of(id);
        self.graph.remove_constraint(&stay_id);
        self.graph.remove_variable(id);
        self.planner.remove_optional(&stay_id);
        self.variables.remove(id);
        self.outputs.remove(id);
        self.record_change();
    }

    pub fn add_constraint(&mut self, constraint: Constraint<T>) {
        for var in constraint.variables() {
            if !self.variables.contains_key(var) {
                self.report(Diagnostic::UnknownVariable(var.clone()));
                return;
            }
        }
        let id = constraint.id().clone();
        let required = constraint.is_required();
        let level = constraint.level();
        self.graph.add_constraint(constraint);
        if !required {
            self.planner.register_optional(&id, level);
        }
        self.need_enforcing.insert(id);
        self.record_change();
    }

    pub fn remove_constraint(&mut self, id: &ConstraintId) {
        self.graph.remove_constraint(id);
        self.planner.remove_optional(id);
        self.need_enforcing.remove(id);
        self.record_change();
    }

    /// Refcounted: a variable stays declared as an output until every
    /// `add_output` call for it has a matching `remove_output`.
    pub fn add_output(&mut self, id: VariableId) {
        *self.outputs.entry(id).or_insert(0) += 1;
        self.record_change();
    }

    pub fn remove_output(&mut self, id: &VariableId) {
        if let Some(count) = self.outputs.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.outputs.remove(id);
            }
        }
        self.record_change();
    }

    pub fn add_touch_dependency(&mut self, from: ConstraintId, to: ConstraintId) {
        self.touch.add_dependency(from, to);
    }

    pub fn remove_touch_dependency(&mut self, from: &ConstraintId, to: &ConstraintId) {
        self.touch.remove_dependency(from, to);
    }

    pub fn add_touch_set(&mut self, ids: &[ConstraintId]) {
        self.touch.add_touch_set(ids);
    }

    pub fn remove_touch_set(&mut self, ids: &[ConstraintId]) {
        self.touch.remove_touch_set(ids);
    }

    /// Hot-swaps the planner, carrying the strength order over via
    /// `getOptionals`/`setOptionals` and re-marking every constraint as
    /// needing enforcement.
    pub fn switch_to_new_planner(&mut self, mut new_planner: Box<dyn Planner<T>>) {
        new_planner.set_optionals(self.planner.get_optionals());
        self.planner = new_planner;
        self.need_enforcing.extend(self.graph.constraints());
        self.record_change();
    }

    pub fn add_components(&mut self, components: Vec<Box<dyn Component<T>>>) -> Vec<ComponentHandle> {
        let mut handles = Vec::with_capacity(components.len());
        for component in components {
            let handle = self.next_component_handle;
            self.next_component_handle += 1;
            self.components.insert(handle, component);
            handles.push(ComponentHandle(handle));
        }
        self.need_updating = true;
        self.record_change();
        handles
    }

    pub fn remove_components(&mut self, handles: &[ComponentHandle]) {
        for handle in handles {
            self.components.remove(&handle.0);
        }
        self.record_change();
    }

    /// A *touch*: an edit whose value equals the variable's current
    /// value. Promotes the stay and its touch dependencies without
    /// forcing evaluation.
    pub fn touch(&mut self, id: &VariableId) {
        if !self.variables.contains_key(id) {
            self.report(Diagnostic::UnknownVariable(id.clone()));
            return;
        }
        let stay_id = ConstraintId::stay_of(id);
        let newly_needing =
            touch::do_promotions(&stay_id, &self.touch, &self.graph, self.planner.as_mut());
        self.need_enforcing.extend(newly_needing);
        self.record_change();
    }

    /// A direct edit. Always promotes the stay (and its touch
    /// dependencies) the same way a touch does; additionally marks the
    /// stay for evaluation if the value actually changed.
    pub fn set_value(&mut self, id: &VariableId, value: T) {
        let Some(variable) = self.variables.get_mut(id) else {
            self.report(Diagnostic::UnknownVariable(id.clone()));
            return;
        };
        let changed = variable.set_value(value);
        let stay_id = ConstraintId::stay_of(id);
        let newly_needing =
            touch::do_promotions(&stay_id, &self.touch, &self.graph, self.planner.as_mut());
        self.need_enforcing.extend(newly_needing);
        if changed {
            self.need_evaluating.insert(stay_id);
        }
        self.record_change();
    }

    // -- signals / snapshots -------------------------------------------

    pub fn on_solved(&mut self, callback: impl FnMut(&Event<bool>) + 'static) -> u64 {
        self.solved.subscribe(callback)
    }

    pub fn on_diagnostic(&mut self, callback: impl FnMut(&Event<Diagnostic>) + 'static) -> u64 {
        self.diagnostics.subscribe(callback)
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.solved.latest(), Some(Event::Ready(v)) if **v)
    }

    pub fn get_cgraph(&self) -> &CachingConstraintGraph<T> {
        &self.graph
    }

    pub fn get_sgraph(&self) -> &SolutionGraph {
        self.planner.get_sgraph()
    }

    /// A strongest-first snapshot of the planner's current strength
    /// order over optional constraints and stays, for inspection.
    pub fn optional_ranking(&self) -> Vec<ConstraintId> {
        self.planner.get_optionals()
    }

    pub fn value(&self, id: &VariableId) -> Option<&T> {
        self.variables.get(id).map(|v| v.value())
    }

    pub fn is_pending(&self, id: &VariableId) -> Option<bool> {
        self.variables.get(id).map(|v| v.is_pending())
    }

    pub fn contributing(&self, id: &VariableId) -> Option<Fuzzy> {
        self.variables.get(id).map(|v| v.contributing())
    }

    pub fn relevant(&self, id: &VariableId) -> Option<Fuzzy> {
        self.variables.get(id).map(|v| v.relevant())
    }

    pub fn pending_count(&self) -> usize {
        self.variables.values().filter(|v| v.is_pending()).count()
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.diagnostics.emit(Event::Ready(Rc::new(diagnostic)));
    }

    fn record_change(&mut self) {
        if self.is_solved() || self.solved.latest().is_none() {
            self.solved.emit(Event::Ready(Rc::new(false)));
        }
        if self.schedule_update_on_change && !self.pending_update {
            self.pending_update = true;
            self.scheduler.schedule(SYSTEM_UPDATE_PRIORITY, || {});
        }
    }

    /// Drains the scheduler and, if `recordChange` collapsed one or more
    /// edits into a pending update, runs it. This is the embedding point
    /// for `performScheduledUpdate`.
    pub fn pump(&mut self) {
        self.scheduler.run_to_quiescence();
        if self.pending_update {
            self.pending_update = false;
            self.update();
        }
    }

    /// Forces a synchronous update, for tests and deterministic drivers.
    pub fn update(&mut self) {
        if self.need_updating {
            self.drain_components();
        }

        if !self.need_enforcing.is_empty() {
            self.run_plan();
        }

        self.poll_pending();

        if !self.need_evaluating.is_empty() {
            self.run_evaluate();
        }

        if !self.graph.variables().is_empty() {
            let outputs: HashSet<VariableId> = self.outputs.keys().cloned().collect();
            enablement::label(
                &self.graph,
                self.planner.get_sgraph(),
                &self.last_topo_order,
                &outputs,
                &mut self.variables,
            );
        }

        if self.pending_count() == 0 {
            self.solved.emit(Event::Ready(Rc::new(true)));
        }
    }

    fn drain_components(&mut self) {
        self.need_updating = false;
        let mut adds = Vec::new();
        let mut removes = Vec::new();
        for component in self.components.values_mut() {
            let mut changes = component.report_updates();
            removes.append(&mut changes.removes);
            adds.append(&mut changes.adds);
        }
        for change in removes {
            self.apply_remove(change);
        }
        for change in adds {
            self.apply_add(change);
        }
    }

    fn apply_remove(&mut self, change: Change<T>) {
        match change {
            Change::Variable(id, _) => self.remove_variable(&id),
            Change::Constraint(c) => self.remove_constraint(c.id()),
            Change::Output(id) => self.remove_output(&id),
            Change::TouchDep(from, to) => self.remove_touch_dependency(&from, &to),
        }
    }

    fn apply_add(&mut self, change: Change<T>) {
        match change {
            Change::Variable(id, value) => self.add_variable(id, value),
            Change::Constraint(c) => self.add_constraint(c),
            Change::Output(id) => self.add_output(id),
            Change::TouchDep(from, to) => self.add_touch_dependency(from, to),
        }
    }

    fn run_plan(&mut self) {
        let changed: Vec<ConstraintId> = self.need_enforcing.drain().collect();
        if !self.planner.plan(&self.graph, &changed) {
            for id in &changed {
                self.report(Diagnostic::UnknownConstraint(id.clone()));
            }
            log::warn!("plan() failed: a required constraint could not be enforced");
            return;
        }

        let selected = self.planner.get_sgraph().selected_methods();
        let topo_order = match scheduler::toposort(&self.graph, &selected, self.planner.as_ref()) {
            Ok(order) => order,
            Err(_cycle) => {
                log::warn!("toposort found a cycle in a solution graph the planner produced");
                return;
            }
        };

        // Rebuild the stay-priority list by scanning topomids in
        // reverse, collecting non-required constraint ids, and
        // reinstalling via the planner's priority adjuster.
        let mut strongest_first = Vec::with_capacity(topo_order.len());
        for mid in topo_order.iter().rev() {
            if let Some(cid) = self.graph.constraint_for_method(mid) {
                if self
                    .graph
                    .get_constraint(&cid)
                    .is_some_and(|c| !c.is_required())
                {
                    strongest_first.push(cid);
                }
            }
        }
        self.planner.adjust_priorities(&strongest_first);

        for vid in self.graph.variables() {
            let stay_id = ConstraintId::stay_of(&vid);
            let is_source = self.planner.get_sgraph().is_enforced(&stay_id);
            let was_source = self
                .variables
                .get(&vid)
                .map(|v| v.is_source())
                .unwrap_or(false);
            if self.forward_emerging_sources && is_source && !was_source {
                self.need_evaluating.insert(stay_id.clone());
            }
            if let Some(v) = self.variables.get_mut(&vid) {
                v.set_source(is_source);
            }
        }

        self.last_topo_order = topo_order;
    }

    /// Polls every pending variable's promise, without re-invoking any
    /// method: a settled async activation needs no re-run, only the
    /// commit `evaluate`'s own initial-commit pass would have done had it
    /// settled synchronously. Whatever newly settles seeds `needEvaluating`
    /// with the constraint whose already-selected method produced it, so
    /// the next `evaluate` call cascades into its downstream consumers.
    fn poll_pending(&mut self) {
        let newly_settled: HashSet<VariableId> = self
            .variables
            .iter_mut()
            .filter_map(|(id, v)| (v.is_pending() && v.commit_promise()).then(|| id.clone()))
            .collect();
        if newly_settled.is_empty() {
            return;
        }
        for cid in self.graph.constraints() {
            let Some(mid) = self.planner.get_sgraph().selected_method(&cid).cloned() else {
                continue;
            };
            if self.graph.outputs_for(&mid).iter().any(|v| newly_settled.contains(v)) {
                self.need_evaluating.insert(cid);
            }
        }
    }

    fn run_evaluate(&mut self) {
        let needs: Vec<ConstraintId> = self.need_evaluating.drain().collect();
        let prior_values: HashMap<VariableId, T> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.value().clone()))
            .collect();
        let _activations = evaluator::evaluate(
            &self.graph,
            self.planner.get_sgraph(),
            &self.last_topo_order,
            &needs,
            &prior_values,
            &mut self.variables,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::promise::{pending, ready};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn method(name: &str, inputs: &[&str], outputs: &[&str]) -> Method<i32> {
        Method::new(
            name,
            inputs.iter().map(|v| ((*v).into(), false)).collect(),
            outputs.iter().map(|v| (*v).into()).collect(),
            Rc::new(|inputs: Vec<i32>| inputs.into_iter().map(ready).collect()),
        )
        .unwrap()
    }

    fn tri_chain() -> PropertySystem<i32> {
        let mut sys = PropertySystem::new();
        sys.set_schedule_update_on_change(false);
        sys.add_variable("a", 0);
        sys.add_variable("b", 0);
        sys.add_variable("c", 0);
        sys.add_constraint(Constraint::new(
            "C1",
            vec![method("a_to_b", &["a"], &["b"]), method("b_to_a", &["b"], &["a"])],
        ));
        sys.add_constraint(Constraint::new(
            "C2",
            vec![method("b_to_c", &["b"], &["c"]), method("c_to_b", &["c"], &["b"])],
        ));
        sys
    }

    #[test]
    fn tri_chain_propagates_an_edit_end_to_end() {
        let mut sys = tri_chain();
        sys.set_value(&"a".into(), 1);
        sys.update();

        assert_eq!(sys.value(&"b".into()), Some(&1));
        assert_eq!(sys.value(&"c".into()), Some(&1));
        assert!(sys.is_solved());
    }

    #[test]
    fn strength_promotion_reverses_the_chain() {
        let mut sys = tri_chain();
        sys.set_value(&"a".into(), 1);
        sys.update();
        sys.set_value(&"c".into(), 9);
        sys.update();

        assert_eq!(
            sys.get_sgraph().selected_method(&"C1".into()),
            Some(&MethodId::from("b_to_a"))
        );
        assert_eq!(
            sys.get_sgraph().selected_method(&"C2".into()),
            Some(&MethodId::from("c_to_b"))
        );
        assert_eq!(sys.value(&"a".into()), Some(&9));
        assert_eq!(sys.value(&"b".into()), Some(&9));
    }

    #[test]
    fn an_unresolved_async_method_leaves_the_system_unsolved() {
        let mut sys = PropertySystem::new();
        sys.set_schedule_update_on_change(false);
        sys.add_variable("a", 0);
        sys.add_variable("b", 0);
        let held = Rc::new(RefCell::new(None));
        let held_clone = Rc::clone(&held);
        sys.add_constraint(Constraint::new(
            "C1",
            vec![Method::new(
                "a_to_b",
                vec![("a".into(), false)],
                vec!["b".into()],
                Rc::new(move |_inputs: Vec<i32>| {
                    let (p, r) = pending::<i32>();
                    *held_clone.borrow_mut() = Some(r);
                    vec![p]
                }),
            )
            .unwrap()],
        ));

        sys.set_value(&"a".into(), 5);
        sys.update();
        assert!(!sys.is_solved());
        assert_eq!(sys.is_pending(&"b".into()), Some(true));

        held.borrow_mut().take().unwrap().resolve(5);
        sys.update();
        assert!(sys.is_solved());
        assert_eq!(sys.value(&"b".into()), Some(&5));
    }

    #[test]
    fn touching_a_variable_promotes_its_touch_dependents() {
        let mut sys = PropertySystem::new();
        sys.set_schedule_update_on_change(false);
        sys.add_variable("x", 0);
        sys.add_variable("a", 0);
        sys.add_variable("b", 0);
        sys.add_variable("c", 0);
        for (name, out) in [("C1", "a"), ("C2", "b"), ("C3", "c")] {
            let mut c = Constraint::new(name, vec![method(&format!("{name}_m"), &["x"], &[out])]);
            c.set_level(OptionalLevel::Max);
            sys.add_constraint(c);
        }
        // b's stay (the origin `touch` promotes from) points at C1 and C3:
        // touching b should drag its siblings' computing constraints along.
        let stay_b = ConstraintId::stay_of(&"b".into());
        sys.add_touch_dependency(stay_b.clone(), "C1".into());
        sys.add_touch_dependency(stay_b.clone(), "C3".into());
        sys.update();

        sys.touch(&"b".into());
        let ranking = sys.optional_ranking();
        let rank_of = |id: &ConstraintId| ranking.iter().position(|x| x == id).unwrap();
        assert!(rank_of(&stay_b) < rank_of(&"C1".into()));
        assert!(rank_of(&stay_b) < rank_of(&"C3".into()));
    }

    #[test]
    fn removing_a_variable_still_in_use_is_a_no_op() {
        let mut sys = tri_chain();
        sys.remove_variable(&"a".into());
        assert!(sys.value(&"a".into()).is_some());
    }

    #[test]
    fn unknown_variable_constraint_is_dropped_and_reported() {
        let mut sys = PropertySystem::<i32>::new();
        sys.set_schedule_update_on_change(false);
        let reports = Rc::new(RefCell::new(0));
        let reports_clone = Rc::clone(&reports);
        sys.on_diagnostic(move |_| *reports_clone.borrow_mut() += 1);

        sys.add_constraint(Constraint::new("ghost", vec![method("m", &["a"], &["b"])]));
        assert_eq!(*reports.borrow(), 1);
        assert!(sys.get_cgraph().get_constraint(&"ghost".into()).is_none());
    }
}
