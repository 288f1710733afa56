//! The constraint graph (C1): the bipartite declaration of variables,
//! methods, and the constraints that own them.

use crate::constraint::Constraint;
use crate::ids::{ConstraintId, MethodId, VariableId};
use crate::method::Method;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Read/write access to the declared constraint graph.
///
/// Mutations are the caller's (C6's) responsibility; everything else
/// only reads. Re-adding an id already present is a no-op for
/// `add_variable`, and replaces the prior registration for
/// `add_constraint` — either way, applying the same add twice has the
/// same effect as applying it once. Removing an unknown id, and
/// querying one, are silent no-ops that return nothing.
pub trait ConstraintGraph<T> {
    fn add_variable(&mut self, id: VariableId);
    /// Removes a variable. Precondition: no constraint currently uses
    /// it — violating this is a structural misuse and the call becomes
    /// a silent no-op, per the error-handling design.
    fn remove_variable(&mut self, id: &VariableId);
    fn add_constraint(&mut self, constraint: Constraint<T>);
    fn remove_constraint(&mut self, id: &ConstraintId);

    fn variables(&self) -> Vec<VariableId>;
    fn constraints(&self) -> Vec<ConstraintId>;
    fn methods_of(&self, cid: &ConstraintId) -> Vec<MethodId>;
    fn constraints_which_use(&self, vid: &VariableId) -> Vec<ConstraintId>;
    fn constraint_for_method(&self, mid: &MethodId) -> Option<ConstraintId>;
    fn inputs_for(&self, mid: &MethodId) -> Vec<VariableId>;
    fn outputs_for(&self, mid: &MethodId) -> Vec<VariableId>;

    fn has_variable(&self, id: &VariableId) -> bool;
    fn has_constraint(&self, id: &ConstraintId) -> bool;
    fn get_constraint(&self, id: &ConstraintId) -> Option<&Constraint<T>>;
    fn get_method(&self, mid: &MethodId) -> Option<&Method<T>>;
}

/// The caching implementation: memoizes `constraintsWhichUse`, the one
/// reverse query expensive enough to be worth it, and invalidates the
/// cache on every mutation.
pub struct CachingConstraintGraph<T> {
    variables: HashSet<VariableId>,
    constraints: HashMap<ConstraintId, Constraint<T>>,
    method_to_constraint: HashMap<MethodId, ConstraintId>,
    reverse_cache: RefCell<Option<HashMap<VariableId, Vec<ConstraintId>>>>,
}

impl<T> Default for CachingConstraintGraph<T> {
    fn default() -> Self {
        Self {
            variables: HashSet::new(),
            constraints: HashMap::new(),
            method_to_constraint: HashMap::new(),
            reverse_cache: RefCell::new(None),
        }
    }
}

impl<T> CachingConstraintGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&self) {
        *self.reverse_cache.borrow_mut() = None;
    }

    fn ensure_reverse_cache(&self) {
        if self.reverse_cache.borrow().is_some() {
            return;
        }
        let mut map: HashMap<VariableId, Vec<ConstraintId>> = HashMap::new();
        for constraint in self.constraints.values() {
            for var in constraint.variables() {
                map.entry(var.clone()).or_default().push(constraint.id().clone());
            }
        }
        *self.reverse_cache.borrow_mut() = Some(map);
    }
}

impl<T: Clone + 'static> ConstraintGraph<T> for CachingConstraintGraph<T> {
    fn add_variable(&mut self, id: VariableId) {
        self.variables.insert(id);
    }

    fn remove_variable(&mut self, id: &VariableId) {
        if self.constraints_which_use(id).is_empty() {
            self.variables.remove(id);
        }
    }

    fn add_constraint(&mut self, constraint: Constraint<T>) {
        if let Some(old) = self.constraints.get(constraint.id()) {
            for method in old.methods() {
                self.method_to_constraint.remove(method.id());
            }
        }
        for method in constraint.methods() {
            self.method_to_constraint
                .insert(method.id().clone(), constraint.id().clone());
        }
        for var in constraint.variables() {
            self.variables.insert(var.clone());
        }
        self.constraints.insert(constraint.id().clone(), constraint);
        self.invalidate();
    }

    fn remove_constraint(&mut self, id: &ConstraintId) {
        if let Some(constraint) = self.constraints.remove(id) {
            for method in constraint.methods() {
                self.method_to_constraint.remove(method.id());
            }
            self.invalidate();
        }
    }

    fn variables(&self) -> Vec<VariableId> {
        self.variables.iter().cloned().collect()
    }

    fn constraints(&self) -> Vec<ConstraintId> {
        self.constraints.keys().cloned().collect()
    }

    fn methods_of(&self, cid: &ConstraintId) -> Vec<MethodId> {
        self.constraints
            .get(cid)
            .map(|c| c.methods().iter().map(|m| m.id().clone()).collect())
            .unwrap_or_default()
    }

    fn constraints_which_use(&self, vid: &VariableId) -> Vec<ConstraintId> {
        self.ensure_reverse_cache();
        self.reverse_cache
            .borrow()
            .as_ref()
            .and_then(|map| map.get(vid).cloned())
            .unwrap_or_default()
    }

    fn constraint_for_method(&self, mid: &MethodId) -> Option<ConstraintId> {
        self.method_to_constraint.get(mid).cloned()
    }

    fn inputs_for(&self, mid: &MethodId) -> Vec<VariableId> {
        self.get_method(mid)
            .map(|m| m.inputs().to_vec())
            .unwrap_or_default()
    }

    fn outputs_for(&self, mid: &MethodId) -> Vec<VariableId> {
        self.get_method(mid)
            .map(|m| m.outputs().to_vec())
            .unwrap_or_default()
    }

    fn has_variable(&self, id: &VariableId) -> bool {
        self.variables.contains(id)
    }

    fn has_constraint(&self, id: &ConstraintId) -> bool {
        self.constraints.contains_key(id)
    }

    fn get_constraint(&self, id: &ConstraintId) -> Option<&Constraint<T>> {
        self.constraints.get(id)
    }

    fn get_method(&self, mid: &MethodId) -> Option<&Method<T>> {
        let cid = self.method_to_constraint.get(mid)?;
        self.constraints
            .get(cid)?
            .methods()
            .iter()
            .find(|m| m.id() == mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::ready;
    use crate::Method;
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

    #[test]
    fn unknown_queries_return_empty() {
        let g = CachingConstraintGraph::<i32>::new();
        assert!(g.methods_of(&"nope".into()).is_empty());
        assert!(g.constraints_which_use(&"nope".into()).is_empty());
        assert!(g.constraint_for_method(&"nope".into()).is_none());
    }

    #[test]
    fn remove_unknown_constraint_is_a_no_op() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.remove_constraint(&"nope".into());
        assert!(g.constraints().is_empty());
    }

    #[test]
    fn adding_a_constraint_registers_its_methods_and_variables() {
        let mut g = CachingConstraintGraph::<i32>::new();
        let c = Constraint::new("c1", vec![method("a_to_b", &["a"], &["b"])]);
        g.add_constraint(c);

        assert!(g.has_variable(&"a".into()));
        assert!(g.has_variable(&"b".into()));
        assert_eq!(g.methods_of(&"c1".into()), vec![MethodId::from("a_to_b")]);
        assert_eq!(
            g.constraint_for_method(&"a_to_b".into()),
            Some("c1".into())
        );
        let mut using_a = g.constraints_which_use(&"a".into());
        using_a.sort();
        assert_eq!(using_a, vec![ConstraintId::from("c1")]);
    }

    #[test]
    fn removing_a_constraint_drops_its_methods() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::new("c1", vec![method("a_to_b", &["a"], &["b"])]));
        g.remove_constraint(&"c1".into());
        assert!(g.constraint_for_method(&"a_to_b".into()).is_none());
        assert!(g.constraints_which_use(&"a".into()).is_empty());
    }

    #[test]
    fn removing_a_variable_still_in_use_is_a_no_op() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::new("c1", vec![method("a_to_b", &["a"], &["b"])]));
        g.remove_variable(&"a".into());
        assert!(g.has_variable(&"a".into()));
    }

    #[test]
    fn re_adding_a_constraint_replaces_it() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::new("c1", vec![method("a_to_b", &["a"], &["b"])]));
        g.add_constraint(Constraint::new("c1", vec![method("b_to_a", &["b"], &["a"])]));
        assert_eq!(g.methods_of(&"c1".into()), vec![MethodId::from("b_to_a")]);
        assert!(g.constraint_for_method(&"a_to_b".into()).is_none());
    }
}
