//! Constraints: an ordered set of alternative methods over a set of
//! variables.

use crate::ids::{ConstraintId, VariableId};
use crate::method::Method;
use crate::variable::OptionalLevel;
use std::collections::HashSet;

/// A constraint owns an ordered list of [`Method`]s, each an alternative
/// way to keep the constraint's variables consistent. Declaration order
/// among methods is the tie-break the planner uses when more than one
/// candidate is equally viable.
pub struct Constraint<T> {
    id: ConstraintId,
    methods: Vec<Method<T>>,
    variables: HashSet<VariableId>,
    level: OptionalLevel,
    touch_variables: Option<Vec<VariableId>>,
    required: bool,
}

impl<T: Clone + 'static> Constraint<T> {
    /// Builds an optional constraint from its alternative methods. The
    /// constraint's variable set is the union of every method's inputs
    /// and outputs. An optional constraint competes for its variables'
    /// outputs through the planner's strength order and may end up
    /// unenforced if no alternative is viable.
    pub fn new(id: impl Into<ConstraintId>, methods: Vec<Method<T>>) -> Self {
        let mut variables = HashSet::new();
        for method in &methods {
            variables.extend(method.inputs().iter().cloned());
            variables.extend(method.outputs().iter().cloned());
        }
        Self {
            id: id.into(),
            methods,
            variables,
            level: OptionalLevel::Default,
            touch_variables: None,
            required: false,
        }
    }

    /// Builds a required constraint: its single method must be enforced
    /// or the whole `plan()` call fails and the previous solution graph
    /// is kept. Required constraints sit outside the strength order
    /// entirely and are resolved before any optional constraint.
    pub fn required(id: impl Into<ConstraintId>, method: Method<T>) -> Self {
        let mut variables = HashSet::new();
        variables.extend(method.inputs().iter().cloned());
        variables.extend(method.outputs().iter().cloned());
        Self {
            id: id.into(),
            methods: vec![method],
            variables,
            level: OptionalLevel::Default,
            touch_variables: None,
            required: true,
        }
    }

    /// The implicit stay constraint for a variable: single method, no
    /// inputs, one output (the variable).
    pub fn stay(variable: VariableId) -> Self {
        let cid = ConstraintId::stay_of(&variable);
        let method = Method::stay(variable.clone());
        let mut variables = HashSet::new();
        variables.insert(variable);
        Self {
            id: cid,
            methods: vec![method],
            variables,
            level: OptionalLevel::Default,
            touch_variables: None,
            required: false,
        }
    }

    pub fn id(&self) -> &ConstraintId {
        &self.id
    }

    pub fn methods(&self) -> &[Method<T>] {
        &self.methods
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableId> {
        self.variables.iter()
    }

    pub fn is_stay(&self) -> bool {
        self.methods.len() == 1 && self.methods[0].is_stay()
    }

    /// A required constraint's single method must be enforced or
    /// `plan()` fails entirely; everything else, including single-method
    /// optional constraints and the stay, competes through the strength
    /// order and may simply go unenforced.
    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn level(&self) -> OptionalLevel {
        self.level
    }

    pub fn set_level(&mut self, level: OptionalLevel) {
        self.level = level;
    }

    pub fn touch_variables(&self) -> Option<&[VariableId]> {
        self.touch_variables.as_deref()
    }

    pub fn set_touch_variables(&mut self, vars: Option<Vec<VariableId>>) {
        self.touch_variables = vars;
    }
}

impl<T> std::fmt::Debug for Constraint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("id", &self.id)
            .field("n_methods", &self.methods.len())
            .field("level", &self.level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::ready;
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
    fn constraint_variable_set_is_the_union_of_its_methods() {
        let c = Constraint::new(
            "c1",
            vec![method("a_to_b", &["a"], &["b"]), method("b_to_a", &["b"], &["a"])],
        );
        let vars: HashSet<_> = c.variables().cloned().collect();
        assert_eq!(vars.len(), 2);
        assert!(vars.contains(&VariableId::from("a")));
        assert!(vars.contains(&VariableId::from("b")));
    }

    #[test]
    fn stay_constraint_has_a_single_stay_method() {
        let c: Constraint<i32> = Constraint::stay("a".into());
        assert!(c.is_stay());
        assert!(!c.is_required());
        assert_eq!(c.id().as_str(), "_stay_a");
    }

    #[test]
    fn required_constraint_is_marked_as_such() {
        let c = Constraint::required("must_hold", method("m", &["a"], &["b"]));
        assert!(c.is_required());
        assert!(!c.is_stay());
    }

    #[test]
    fn single_method_constraint_built_with_new_is_still_optional() {
        let c = Constraint::new("c1", vec![method("b_to_a", &["b"], &["a"])]);
        assert!(!c.is_required());
    }

    #[test]
    fn multi_method_constraint_is_optional() {
        let c = Constraint::new(
            "c1",
            vec![method("a_to_b", &["a"], &["b"]), method("b_to_a", &["b"], &["a"])],
        );
        assert!(!c.is_required());
    }
}
