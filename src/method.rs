//! Methods: one alternative way to satisfy a constraint.

use crate::error::{EngineError, MethodFailure};
use crate::ids::{MethodId, VariableId};
use crate::promise::Promise;
use std::rc::Rc;

/// A node in a dataflow graph: something with inputs and outputs that a
/// planner or scheduler can reason about without knowing the concrete
/// method representation. Both [`Method`] and the stay methods it
/// constructs implement this.
pub trait Vertex {
    fn inputs(&self) -> &[VariableId];
    fn outputs(&self) -> &[VariableId];
    fn is_stay(&self) -> bool {
        false
    }
}

/// The function a method runs: takes the current values of its inputs
/// (in declaration order, prior-flagged inputs included) and returns one
/// promise per declared output, in declaration order.
///
/// The function itself may resolve every promise before returning
/// (a synchronous method) or stash resolvers for later (an asynchronous
/// one) — the evaluator treats both identically.
pub type MethodFunction<T> = Rc<dyn Fn(Vec<T>) -> Vec<Promise<T>>>;

/// One alternative computation for a constraint: reads `inputs`, writes
/// `outputs`. Inputs marked as *prior* read the variable's value from
/// before this update began, and are exempt from the input/output
/// self-cycle check.
#[derive(Clone)]
pub struct Method<T> {
    id: MethodId,
    is_stay: bool,
    inputs: Vec<VariableId>,
    prior: Vec<bool>,
    outputs: Vec<VariableId>,
    apply: MethodFunction<T>,
}

impl<T: Clone + 'static> Method<T> {
    /// Builds a method, validating the invariants from the data model:
    /// every output must be distinct, and a non-prior input may not
    /// equal any output.
    pub fn new(
        id: impl Into<MethodId>,
        inputs: Vec<(VariableId, bool)>,
        outputs: Vec<VariableId>,
        apply: MethodFunction<T>,
    ) -> Result<Self, EngineError> {
        let id = id.into();

        let mut seen_outputs = std::collections::HashSet::new();
        for output in &outputs {
            if !seen_outputs.insert(output.clone()) {
                return Err(EngineError::DuplicateOutput(id));
            }
        }
        for (input, is_prior) in &inputs {
            if !is_prior && seen_outputs.contains(input) {
                return Err(EngineError::InputOutputConflict(id, input.clone()));
            }
        }

        let (inputs, prior): (Vec<_>, Vec<_>) = inputs.into_iter().unzip();
        Ok(Self {
            id,
            is_stay: false,
            inputs,
            prior,
            outputs,
            apply,
        })
    }

    /// Constructs the implicit stay method for a variable: no inputs, one
    /// output (the variable itself), and an `apply` that hands back
    /// whatever value it is given unchanged.
    pub fn stay(variable: VariableId) -> Self {
        let mid: MethodId = format!("_stay_{}", variable.as_str()).into();
        Self {
            id: mid,
            is_stay: true,
            inputs: vec![],
            prior: vec![],
            outputs: vec![variable],
            apply: Rc::new(|_| vec![]),
        }
    }

    pub fn id(&self) -> &MethodId {
        &self.id
    }

    /// Prior-flagged inputs are exempt from the write/read self-cycle
    /// check and from the topological scheduler's dataflow edges.
    pub fn prior_flags(&self) -> &[bool] {
        &self.prior
    }

    pub fn is_prior_input(&self, index: usize) -> bool {
        self.prior.get(index).copied().unwrap_or(false)
    }

    /// Applies the method to the given input values, returning one
    /// promise per output.
    pub fn apply(&self, inputs: Vec<T>) -> Vec<Promise<T>> {
        if self.is_stay {
            return inputs.into_iter().map(crate::promise::ready).collect();
        }
        (self.apply)(inputs)
    }
}

impl<T> Vertex for Method<T> {
    fn inputs(&self) -> &[VariableId] {
        &self.inputs
    }

    fn outputs(&self) -> &[VariableId] {
        &self.outputs
    }

    fn is_stay(&self) -> bool {
        self.is_stay
    }
}

impl<T> PartialEq for Method<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for Method<T> {}

impl<T> std::fmt::Debug for Method<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("is_stay", &self.is_stay)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// A method's promise-bearing output record, handed to the enablement
/// analyzer after the evaluator runs a method.
pub struct Activation<T> {
    pub method: MethodId,
    pub inputs: Vec<VariableId>,
    pub outputs: Vec<(VariableId, Promise<T>)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::ready;

    fn id(s: &str) -> VariableId {
        s.into()
    }

    #[test]
    fn duplicate_output_is_rejected() {
        let result = Method::<i32>::new(
            "m",
            vec![],
            vec![id("a"), id("a")],
            Rc::new(|_| vec![]),
        );
        assert!(matches!(result, Err(EngineError::DuplicateOutput(_))));
    }

    #[test]
    fn non_prior_input_equal_to_output_is_rejected() {
        let result = Method::<i32>::new(
            "m",
            vec![(id("a"), false)],
            vec![id("a")],
            Rc::new(|_| vec![]),
        );
        assert!(matches!(result, Err(EngineError::InputOutputConflict(..))));
    }

    #[test]
    fn prior_input_equal_to_output_is_allowed() {
        let result = Method::<i32>::new(
            "m",
            vec![(id("a"), true)],
            vec![id("a")],
            Rc::new(|inputs| inputs.into_iter().map(ready).collect()),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn stay_method_echoes_its_value() {
        let m = Method::<i32>::stay(id("a"));
        assert!(m.is_stay());
        assert_eq!(m.outputs(), &[id("a")]);
        let out = m.apply(vec![5]);
        assert_eq!(out[0].poll_ready(), Some(Ok(5)));
    }

    #[test]
    fn apply_runs_the_supplied_function() {
        let m = Method::<i32>::new(
            "double",
            vec![(id("a"), false)],
            vec![id("b")],
            Rc::new(|inputs| vec![ready(inputs[0] * 2)]),
        )
        .unwrap();
        let out = m.apply(vec![21]);
        assert_eq!(out[0].poll_ready(), Some(Ok(42)));
    }
}
