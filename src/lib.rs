//! Core of a multi-way dataflow constraint system ("property model").
//!
//! Users declare variables, multi-method constraints, stay constraints
//! expressing preferences, touch dependencies that reorder those
//! preferences in response to edits, and outputs. The engine maintains a
//! constraint graph ([`graph`]), reacts to edits by promoting stays and
//! replanning ([`strength`], [`planner`]), schedules the chosen methods
//! into a topological evaluation order ([`scheduler`]), executes them
//! ([`evaluator`]), and labels variables as relevant or irrelevant with
//! respect to the declared outputs ([`enablement`]). [`system`] wires all
//! of this into the update loop that a caller actually drives.

pub mod constraint;
pub mod enablement;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod graph;
pub mod ids;
pub mod method;
pub mod planner;
pub mod promise;
pub mod scheduler;
pub mod strength;
pub mod system;
pub mod touch;
pub mod variable;

pub use constraint::Constraint;
pub use error::{EngineError, MethodFailure};
pub use event::Event;
pub use graph::{CachingConstraintGraph, ConstraintGraph};
pub use ids::{ConstraintId, MethodId, VariableId};
pub use method::Method;
pub use planner::{Planner, QuickPlanner};
pub use system::PropertySystem;
pub use variable::{Fuzzy, OptionalLevel, Variable};
