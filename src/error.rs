//! Error types.
//!
//! Per the error-handling design, most faults in this engine are not
//! fatal: misuse and structural errors are logged and dropped, no-solution
//! and method-runtime errors surface as ordinary signal events. [`EngineError`]
//! exists for the handful of call sites that do need a `Result`.

use crate::ids::{ConstraintId, MethodId, VariableId};
use thiserror::Error;

/// The error a method's promise resolves with.
///
/// Mirrors the shape of `MethodFailure` in the constraint-planning
/// literature this engine descends from: either a precondition the
/// method itself checked failed, or the method's body raised an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MethodFailure {
    #[error("precondition failed: {0}")]
    PreConditionFailure(String),
    #[error("postcondition failed: {0}")]
    PostConditionFailure(String),
    #[error("method body failed: {0}")]
    MethodFailure(String),
}

/// Errors raised by the constraint graph, planner, and update loop.
///
/// These are the "hard" errors: conditions a caller passed a `Result` for
/// rather than one handled by dropping-and-logging. Misuse conditions
/// (duplicate outputs, input==output without a prior flag) are reported
/// through [`crate::event::Diagnostic`] instead, since the design calls for
/// them to be recovered locally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("constraint {0} could not be enforced")]
    NoSolution(ConstraintId),

    #[error("method {0} has a duplicate output variable")]
    DuplicateOutput(MethodId),

    #[error("method {0} reads {1} as a non-prior input and also writes it")]
    InputOutputConflict(MethodId, VariableId),

    #[error("variable {0} is still used by a constraint and cannot be removed")]
    VariableInUse(VariableId),

    #[error("unknown constraint {0}")]
    UnknownConstraint(ConstraintId),

    #[error("unknown method {0}")]
    UnknownMethod(MethodId),

    #[error("unknown variable {0}")]
    UnknownVariable(VariableId),
}

pub type EngineResult<T> = Result<T, EngineError>;
