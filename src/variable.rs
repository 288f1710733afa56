//! Variables: the nodes of a constraint graph that hold values.

use crate::ids::VariableId;
use crate::promise::Promise;
use std::fmt::Debug;

/// The initial placement of an optional constraint (or a stay) relative
/// to the other optional constraints in the planner's strength order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OptionalLevel {
    /// Placed at the strong end of the order on creation.
    Max,
    /// Placed at the weak end of the order on creation.
    Min,
    /// Placed wherever the planner's default insertion point is.
    Default,
}

/// A three-valued lattice used for `contributing` and `relevant` labels.
///
/// `Yes` and `No` are the crisp endpoints; `Maybe` means the variable is
/// reachable only through an assumed (prior-flagged, not-yet-scheduled)
/// input.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Fuzzy {
    Yes,
    Maybe,
    #[default]
    No,
}

impl Fuzzy {
    /// Combines two labels for the same variable arriving via different
    /// paths: `Yes` beats `Maybe` beats `No`.
    pub fn join(self, other: Fuzzy) -> Fuzzy {
        use Fuzzy::*;
        match (self, other) {
            (Yes, _) | (_, Yes) => Yes,
            (Maybe, _) | (_, Maybe) => Maybe,
            (No, No) => No,
        }
    }

    /// Combines two labels for the same path, where the path is only as
    /// good as its weakest link: `No` beats `Maybe` beats `Yes`.
    pub fn meet(self, other: Fuzzy) -> Fuzzy {
        use Fuzzy::*;
        match (self, other) {
            (No, _) | (_, No) => No,
            (Maybe, _) | (_, Maybe) => Maybe,
            (Yes, Yes) => Yes,
        }
    }
}

/// A variable in the constraint graph.
///
/// Holds the current value together with the bookkeeping the rest of the
/// engine needs: whether it is `pending` on an unresolved method
/// activation, whether its stay is currently selected (`source`), and its
/// `contributing`/`relevant` enablement labels.
pub struct Variable<T> {
    id: VariableId,
    value: T,
    level: Option<OptionalLevel>,
    pending: bool,
    source: bool,
    contributing: Fuzzy,
    relevant: Fuzzy,
    promise: Option<Promise<T>>,
}

impl<T: Clone + PartialEq> Variable<T> {
    /// Creates a new variable with the given initial value.
    pub fn new(id: impl Into<VariableId>, value: T) -> Self {
        Self {
            id: id.into(),
            value,
            level: None,
            pending: false,
            source: true,
            contributing: Fuzzy::No,
            relevant: Fuzzy::No,
            promise: None,
        }
    }

    /// Returns the id of this variable.
    pub fn id(&self) -> &VariableId {
        &self.id
    }

    /// Returns the current (settled) value of the variable.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Overwrites the value directly, suppressing the write if the new
    /// value equals the old one (the equality predicate referenced in the
    /// data model).
    ///
    /// Returns `true` if the value actually changed.
    pub fn set_value(&mut self, value: T) -> bool {
        if self.value == value {
            false
        } else {
            self.value = value;
            true
        }
    }

    /// Returns the variable's optional level, if it is a source that
    /// participates in the planner's strength order directly (most
    /// variables get their level from their stay constraint instead).
    pub fn level(&self) -> Option<OptionalLevel> {
        self.level
    }

    pub fn set_level(&mut self, level: Option<OptionalLevel>) {
        self.level = level;
    }

    /// True while an edit or upstream method has not yet committed.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// True iff the variable's stay is currently selected by the planner,
    /// i.e. it is a dataflow root for the current solution graph.
    pub fn is_source(&self) -> bool {
        self.source
    }

    pub fn set_source(&mut self, source: bool) {
        self.source = source;
    }

    pub fn contributing(&self) -> Fuzzy {
        self.contributing
    }

    pub fn set_contributing(&mut self, label: Fuzzy) {
        self.contributing = label;
    }

    pub fn relevant(&self) -> Fuzzy {
        self.relevant
    }

    pub fn set_relevant(&mut self, label: Fuzzy) {
        self.relevant = label;
    }

    /// Attaches a pending promise that will eventually resolve to a new
    /// value for this variable, marking it pending.
    pub fn attach_promise(&mut self, promise: Promise<T>) {
        self.pending = true;
        self.promise = Some(promise);
    }

    /// Returns a reference to the attached promise, if any.
    pub fn promise(&self) -> Option<&Promise<T>> {
        self.promise.as_ref()
    }

    /// If a promise is attached and has resolved, replaces the exposed
    /// value with its resolution and clears pending/promise state.
    /// Returns `true` if a commit happened.
    pub fn commit_promise(&mut self) -> bool
    where
        T: Debug,
    {
        let Some(promise) = &self.promise else {
            return false;
        };
        match promise.poll_ready() {
            None => false,
            Some(resolution) => {
                self.promise = None;
                self.pending = false;
                match resolution {
                    Ok(value) => {
                        self.value = value;
                    }
                    Err(_) => {
                        // The exposed value is left as-is; the error is
                        // surfaced to subscribers via the evaluator, not
                        // stored on the variable itself.
                    }
                }
                true
            }
        }
    }
}

impl<T: Debug> Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("pending", &self.pending)
            .field("source", &self.source)
            .finish()
    }
}
