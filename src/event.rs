//! Reactive signals and the cooperative priority scheduler they and the
//! update loop share.
//!
//! A [`Signal`] is a small single-threaded pub/sub: subscribing replays
//! the last emitted event immediately, matching the "replay on
//! subscribe" behavior the design notes call for. [`Scheduler`] is the
//! one place suspension happens: nothing in this engine spawns a thread
//! or blocks, it only ever schedules a closure at a priority and runs
//! the queue to quiescence when asked.

use crate::error::MethodFailure;
use crate::ids::{ConstraintId, MethodId, VariableId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::Rc;

/// A recoverable misuse or structural condition: per the error-handling
/// design, the offending call is dropped and the engine continues. Logged
/// as a warning and also emitted on the update loop's diagnostics signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    DuplicateOutput(MethodId),
    InputOutputConflict(MethodId, VariableId),
    VariableInUse(VariableId),
    UnknownConstraint(ConstraintId),
    UnknownMethod(MethodId),
    UnknownVariable(VariableId),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateOutput(m) => write!(f, "method {m} has a duplicate output variable"),
            Diagnostic::InputOutputConflict(m, v) => {
                write!(f, "method {m} reads {v} as a non-prior input and also writes it")
            }
            Diagnostic::VariableInUse(v) => {
                write!(f, "variable {v} is still used by a constraint and cannot be removed")
            }
            Diagnostic::UnknownConstraint(c) => write!(f, "unknown constraint {c}"),
            Diagnostic::UnknownMethod(m) => write!(f, "unknown method {m}"),
            Diagnostic::UnknownVariable(v) => write!(f, "unknown variable {v}"),
        }
    }
}

/// A variable's settlement state, as seen by a subscriber.
#[derive(Debug)]
pub enum Event<T> {
    Pending,
    Ready(Rc<T>),
    Error(Rc<MethodFailure>),
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        match self {
            Event::Pending => Event::Pending,
            Event::Ready(v) => Event::Ready(Rc::clone(v)),
            Event::Error(e) => Event::Error(Rc::clone(e)),
        }
    }
}

/// Names the variable an event is about; used once components/contexts
/// producing events are layered on top of this engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub variable: VariableId,
}

type SubscriptionId = u64;

/// A replay-last-value subject: subscribers are called with the most
/// recently emitted event immediately upon subscribing, and with every
/// event emitted afterward.
pub struct Signal<T> {
    last: Option<Event<T>>,
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Box<dyn FnMut(&Event<T>)>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            last: None,
            next_id: 0,
            subscribers: HashMap::new(),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes, immediately replaying the last event if one exists.
    /// Returns a token usable with [`Signal::unsubscribe`].
    pub fn subscribe(&mut self, mut callback: impl FnMut(&Event<T>) + 'static) -> SubscriptionId {
        if let Some(event) = &self.last {
            callback(event);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, Box::new(callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.remove(&id);
    }

    pub fn emit(&mut self, event: Event<T>) {
        for subscriber in self.subscribers.values_mut() {
            subscriber(&event);
        }
        self.last = Some(event);
    }

    pub fn latest(&self) -> Option<&Event<T>> {
        self.last.as_ref()
    }
}

/// Reactive signal propagation runs before the batched system update:
/// lower numeric value means higher priority.
pub const REACTIVE_SIGNAL_PRIORITY: u8 = 0;
/// The priority `scheduleUpdateOnChange` schedules a batched update at.
pub const SYSTEM_UPDATE_PRIORITY: u8 = 1;

struct Task {
    priority: u8,
    seq: u64,
    action: Box<dyn FnOnce()>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Task {}
impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want lower priority numbers and
        // lower sequence numbers to come out first, so reverse both.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A single-threaded cooperative priority queue. Nothing here ever
/// blocks: `run_to_quiescence` just drains whatever is queued,
/// including tasks newly queued by earlier ones, in priority order.
#[derive(Default)]
pub struct Scheduler {
    queue: BinaryHeap<Task>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, priority: u8, action: impl FnOnce() + 'static) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Task {
            priority,
            seq,
            action: Box::new(action),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Runs every scheduled task, including ones scheduled by tasks that
    /// ran earlier in the same call, until the queue is empty.
    pub fn run_to_quiescence(&mut self) {
        while let Some(task) = self.queue.pop() {
            (task.action)();
        }
    }
}
