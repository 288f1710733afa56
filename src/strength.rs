//! The planner's strength order: a total order over optional constraint
//! ids (stays included), consulted by the planner when it needs to know
//! which of two competing constraints should win a variable, and by the
//! scheduler when breaking toposort ties.
//!
//! A from-scratch linked list (the structure this is grounded on,
//! `touch`-to-head in O(1), full `ranking()` in O(n)) cannot answer
//! `compare(a, b)` without an O(n) walk. Since the planner calls
//! `compare` far more often than it reinserts, this instead keeps an
//! indexed ordered container: a sorted map from rank to id plus the
//! reverse lookup, so promotion to either end is O(log n) and `compare`
//! is O(1).

use crate::ids::ConstraintId;
use crate::variable::OptionalLevel;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// A total order over constraint ids, strongest first.
pub struct StrengthOrder {
    rank_of: HashMap<ConstraintId, i64>,
    by_rank: BTreeMap<i64, ConstraintId>,
    next_high: i64,
    next_low: i64,
}

impl Default for StrengthOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl StrengthOrder {
    pub fn new() -> Self {
        Self {
            rank_of: HashMap::new(),
            by_rank: BTreeMap::new(),
            next_high: 0,
            next_low: -1,
        }
    }

    fn unlink(&mut self, id: &ConstraintId) {
        if let Some(rank) = self.rank_of.remove(id) {
            self.by_rank.remove(&rank);
        }
    }

    /// Moves (or inserts) `id` to the strongest end of the order.
    pub fn set_max_strength(&mut self, id: &ConstraintId) {
        self.unlink(id);
        let rank = self.next_high;
        self.next_high += 1;
        self.rank_of.insert(id.clone(), rank);
        self.by_rank.insert(rank, id.clone());
    }

    /// Moves (or inserts) `id` to the weakest end of the order.
    pub fn set_min_strength(&mut self, id: &ConstraintId) {
        self.unlink(id);
        let rank = self.next_low;
        self.next_low -= 1;
        self.rank_of.insert(id.clone(), rank);
        self.by_rank.insert(rank, id.clone());
    }

    /// Removes `id` from the order entirely (it is no longer optional).
    pub fn remove(&mut self, id: &ConstraintId) {
        self.unlink(id);
    }

    /// Places a newly-registered optional (non-stay) constraint
    /// according to its declared level. A constraint with `Default`
    /// level is placed stronger than anything already present — a
    /// declared constraint is expected to dominate the bare stay
    /// fallback until something explicitly demotes it. `Min` sends it
    /// straight to the weak end instead.
    pub fn insert_optional(&mut self, id: &ConstraintId, level: OptionalLevel) {
        if self.contains(id) {
            return;
        }
        match level {
            OptionalLevel::Max | OptionalLevel::Default => self.set_max_strength(id),
            OptionalLevel::Min => self.set_min_strength(id),
        }
    }

    /// Places a newly-created variable's stay at the weak end: stays are
    /// the fallback of last resort and start out weaker than every
    /// declared constraint.
    pub fn insert_stay(&mut self, id: &ConstraintId) {
        if !self.contains(id) {
            self.set_min_strength(id);
        }
    }

    pub fn contains(&self, id: &ConstraintId) -> bool {
        self.rank_of.contains_key(id)
    }

    /// Compares the strength of two constraints: `Greater` means `a` is
    /// stronger than `b`. An id not currently in the order is treated as
    /// weaker than anything that is.
    pub fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> std::cmp::Ordering {
        let ra = self.rank_of.get(a);
        let rb = self.rank_of.get(b);
        ra.cmp(&rb)
    }

    /// The current order, strongest first.
    pub fn ranking(&self) -> Vec<ConstraintId> {
        self.by_rank.values().rev().cloned().collect()
    }

    /// Snapshot for planner hand-off (`getOptionals`).
    pub fn get_optionals(&self) -> Vec<ConstraintId> {
        self.ranking()
    }

    /// Restores a snapshot taken from `get_optionals`, strongest first.
    /// Used when the planner is swapped out: the new planner's order
    /// should preserve whatever strength relationships the old one had.
    pub fn set_optionals(&mut self, ids: Vec<ConstraintId>) {
        self.rank_of.clear();
        self.by_rank.clear();
        self.next_high = 0;
        self.next_low = -1;
        // Processed in reverse so the first id in `ids` is the last one
        // maxed, and therefore ends up strongest, matching the
        // strongest-first convention `ids` is documented to use.
        for id in ids.iter().rev() {
            self.set_max_strength(id);
        }
    }

    /// Re-ranks exactly the ids named in `strongest_first`, in that
    /// order, to the strong end of the order, leaving every id not
    /// mentioned at its previous (now weaker) relative position.
    ///
    /// This is how the update loop keeps the strength order honest after
    /// every successful plan: it re-derives priorities from the actual
    /// topological evaluation order so that a variable which stops being
    /// a dataflow source also stops outranking the constraint that now
    /// computes it.
    pub fn adjust(&mut self, strongest_first: &[ConstraintId]) {
        for id in strongest_first.iter().rev() {
            self.set_max_strength(id);
        }
    }

    pub fn len(&self) -> usize {
        self.rank_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rank_of.is_empty()
    }
}
