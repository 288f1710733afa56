//! Touch dependencies: directed promotion edges between constraints
//! (a variable's endpoint is its stay constraint) that re-rank the
//! strength order in response to an edit.

use crate::graph::ConstraintGraph;
use crate::ids::ConstraintId;
use crate::planner::Planner;
use crate::variable::OptionalLevel;
use std::collections::{HashMap, HashSet};

/// The declared touch-dependency edges.
#[derive(Default)]
pub struct TouchGraph {
    edges: HashMap<ConstraintId, Vec<ConstraintId>>,
}

impl TouchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dependency(&mut self, from: ConstraintId, to: ConstraintId) {
        let neighbors = self.edges.entry(from).or_default();
        if !neighbors.contains(&to) {
            neighbors.push(to);
        }
    }

    pub fn remove_dependency(&mut self, from: &ConstraintId, to: &ConstraintId) {
        if let Some(neighbors) = self.edges.get_mut(from) {
            neighbors.retain(|n| n != to);
        }
    }

    /// Connects every distinct pair in `ids` with a touch dependency, so
    /// that touching any one of them promotes every other member.
    pub fn add_touch_set(&mut self, ids: &[ConstraintId]) {
        for from in ids {
            for to in ids {
                if from != to {
                    self.add_dependency(from.clone(), to.clone());
                }
            }
        }
    }

    pub fn remove_touch_set(&mut self, ids: &[ConstraintId]) {
        for from in ids {
            for to in ids {
                if from != to {
                    self.remove_dependency(from, to);
                }
            }
        }
    }

    pub fn neighbors(&self, from: &ConstraintId) -> &[ConstraintId] {
        self.edges.get(from).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Breadth-first promotion from an edited constraint's id (a variable's
/// stay, for an ordinary edit): every constraint reachable through
/// touch-dependency edges with a non-`Default` optional level gets
/// visited once, grouped by BFS generation and sorted within each
/// generation by current strength descending. The whole collected order
/// is then max-strength-promoted in reverse, so the originating
/// constraint ends up strongest of all. Returns the ids among those
/// promoted that are not currently enforced, for the caller to fold into
/// `needEnforcing`.
pub fn do_promotions<T>(
    origin: &ConstraintId,
    touch: &TouchGraph,
    graph: &impl ConstraintGraph<T>,
    planner: &mut dyn Planner<T>,
) -> Vec<ConstraintId> {
    let mut visited: HashSet<ConstraintId> = HashSet::new();
    visited.insert(origin.clone());
    let mut collected: Vec<ConstraintId> = vec![origin.clone()];
    let mut frontier = vec![origin.clone()];

    while !frontier.is_empty() {
        let mut next_gen = Vec::new();
        for node in &frontier {
            for neighbor in touch.neighbors(node) {
                if visited.contains(neighbor) {
                    continue;
                }
                let qualifies = graph
                    .get_constraint(neighbor)
                    .map(|c| c.level() != OptionalLevel::Default)
                    .unwrap_or(false);
                if !qualifies {
                    continue;
                }
                visited.insert(neighbor.clone());
                next_gen.push(neighbor.clone());
            }
        }
        if next_gen.is_empty() {
            break;
        }
        next_gen.sort_by(|a, b| planner.compare(a, b).reverse());
        collected.extend(next_gen.iter().cloned());
        frontier = next_gen;
    }

    for id in collected.iter().rev() {
        planner.set_max_strength(id);
    }

    collected
        .into_iter()
        .filter(|id| !planner.get_sgraph().is_enforced(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::graph::CachingConstraintGraph;
    use crate::method::Method;
    use crate::planner::QuickPlanner;
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
    fn touching_one_member_promotes_the_rest_of_its_touch_set() {
        let mut g = CachingConstraintGraph::<i32>::new();
        for (name, m_name, out_name) in [
            ("C1", "C1_m", "C1_out"),
            ("C2", "C2_m", "C2_out"),
            ("C3", "C3_m", "C3_out"),
        ] {
            let mut c = Constraint::new(name, vec![method(m_name, &["x"], &[out_name])]);
            c.set_level(OptionalLevel::Max);
            g.add_constraint(c);
        }

        let mut touch = TouchGraph::new();
        touch.add_touch_set(&[
            ConstraintId::from("C1"),
            ConstraintId::from("C2"),
            ConstraintId::from("C3"),
        ]);

        let mut planner = QuickPlanner::new();
        planner.register_optional(&"C1".into(), OptionalLevel::Max);
        planner.register_optional(&"C2".into(), OptionalLevel::Max);
        planner.register_optional(&"C3".into(), OptionalLevel::Max);

        let needs_enforcing = do_promotions(&"C2".into(), &touch, &g, &mut planner);

        // C2 is the origin, so it ends up strongest of the three.
        let ranking = planner.get_optionals();
        let rank_of = |id: &str| ranking.iter().position(|x| x.as_str() == id).unwrap();
        assert!(rank_of("C2") < rank_of("C1"));
        assert!(rank_of("C2") < rank_of("C3"));

        // None were previously enforced, so all three need enforcing.
        let mut ids: Vec<_> = needs_enforcing.iter().map(|c| c.as_str().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn default_level_neighbors_are_not_visited() {
        let mut g = CachingConstraintGraph::<i32>::new();
        g.add_constraint(Constraint::new("C1", vec![method("m1", &["x"], &["a"])]));
        g.add_constraint(Constraint::new("C2", vec![method("m2", &["x"], &["b"])]));
        // C2 kept at Default level deliberately.

        let mut touch = TouchGraph::new();
        touch.add_dependency("C1".into(), "C2".into());

        let mut planner = QuickPlanner::new();
        planner.register_optional(&"C1".into(), OptionalLevel::Max);
        planner.register_optional(&"C2".into(), OptionalLevel::Default);

        do_promotions(&"C1".into(), &touch, &g, &mut planner);
        let ranking = planner.get_optionals();
        assert!(!ranking.contains(&ConstraintId::from("C2")) || ranking[0].as_str() != "C2");
    }
}
