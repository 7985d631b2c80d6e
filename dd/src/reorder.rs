// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Variable reordering.
//!
//! Both entry points take `&mut self`: a reorder can only start when no
//! kernel is running and no unregistered intermediate handles exist, and the
//! exclusive borrow makes that a compile-time fact for safe callers. Roots
//! are rebuilt under the new order and replaced in place; handles not passed
//! in are dangling afterwards.
//!
//! Rebuilding goes through the if-then-else kernels rather than in-place
//! level swaps: the rebuilt diagram is constructed bottom-up with every node
//! re-interned under the target order, which keeps complement-edge canonicity
//! and value-diagram invariants intact at every step.

use fxhash::{FxHashMap, FxHashSet};
use log::debug;

use crate::manager::{DdError, DdManager, Variable};
use crate::reference::Ref;

impl DdManager {
    /// Rebuilds every diagram in `roots` under `order` and makes `order` the
    /// manager's variable order. `order` must mention every variable exactly
    /// once.
    pub fn set_variable_order(
        &mut self,
        order: &[Variable],
        roots: &mut [Ref],
    ) -> Result<(), DdError> {
        let count = self.variable_count();
        if order.len() != count {
            return Err(DdError::InvalidArgument(format!(
                "order lists {} of {count} variables",
                order.len()
            )));
        }
        let mut seen = vec![false; count];
        for variable in order {
            if variable.index() >= count || seen[variable.index()] {
                return Err(DdError::InvalidArgument(format!(
                    "order repeats or invents variable {}",
                    variable.index()
                )));
            }
            seen[variable.index()] = true;
        }

        // target level of each variable
        let mut new_level = vec![0u32; count];
        for (level, variable) in order.iter().enumerate() {
            new_level[variable.index()] = level as u32;
        }

        let mut cache: FxHashMap<Ref, Ref> = FxHashMap::default();
        for root in roots.iter_mut() {
            let value_diagram = self.diagram_kind(*root).is_some();
            *root = self.translate(*root, value_diagram, &new_level, &mut cache);
        }

        self.set_order(order);
        self.clear_caches();
        self.collect_garbage(roots);
        Ok(())
    }

    /// Rebuilds `f` with every variable moved to its new level. Reads the
    /// current order, so it must run before the order is switched.
    fn translate(
        &self,
        f: Ref,
        value_diagram: bool,
        new_level: &[u32],
        cache: &mut FxHashMap<Ref, Ref>,
    ) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.translate(-f, value_diagram, new_level, cache);
        }
        if let Some(&result) = cache.get(&f) {
            return result;
        }
        let (f0, f1) = self.cofactors(f);
        let low = self.translate(f0, value_diagram, new_level, cache);
        let high = self.translate(f1, value_diagram, new_level, cache);
        let variable = self.variable_at_level(self.level(f));
        let target = new_level[variable.index()];
        let literal = self.mk_bool_node(target, self.zero, self.one);
        let result = if value_diagram {
            self.value_ite_rec(literal, high, low)
        } else {
            self.ite_rec(literal, high, low)
        };
        cache.insert(f, result);
        result
    }

    /// Sifting: moves each variable through every position of the order,
    /// keeping the position that minimizes the shared node count of `roots`.
    /// Row/column pairs move as one block so relational operations stay
    /// cheap. Stops after one pass over the variables.
    pub fn reorder_sifting(&mut self, roots: &mut [Ref]) -> Result<(), DdError> {
        let units = self.order_units();
        if units.len() < 2 {
            return Ok(());
        }
        let before = self.node_count(roots);

        // sift large contributors first; a unit is tracked by its first
        // variable since its position keeps changing
        let contributions = self.unit_contributions(&units, roots);
        let mut anchors: Vec<(Variable, usize)> = units
            .iter()
            .zip(contributions)
            .map(|(unit, contribution)| (unit[0], contribution))
            .collect();
        anchors.sort_by_key(|&(_, contribution)| std::cmp::Reverse(contribution));

        let mut current = units;
        for (anchor, _) in anchors {
            let Some(position) = current.iter().position(|u| u[0] == anchor) else {
                continue;
            };
            let mut best_size = self.node_count(roots);
            let mut best_position = position;
            for candidate in 0..current.len() {
                if candidate == position {
                    continue;
                }
                let mut attempt = current.clone();
                let block = attempt.remove(position);
                attempt.insert(candidate, block);
                self.set_variable_order(&flatten(&attempt), roots)?;
                let size = self.node_count(roots);
                if size < best_size {
                    best_size = size;
                    best_position = candidate;
                }
            }
            let block = current.remove(position);
            current.insert(best_position, block);
            self.set_variable_order(&flatten(&current), roots)?;
        }

        let after = self.node_count(roots);
        debug!("sifting went from {before} to {after} nodes");
        Ok(())
    }

    /// The current order grouped into sift units: a row and its column form
    /// one block, unpaired variables stand alone.
    fn order_units(&self) -> Vec<Vec<Variable>> {
        let mut units = Vec::new();
        let mut grouped: FxHashSet<Variable> = FxHashSet::default();
        for variable in self.variable_order() {
            if grouped.contains(&variable) {
                continue;
            }
            match self.partner_of(variable) {
                Some(partner) => {
                    grouped.insert(partner);
                    units.push(vec![variable, partner]);
                }
                None => units.push(vec![variable]),
            }
        }
        units
    }

    /// Number of nodes of `roots` labelled by each unit's variables.
    fn unit_contributions(&self, units: &[Vec<Variable>], roots: &[Ref]) -> Vec<usize> {
        let mut level_counts: FxHashMap<u32, usize> = FxHashMap::default();
        for index in self.descendants(roots.iter().copied()) {
            *level_counts
                .entry(self.level(Ref::positive(index)))
                .or_insert(0) += 1;
        }
        units
            .iter()
            .map(|unit| {
                unit.iter()
                    .map(|&v| level_counts.get(&self.level_of(v)).copied().unwrap_or(0))
                    .sum()
            })
            .collect()
    }
}

fn flatten(units: &[Vec<Variable>]) -> Vec<Variable> {
    units.iter().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueKind};

    fn truth_table(manager: &DdManager, f: Ref, variables: &[Variable]) -> Vec<bool> {
        let mut rows = Vec::new();
        for bits in 0..(1u32 << variables.len()) {
            let assignment: Vec<_> = variables
                .iter()
                .enumerate()
                .map(|(i, &v)| (v, (bits >> i) & 1 == 1))
                .collect();
            rows.push(manager.evaluate(f, &assignment));
        }
        rows
    }

    #[test]
    fn test_set_variable_order_preserves_semantics() {
        let mut manager = DdManager::new();
        let vars: Vec<Variable> = (0..4).map(|_| manager.new_variable()).collect();
        let f = {
            let ac = manager.apply_and(manager.literal(vars[0]), manager.literal(vars[2]));
            let bd = manager.apply_and(manager.literal(vars[1]), manager.literal(vars[3]));
            manager.apply_or(ac, bd)
        };
        let before = truth_table(&manager, f, &vars);

        let mut roots = [f];
        let reversed: Vec<Variable> = vars.iter().rev().copied().collect();
        manager.set_variable_order(&reversed, &mut roots).unwrap();
        assert_eq!(truth_table(&manager, roots[0], &vars), before);
        assert_eq!(manager.level_of(vars[3]), 0);
    }

    #[test]
    fn test_set_variable_order_rejects_non_permutations() {
        let mut manager = DdManager::new();
        let a = manager.new_variable();
        let b = manager.new_variable();
        let mut roots: [Ref; 0] = [];
        assert!(manager.set_variable_order(&[a], &mut roots).is_err());
        assert!(manager.set_variable_order(&[a, a], &mut roots).is_err());
        let _ = b;
    }

    #[test]
    fn test_sifting_shrinks_a_bad_order() {
        let mut manager = DdManager::new();
        // the classic worst case: a1*b1 + a2*b2 + a3*b3 with all the a's
        // before all the b's
        let a: Vec<Variable> = (0..3).map(|_| manager.new_variable()).collect();
        let b: Vec<Variable> = (0..3).map(|_| manager.new_variable()).collect();
        let mut f = manager.zero;
        for i in 0..3 {
            let product = manager.apply_and(manager.literal(a[i]), manager.literal(b[i]));
            f = manager.apply_or(f, product);
        }
        let variables: Vec<Variable> = a.iter().chain(b.iter()).copied().collect();
        let before_table = truth_table(&manager, f, &variables);
        let before_size = manager.node_count(&[f]);

        let mut roots = [f];
        manager.reorder_sifting(&mut roots).unwrap();

        assert_eq!(truth_table(&manager, roots[0], &variables), before_table);
        assert!(manager.node_count(&[roots[0]]) <= before_size);
    }

    #[test]
    fn test_reorder_keeps_pairs_adjacent() {
        let mut manager = DdManager::new();
        let pairs = [manager.new_variable_pair(), manager.new_variable_pair()];
        let f = {
            let t0 = manager.apply_iff(manager.literal(pairs[0].row), manager.literal(pairs[0].column));
            let t1 = manager.apply_iff(manager.literal(pairs[1].row), manager.literal(pairs[1].column));
            manager.apply_and(t0, t1)
        };
        let mut roots = [f];
        manager.reorder_sifting(&mut roots).unwrap();
        for pair in &pairs {
            let row_level = manager.level_of(pair.row);
            let column_level = manager.level_of(pair.column);
            assert_eq!(column_level, row_level + 1);
        }
    }

    #[test]
    fn test_reorder_preserves_value_diagrams() {
        let mut manager = DdManager::new();
        let a = manager.new_variable();
        let b = manager.new_variable();
        let quarter = manager.leaf(Value::Double(0.25));
        let half = manager.leaf(Value::Double(0.5));
        let inner = {
            let vb = manager.literal(b);
            manager.apply_value_ite(vb, quarter, half)
        };
        let va = manager.literal(a);
        let f = manager.apply_value_ite(va, inner, manager.zero_leaf(ValueKind::Double));

        let mut roots = [f];
        manager.set_variable_order(&[b, a], &mut roots).unwrap();
        assert_eq!(
            manager.evaluate_value(roots[0], &[(a, true), (b, true)]),
            Value::Double(0.25)
        );
        assert_eq!(
            manager.evaluate_value(roots[0], &[(a, true), (b, false)]),
            Value::Double(0.5)
        );
        assert_eq!(
            manager.evaluate_value(roots[0], &[(a, false), (b, true)]),
            Value::Double(0.0)
        );
    }
}
