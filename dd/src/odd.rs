// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Offset-labelled decision diagrams.
//!
//! An [`Odd`] is built once from a Boolean diagram of reachable states and
//! assigns every satisfying assignment a dense index: its rank in the
//! lexicographic enumeration along the variable order. That rank is what
//! connects symbolic state sets to the explicit vectors the numeric solvers
//! work on, without ever enumerating the full assignment space.

use fxhash::FxHashMap;

use crate::manager::{DdError, DdManager, Variable};
use crate::reference::Ref;
use crate::value::Value;

const NO_CHILD: usize = usize::MAX;

#[derive(Debug, Clone)]
struct OddNode {
    else_child: usize,
    then_child: usize,
    /// Number of states in the else subtree.
    else_offset: u64,
    then_offset: u64,
}

impl OddNode {
    fn total(&self) -> u64 {
        self.else_offset + self.then_offset
    }
}

/// An offset-labelled diagram over a fixed list of variables.
///
/// Nodes are shared: two positions with the same remaining function and
/// depth reuse one node. Unlike the diagrams in the manager, an `Odd` is a
/// snapshot; it stays valid when the manager reorders or collects.
#[derive(Debug, Clone)]
pub struct Odd {
    nodes: Vec<OddNode>,
    root: usize,
    variables: Vec<Variable>,
}

impl Odd {
    /// Builds the diagram of `states` over `variables`. The variables are
    /// sorted by their current level; the topmost becomes the most
    /// significant position of the state index.
    ///
    /// Fails if `states` depends on a variable outside the list.
    pub fn from_bdd(
        manager: &DdManager,
        states: Ref,
        variables: &[Variable],
    ) -> Result<Odd, DdError> {
        let mut sorted: Vec<Variable> = variables.to_vec();
        sorted.sort_by_key(|&v| manager.level_of(v));
        let levels: Vec<u32> = sorted.iter().map(|&v| manager.level_of(v)).collect();

        let mut nodes = Vec::new();
        let mut unique: FxHashMap<(i32, usize), usize> = FxHashMap::default();
        let root = build(manager, states, 0, &levels, &mut nodes, &mut unique)?;
        Ok(Odd {
            nodes,
            root,
            variables: sorted,
        })
    }

    /// The variables, top level first.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Number of indexed states.
    pub fn state_count(&self) -> u64 {
        self.nodes[self.root].total()
    }

    /// Number of diagram nodes, terminals included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Reads a value diagram into a dense vector: entry `i` is the value at
    /// the `i`-th indexed state.
    ///
    /// Fails if `values` depends on a variable outside this diagram's list,
    /// or holds leaves with no double representation.
    pub fn to_vector(&self, manager: &DdManager, values: Ref) -> Result<Vec<f64>, DdError> {
        let levels: Vec<u32> = self.variables.iter().map(|&v| manager.level_of(v)).collect();
        let mut out = vec![0.0; self.state_count() as usize];
        self.fill(manager, values, self.root, 0, 0, &levels, &mut out)?;
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &self,
        manager: &DdManager,
        values: Ref,
        node: usize,
        depth: usize,
        offset: u64,
        levels: &[u32],
        out: &mut [f64],
    ) -> Result<(), DdError> {
        if depth == levels.len() {
            if self.nodes[node].total() == 0 {
                return Ok(());
            }
            if !manager.is_terminal(values) {
                return Err(DdError::InvalidArgument(
                    "the value diagram depends on variables outside the offset diagram"
                        .to_string(),
                ));
            }
            let value = manager.leaf_value(values);
            let double = value.as_f64().ok_or_else(|| {
                DdError::InvalidOperation(format!("leaf {value} has no double representation"))
            })?;
            out[offset as usize] = double;
            return Ok(());
        }
        let (low, high) = manager.cofactor_at(values, levels[depth]);
        let odd_node = &self.nodes[node];
        self.fill(manager, low, odd_node.else_child, depth + 1, offset, levels, out)?;
        self.fill(
            manager,
            high,
            odd_node.then_child,
            depth + 1,
            offset + odd_node.else_offset,
            levels,
            out,
        )
    }

    /// Builds the value diagram that holds `values[i]` at the `i`-th indexed
    /// state and zero outside the indexed set.
    ///
    /// Fails if the vector length does not match the state count.
    pub fn from_vector(&self, manager: &DdManager, values: &[f64]) -> Result<Ref, DdError> {
        if values.len() as u64 != self.state_count() {
            return Err(DdError::InvalidArgument(format!(
                "vector of length {} over {} states",
                values.len(),
                self.state_count()
            )));
        }
        let levels: Vec<u32> = self.variables.iter().map(|&v| manager.level_of(v)).collect();
        Ok(self.lift(manager, self.root, 0, 0, &levels, values))
    }

    fn lift(
        &self,
        manager: &DdManager,
        node: usize,
        depth: usize,
        offset: u64,
        levels: &[u32],
        values: &[f64],
    ) -> Ref {
        if depth == levels.len() {
            return if self.nodes[node].total() == 1 {
                manager.leaf(Value::Double(values[offset as usize]))
            } else {
                manager.leaf(Value::Double(0.0))
            };
        }
        let odd_node = &self.nodes[node];
        let low = self.lift(manager, odd_node.else_child, depth + 1, offset, levels, values);
        let high = self.lift(
            manager,
            odd_node.then_child,
            depth + 1,
            offset + odd_node.else_offset,
            levels,
            values,
        );
        manager.mk_value_node(levels[depth], low, high)
    }

    /// Compacts `values` to the states selected by the Boolean diagram
    /// `filter`, preserving index order.
    pub fn filter_explicit_vector(
        &self,
        manager: &DdManager,
        filter: Ref,
        values: &[f64],
    ) -> Result<Vec<f64>, DdError> {
        if values.len() as u64 != self.state_count() {
            return Err(DdError::InvalidArgument(format!(
                "vector of length {} over {} states",
                values.len(),
                self.state_count()
            )));
        }
        let levels: Vec<u32> = self.variables.iter().map(|&v| manager.level_of(v)).collect();
        let mut out = Vec::new();
        self.select(manager, filter, self.root, 0, 0, &levels, values, &mut out)?;
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        manager: &DdManager,
        filter: Ref,
        node: usize,
        depth: usize,
        offset: u64,
        levels: &[u32],
        values: &[f64],
        out: &mut Vec<f64>,
    ) -> Result<(), DdError> {
        if manager.is_zero(filter) || self.nodes[node].total() == 0 {
            return Ok(());
        }
        if depth == levels.len() {
            if !manager.is_one(filter) {
                return Err(DdError::InvalidArgument(
                    "the filter depends on variables outside the offset diagram".to_string(),
                ));
            }
            out.push(values[offset as usize]);
            return Ok(());
        }
        let (low, high) = manager.cofactor_at(filter, levels[depth]);
        let odd_node = &self.nodes[node];
        self.select(manager, low, odd_node.else_child, depth + 1, offset, levels, values, out)?;
        self.select(
            manager,
            high,
            odd_node.then_child,
            depth + 1,
            offset + odd_node.else_offset,
            levels,
            values,
            out,
        )
    }
}

fn build(
    manager: &DdManager,
    f: Ref,
    depth: usize,
    levels: &[u32],
    nodes: &mut Vec<OddNode>,
    unique: &mut FxHashMap<(i32, usize), usize>,
) -> Result<usize, DdError> {
    if let Some(&index) = unique.get(&(f.inner(), depth)) {
        return Ok(index);
    }
    let index = if depth == levels.len() {
        if !manager.is_terminal(f) {
            return Err(DdError::InvalidArgument(
                "the state diagram depends on variables outside the given list".to_string(),
            ));
        }
        let count = if manager.is_one(f) { 1 } else { 0 };
        nodes.push(OddNode {
            else_child: NO_CHILD,
            then_child: NO_CHILD,
            else_offset: count,
            then_offset: 0,
        });
        nodes.len() - 1
    } else {
        if !manager.is_terminal(f) && manager.level(f) < levels[depth] {
            return Err(DdError::InvalidArgument(
                "the state diagram depends on variables outside the given list".to_string(),
            ));
        }
        let (low, high) = manager.cofactor_at(f, levels[depth]);
        let else_child = build(manager, low, depth + 1, levels, nodes, unique)?;
        let then_child = build(manager, high, depth + 1, levels, nodes, unique)?;
        nodes.push(OddNode {
            else_child,
            then_child,
            else_offset: nodes[else_child].total(),
            then_offset: nodes[then_child].total(),
        });
        nodes.len() - 1
    };
    unique.insert((f.inner(), depth), index);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::PairSide;
    use crate::mtbdd::ValueOp;
    use crate::value::ValueKind;

    #[test]
    fn test_full_space_indexing() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 2);
        let rows = counter.row_variables();
        let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
        assert_eq!(odd.state_count(), 4);
        // one node per depth plus the shared terminal
        assert_eq!(odd.node_count(), 3);

        let values = [0.1, 0.2, 0.3, 0.4];
        let dd = odd.from_vector(&manager, &values).unwrap();
        for state in 0..4u64 {
            let assignment: Vec<_> = rows
                .iter()
                .enumerate()
                .map(|(bit, &v)| (v, (state >> (1 - bit)) & 1 == 1))
                .collect();
            assert_eq!(
                manager.evaluate_value(dd, &assignment),
                Value::Double(values[state as usize])
            );
        }
        assert_eq!(odd.to_vector(&manager, dd).unwrap(), values.to_vec());
    }

    #[test]
    fn test_partial_space_skips_unreachable_states() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 2);
        let rows = counter.row_variables();
        // reachable: 0, 1, 3
        let mut reachable = manager.zero;
        for state in [0u64, 1, 3] {
            let cube = manager.encode(&counter, PairSide::Rows, state);
            reachable = manager.apply_or(reachable, cube);
        }
        let odd = Odd::from_bdd(&manager, reachable, &rows).unwrap();
        assert_eq!(odd.state_count(), 3);

        let values = [7.0, 8.0, 9.0];
        let dd = odd.from_vector(&manager, &values).unwrap();
        // state 3 is the third indexed state
        let three = [(rows[0], true), (rows[1], true)];
        assert_eq!(manager.evaluate_value(dd, &three), Value::Double(9.0));
        // the unreachable state 2 reads zero
        let two = [(rows[0], true), (rows[1], false)];
        assert_eq!(manager.evaluate_value(dd, &two), Value::Double(0.0));
        assert_eq!(odd.to_vector(&manager, dd).unwrap(), values.to_vec());
    }

    #[test]
    fn test_round_trip_through_arithmetic() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 3);
        let rows = counter.row_variables();
        let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
        let values: Vec<f64> = (0..8).map(|i| i as f64 / 8.0).collect();
        let dd = odd.from_vector(&manager, &values).unwrap();
        let doubled = manager.apply(ValueOp::Plus, dd, dd).unwrap();
        let out = odd.to_vector(&manager, doubled).unwrap();
        let expected: Vec<f64> = values.iter().map(|v| v * 2.0).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_filter_explicit_vector() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 2);
        let rows = counter.row_variables();
        let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
        let values = [0.0, 1.0, 2.0, 3.0];
        // the full filter is the identity
        assert_eq!(
            odd.filter_explicit_vector(&manager, manager.one, &values).unwrap(),
            values.to_vec()
        );
        let odd_states = {
            let one = manager.encode(&counter, PairSide::Rows, 1);
            let three = manager.encode(&counter, PairSide::Rows, 3);
            manager.apply_or(one, three)
        };
        assert_eq!(
            odd.filter_explicit_vector(&manager, odd_states, &values).unwrap(),
            vec![1.0, 3.0]
        );
    }

    #[test]
    fn test_rejects_foreign_variables() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 2);
        let other = manager.new_variable_pair();
        let rows = counter.row_variables();
        let foreign = manager.literal(other.row);
        assert!(Odd::from_bdd(&manager, foreign, &rows).is_err());

        let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
        let dd = manager.from_bdd(foreign, ValueKind::Double);
        assert!(odd.to_vector(&manager, dd).is_err());
    }
}
