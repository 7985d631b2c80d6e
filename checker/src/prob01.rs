// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Qualitative precomputation: the states satisfying `phi U psi` with
//! probability exactly 0 and exactly 1.
//!
//! These sets are graph-theoretic, so they are exact where the numeric
//! solvers only approximate. The engines run them before every reachability
//! solve: prob-0 and prob-1 states get their values assigned directly, and
//! only the remaining "maybe" states enter the equation system. On
//! nondeterministic models the sets depend on the optimization direction.
//!
//! Explicit variants work on the sparse matrix; symbolic variants run the
//! same fixpoints on Boolean diagrams.

use bitvec::prelude::*;

use dd::{DdManager, Ref, VariablePair};
use numeric::{OptimizationDirection, SparseMatrix};

/// The set `a \ b`, as a fresh bit vector.
pub(crate) fn and_not(a: &BitSlice, b: &BitSlice) -> BitVec {
    let mut out = a.to_bitvec();
    for index in b.iter_ones() {
        out.set(index, false);
    }
    out
}

/// For every state, the `(state, row)` pairs with a positive entry into it.
fn predecessors(transitions: &SparseMatrix) -> Vec<Vec<(usize, usize)>> {
    let mut preds = vec![Vec::new(); transitions.column_count()];
    for (state, rows) in transitions.groups().enumerate() {
        for row in rows {
            for &(column, value) in transitions.row(row) {
                if value > 0.0 {
                    preds[column].push((state, row));
                }
            }
        }
    }
    preds
}

/// Least fixpoint of `target ∪ {s ∈ allowed | some row of s enters the set}`,
/// computed as a backward search over the predecessor lists.
fn exists_reach(
    preds: &[Vec<(usize, usize)>],
    allowed: &BitSlice,
    target: &BitSlice,
) -> BitVec {
    let mut reach = target.to_bitvec();
    let mut queue: Vec<usize> = target.iter_ones().collect();
    while let Some(state) = queue.pop() {
        for &(pred, _) in &preds[state] {
            if allowed[pred] && !reach[pred] {
                reach.set(pred, true);
                queue.push(pred);
            }
        }
    }
    reach
}

/// Least fixpoint of `target ∪ {s ∈ allowed | every row of s enters the
/// set}`. A row counts as entering once any of its successors is in; a
/// state joins when all its rows count.
fn forall_rows_reach(
    transitions: &SparseMatrix,
    preds: &[Vec<(usize, usize)>],
    allowed: &BitSlice,
    target: &BitSlice,
) -> BitVec {
    let mut reach = target.to_bitvec();
    let mut row_entered = bitvec![0; transitions.row_count()];
    let mut entered_rows = vec![0usize; transitions.group_count()];
    let mut queue: Vec<usize> = target.iter_ones().collect();
    while let Some(state) = queue.pop() {
        for &(pred, row) in &preds[state] {
            if row_entered[row] {
                continue;
            }
            row_entered.set(row, true);
            entered_rows[pred] += 1;
            if entered_rows[pred] == transitions.group(pred).len()
                && allowed[pred]
                && !reach[pred]
            {
                reach.set(pred, true);
                queue.push(pred);
            }
        }
    }
    reach
}

/// The states where some scheduler satisfies `phi U psi` almost surely.
///
/// Greatest fixpoint over `u` of a least fixpoint over `v`: a state joins
/// `v` when one of its rows stays inside `u` entirely and hits `v` with
/// positive probability. When the inner fixpoint reproduces `u`, every
/// state of `u` can both avoid leaving and make progress, which is exactly
/// almost-sure reachability.
fn prob1_exists(transitions: &SparseMatrix, phi: &BitSlice, psi: &BitSlice) -> BitVec {
    let states = transitions.group_count();
    let mut u = bitvec![1; states];
    loop {
        let mut v = psi.to_bitvec();
        loop {
            let mut changed = false;
            for state in 0..states {
                if v[state] || !phi[state] || psi[state] {
                    continue;
                }
                let good_row = transitions.group(state).any(|row| {
                    let entries = transitions.row(row);
                    entries.iter().all(|&(column, _)| u[column])
                        && entries.iter().any(|&(column, _)| v[column])
                });
                if good_row {
                    v.set(state, true);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if v == u {
            return u;
        }
        u = v;
    }
}

/// The prob-0 and prob-1 sets of `phi U psi` on a deterministic matrix.
pub fn qualitative_deterministic(
    transitions: &SparseMatrix,
    phi: &BitSlice,
    psi: &BitSlice,
) -> (BitVec, BitVec) {
    let preds = predecessors(transitions);
    let prob0 = !exists_reach(&preds, phi, psi);
    // a state misses probability 1 exactly when it can reach prob0 while
    // staying in phi and away from psi
    let transient = and_not(phi, psi);
    let prob1 = !exists_reach(&preds, &transient, &prob0);
    (prob0, prob1)
}

/// The prob-0 and prob-1 sets of `phi U psi` under the optimal scheduler.
///
/// For `Maximize` the sets are "no scheduler reaches at all" and "some
/// scheduler reaches almost surely"; for `Minimize` they are "some
/// scheduler avoids entirely" and "every scheduler reaches almost surely".
pub fn qualitative_nondeterministic(
    transitions: &SparseMatrix,
    phi: &BitSlice,
    psi: &BitSlice,
    direction: OptimizationDirection,
) -> (BitVec, BitVec) {
    let preds = predecessors(transitions);
    match direction {
        OptimizationDirection::Maximize => {
            let prob0 = !exists_reach(&preds, phi, psi);
            let prob1 = prob1_exists(transitions, phi, psi);
            (prob0, prob1)
        }
        OptimizationDirection::Minimize => {
            let prob0 = !forall_rows_reach(transitions, &preds, phi, psi);
            // min probability below 1 means some scheduler walks into prob0
            // through phi-and-not-psi states with positive probability
            let transient = and_not(phi, psi);
            let prob1 = !exists_reach(&preds, &transient, &prob0);
            (prob0, prob1)
        }
    }
}

/// One backward step followed by the `allowed` restriction, on diagrams.
fn symbolic_step(
    manager: &DdManager,
    transitions: Ref,
    pairs: &[VariablePair],
    allowed: Ref,
    set: Ref,
) -> Ref {
    let pre = manager.relational_preimage(set, transitions, pairs);
    manager.apply_and(allowed, pre)
}

/// Least fixpoint of `target ∪ (allowed ∩ pre(·))` on Boolean diagrams.
fn symbolic_reach(
    manager: &DdManager,
    transitions: Ref,
    pairs: &[VariablePair],
    allowed: Ref,
    target: Ref,
) -> Ref {
    let mut reach = target;
    loop {
        let next = manager.apply_or(reach, symbolic_step(manager, transitions, pairs, allowed, reach));
        if next == reach {
            return reach;
        }
        reach = next;
    }
}

/// The prob-0 and prob-1 sets of `phi U psi` on a deterministic model given
/// as a 0/1 transition diagram. Both results are intersected with `states`,
/// the universe of states under consideration.
pub fn qualitative_symbolic(
    manager: &DdManager,
    transitions: Ref,
    pairs: &[VariablePair],
    states: Ref,
    phi: Ref,
    psi: Ref,
) -> (Ref, Ref) {
    let reach = symbolic_reach(manager, transitions, pairs, phi, psi);
    let prob0 = manager.apply_and(states, -reach);
    let transient = manager.apply_and(phi, -psi);
    let bad = symbolic_reach(manager, transitions, pairs, transient, prob0);
    let prob1 = manager.apply_and(states, -bad);
    (prob0, prob1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numeric::SparseMatrixBuilder;

    /// 0 -> 1 -> 2 (absorbing goal), 3 absorbing trap, 0 -> 3 with 0.5
    fn chain_with_trap() -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 1, 0.5).unwrap();
        builder.add_next_value(0, 3, 0.5).unwrap();
        builder.add_next_value(1, 2, 1.0).unwrap();
        builder.add_next_value(2, 2, 1.0).unwrap();
        builder.add_next_value(3, 3, 1.0).unwrap();
        builder.build(None, None).unwrap()
    }

    /// Two-state MDP: state 0 chooses between staying put forever and a
    /// coin flip into goal state 1 or back to 0.
    fn controllable_coin() -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        builder.new_row_group(0).unwrap();
        builder.add_next_value(0, 0, 1.0).unwrap();
        builder.add_next_value(1, 0, 0.5).unwrap();
        builder.add_next_value(1, 1, 0.5).unwrap();
        builder.new_row_group(2).unwrap();
        builder.add_next_value(2, 1, 1.0).unwrap();
        builder.build(None, None).unwrap()
    }

    #[test]
    fn test_deterministic_sets() {
        let matrix = chain_with_trap();
        let phi = bitvec![1; 4];
        let mut psi = bitvec![0; 4];
        psi.set(2, true);

        let (prob0, prob1) = qualitative_deterministic(&matrix, &phi, &psi);
        assert_eq!(prob0, bitvec![0, 0, 0, 1]);
        assert_eq!(prob1, bitvec![0, 1, 1, 0]);
    }

    #[test]
    fn test_deterministic_restricted_phi() {
        let matrix = chain_with_trap();
        // forbid passing through state 1: the goal becomes unreachable
        let mut phi = bitvec![1; 4];
        phi.set(1, false);
        let mut psi = bitvec![0; 4];
        psi.set(2, true);

        let (prob0, prob1) = qualitative_deterministic(&matrix, &phi, &psi);
        assert_eq!(prob0, bitvec![1, 1, 0, 1]);
        assert_eq!(prob1, bitvec![0, 0, 1, 0]);
    }

    #[test]
    fn test_nondeterministic_directions() {
        let matrix = controllable_coin();
        let phi = bitvec![1; 2];
        let psi = bitvec![0, 1];

        // the coin-flip row retries until it wins, so the maximum is 1;
        // the self-loop row never reaches, so the minimum is 0
        let (prob0_max, prob1_max) =
            qualitative_nondeterministic(&matrix, &phi, &psi, OptimizationDirection::Maximize);
        assert_eq!(prob0_max, bitvec![0, 0]);
        assert_eq!(prob1_max, bitvec![1, 1]);

        let (prob0_min, prob1_min) =
            qualitative_nondeterministic(&matrix, &phi, &psi, OptimizationDirection::Minimize);
        assert_eq!(prob0_min, bitvec![1, 0]);
        assert_eq!(prob1_min, bitvec![0, 1]);
    }

    #[test]
    fn test_symbolic_matches_explicit() {
        use dd::manager::PairSide;

        let matrix = chain_with_trap();
        let manager = DdManager::new();
        let state = manager.new_metavariable("s", 2);

        let mut transitions = manager.zero;
        for (source, rows) in matrix.groups().enumerate() {
            for row in rows {
                for &(column, _) in matrix.row(row) {
                    let edge = manager.apply_and(
                        manager.encode(&state, PairSide::Rows, source as u64),
                        manager.encode(&state, PairSide::Columns, column as u64),
                    );
                    transitions = manager.apply_or(transitions, edge);
                }
            }
        }

        let all = manager.one;
        let psi = manager.encode(&state, PairSide::Rows, 2);
        let (prob0, prob1) =
            qualitative_symbolic(&manager, transitions, state.pairs(), all, all, psi);

        let encode = |value| manager.encode(&state, PairSide::Rows, value);
        // prob0 = {3}, prob1 = {1, 2}
        assert_eq!(prob0, encode(3));
        assert_eq!(prob1, manager.apply_or(encode(1), encode(2)));
    }
}
