// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Long-run averages on deterministic models.
//!
//! The analysis decomposes the chain into its bottom strongly connected
//! components, solves the stationary distribution of each one with dense
//! Gaussian elimination (bottom components are small in practice), and
//! propagates the component values to the transient states through one
//! linear solve. On continuous-time chains the embedded stationary
//! distribution is reweighted by the expected holding times.

use bitvec::prelude::*;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

use models::{RewardModel, SparseModel};
use numeric::linear::{GaussSeidelSolver, LinearEquationSolver};
use numeric::{NumericError, SparseMatrix};

use crate::error::CheckError;
use crate::sparse::untimed_matrix;
use crate::timing::{self, TimeType};

/// The long-run fraction of time spent in `set`, per state.
pub fn long_run_average(model: &SparseModel, set: &BitSlice) -> Result<Vec<f64>, CheckError> {
    let values: Vec<f64> = set
        .iter()
        .by_vals()
        .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
        .collect();
    long_run_values(model, &values)
}

/// The long-run average reward per step (per time unit on continuous-time
/// chains), per state.
pub fn long_run_reward(
    model: &SparseModel,
    rewards: &RewardModel,
) -> Result<Vec<f64>, CheckError> {
    let matrix = untimed_matrix(model)?;
    let mut values = Vec::with_capacity(model.state_count());
    for (state, rows) in matrix.groups().enumerate() {
        let mut value = 0.0;
        for row in rows {
            value += rewards.choice_reward(state, row);
            if let Some(transition_rewards) = &rewards.transition_rewards {
                let reward_row = transition_rewards.row(row);
                for &(column, probability) in matrix.row(row) {
                    if let Ok(position) =
                        reward_row.binary_search_by_key(&column, |&(column, _)| column)
                    {
                        value += probability * reward_row[position].1;
                    }
                }
            }
        }
        values.push(value);
    }
    long_run_values(model, &values)
}

/// The long-run average of an arbitrary per-state value vector.
fn long_run_values(model: &SparseModel, state_values: &[f64]) -> Result<Vec<f64>, CheckError> {
    let matrix = untimed_matrix(model)?;
    let states = model.state_count();
    let holding = holding_times(model);

    let components = bottom_components(&matrix);
    let mut in_bottom = bitvec![0; states];
    let mut values = vec![0.0; states];
    for members in &components {
        let value = component_value(&matrix, members, holding.as_deref(), state_values)?;
        for &state in members {
            in_bottom.set(state, true);
            values[state] = value;
        }
    }

    if in_bottom.count_ones() == states {
        return Ok(values);
    }

    // transient states collect the component values they eventually fall
    // into, weighted by the reachability probabilities
    let keep: Vec<bool> = in_bottom.iter().by_vals().map(|bottom| !bottom).collect();
    let sub = matrix.submatrix(&keep, &keep)?;
    let mut b = Vec::with_capacity(sub.row_count());
    for state in in_bottom.iter_zeros() {
        let row = matrix.group(state).start;
        let into_bottom: f64 = matrix
            .row(row)
            .iter()
            .filter(|&&(column, _)| in_bottom[column])
            .map(|&(column, probability)| probability * values[column])
            .sum();
        b.push(into_bottom);
    }
    let solver = GaussSeidelSolver::default();
    let equation = sub.identity_minus()?;
    let mut x = vec![0.0; b.len()];
    let start = timing::start();
    let outcome = solver.solve(&equation, &b, &mut x);
    timing::elapsed(TimeType::LinearSolve, start);
    outcome?;
    for (offset, state) in in_bottom.iter_zeros().enumerate() {
        values[state] = x[offset];
    }
    Ok(values)
}

/// Expected holding time per state of a continuous-time chain, or `None` on
/// discrete-time models where every step takes one unit.
fn holding_times(model: &SparseModel) -> Option<Vec<f64>> {
    if !model.model_type.is_continuous_time() {
        return None;
    }
    let rates = (0..model.state_count())
        .map(|state| {
            let row = model.transitions.group(state).start;
            let exit: f64 = model.transitions.row(row).iter().map(|&(_, value)| value).sum();
            if exit > 0.0 {
                1.0 / exit
            } else {
                // an absorbing state is its own bottom component and never
                // enters a stationary mix with other states
                1.0
            }
        })
        .collect();
    Some(rates)
}

/// The strongly connected components without outgoing edges.
fn bottom_components(matrix: &SparseMatrix) -> Vec<Vec<usize>> {
    let states = matrix.group_count();
    let mut graph = DiGraph::<(), ()>::with_capacity(states, matrix.row_count());
    for _ in 0..states {
        graph.add_node(());
    }
    for (state, rows) in matrix.groups().enumerate() {
        for row in rows {
            for &(column, value) in matrix.row(row) {
                if value > 0.0 {
                    graph.add_edge((state as u32).into(), (column as u32).into(), ());
                }
            }
        }
    }
    let mut components = Vec::new();
    for component in tarjan_scc(&graph) {
        let members: Vec<usize> = component.iter().map(|node| node.index()).collect();
        let inside = |state: usize| members.contains(&state);
        let closed = members.iter().all(|&state| {
            matrix
                .group(state)
                .all(|row| matrix.row(row).iter().all(|&(column, _)| inside(column)))
        });
        if closed {
            components.push(members);
        }
    }
    components
}

/// The long-run value of one bottom component: the stationary distribution
/// of the restricted chain, reweighted by holding times on continuous-time
/// models, integrated against the state values.
fn component_value(
    matrix: &SparseMatrix,
    members: &[usize],
    holding: Option<&[f64]>,
    state_values: &[f64],
) -> Result<f64, CheckError> {
    let k = members.len();
    if k == 1 {
        return Ok(state_values[members[0]]);
    }
    let mut rank = fxhash::FxHashMap::default();
    for (offset, &state) in members.iter().enumerate() {
        rank.insert(state, offset);
    }

    // the stationary equation pi (P - I) = 0 transposed into columns, with
    // the last equation replaced by the normalization sum(pi) = 1
    let mut a = vec![vec![0.0; k]; k];
    for (j, &state) in members.iter().enumerate() {
        let row = matrix.group(state).start;
        for &(column, probability) in matrix.row(row) {
            let i = rank[&column];
            a[i][j] += probability;
        }
        a[j][j] -= 1.0;
    }
    for entry in a[k - 1].iter_mut() {
        *entry = 1.0;
    }
    let mut rhs = vec![0.0; k];
    rhs[k - 1] = 1.0;

    let mut pi = gaussian_elimination(a, rhs)?;

    if let Some(holding) = holding {
        let mut total = 0.0;
        for (offset, &state) in members.iter().enumerate() {
            pi[offset] *= holding[state];
            total += pi[offset];
        }
        for weight in &mut pi {
            *weight /= total;
        }
    }

    Ok(members
        .iter()
        .zip(&pi)
        .map(|(&state, &weight)| weight * state_values[state])
        .sum())
}

/// Dense Gaussian elimination with partial pivoting, consuming the system.
fn gaussian_elimination(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, CheckError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(CheckError::Numeric(NumericError::InvalidInput(
                "singular stationary equation system".to_string(),
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
