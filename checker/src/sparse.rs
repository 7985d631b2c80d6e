// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The sparse engine: checking directly on the explicit transition matrix.
//!
//! Every operation follows the same shape: evaluate the propositional
//! operands to state sets, run the qualitative precomputation, and solve
//! the remaining equation system with the numeric crate. Deterministic
//! models go to the linear solvers; nondeterministic models go to the
//! min-max solver, optionally extracting an optimizing scheduler.
//!
//! Continuous-time models are checked under untimed semantics: all analyses
//! run on the embedded jump chain, and time-bounded operators are rejected.

use std::borrow::Cow;

use bitvec::prelude::*;

use logic::fragment::FragmentSpec;
use logic::printer;
use logic::syntax::{self, BoundEnd, PathFormula, StateFormula, TimeBound};
use logic::task::CheckTask;
use models::{unfold, ModelType, ObservationMode, RewardModel, SparseModel};
use numeric::linear::{GaussSeidelSolver, LinearEquationSolver};
use numeric::{
    MinMaxSettings, MinMaxSolver, OptimizationDirection, SparseMatrix, SparseMatrixBuilder,
};

use crate::error::CheckError;
use crate::lra;
use crate::prob01::{self, and_not};
use crate::timing::{self, TimeType};

/// The outcome of a quantitative check: one value per state, and the
/// optimizing choice per state when a scheduler was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitativeResult {
    /// The computed value at every state.
    pub values: Vec<f64>,
    /// Group-relative optimal choices, present only on nondeterministic
    /// models when the task asked for schedulers.
    pub scheduler: Option<Vec<usize>>,
}

impl QuantitativeResult {
    pub(crate) fn from_values(values: Vec<f64>) -> Self {
        QuantitativeResult {
            values,
            scheduler: None,
        }
    }
}

/// The fragment this engine accepts for the given model class.
///
/// Discrete-time classes get full PRCTL including reward-bounded untils;
/// continuous-time chains additionally parse time bounds, which the engine
/// then rejects with an explanation rather than a gate violation. Long-run
/// averages are only granted on deterministic models.
pub fn fragment(model_type: ModelType) -> FragmentSpec {
    match model_type {
        ModelType::Dtmc => FragmentSpec::prctl()
            .with_long_run_average_operators(true)
            .with_lra_rewards(true)
            .with_multi_dimensional_bounds(true),
        ModelType::Ctmc => FragmentSpec::csrl()
            .with_long_run_average_operators(true)
            .with_lra_rewards(true),
        ModelType::Mdp => FragmentSpec::prctl().with_multi_dimensional_bounds(true),
        ModelType::Ma => FragmentSpec::prctl(),
    }
}

pub(crate) fn numeric_direction(
    direction: syntax::OptimizationDirection,
) -> OptimizationDirection {
    match direction {
        syntax::OptimizationDirection::Minimize => OptimizationDirection::Minimize,
        syntax::OptimizationDirection::Maximize => OptimizationDirection::Maximize,
    }
}

fn opposite(direction: syntax::OptimizationDirection) -> syntax::OptimizationDirection {
    match direction {
        syntax::OptimizationDirection::Minimize => syntax::OptimizationDirection::Maximize,
        syntax::OptimizationDirection::Maximize => syntax::OptimizationDirection::Minimize,
    }
}

/// The single-step probability matrix of the model.
///
/// Discrete-time matrices are used as they are. Continuous-time rows hold
/// rates and are normalized by their exit rate, yielding the embedded jump
/// chain; a state without outgoing rate becomes absorbing via a self-loop.
pub(crate) fn untimed_matrix(model: &SparseModel) -> Result<Cow<'_, SparseMatrix>, CheckError> {
    if !model.model_type.is_continuous_time() {
        return Ok(Cow::Borrowed(&model.transitions));
    }
    let matrix = &model.transitions;
    let mut builder = SparseMatrixBuilder::new();
    let mut next_row = 0;
    for (state, rows) in matrix.groups().enumerate() {
        builder.new_row_group(next_row)?;
        for row in rows {
            let exit: f64 = matrix.row(row).iter().map(|&(_, value)| value).sum();
            if exit > 0.0 {
                for &(column, value) in matrix.row(row) {
                    builder.add_next_value(next_row, column, value / exit)?;
                }
            } else {
                builder.add_next_value(next_row, state, 1.0)?;
            }
            next_row += 1;
        }
    }
    let embedded = builder.build(Some(matrix.row_count()), Some(matrix.column_count()))?;
    Ok(Cow::Owned(embedded))
}

/// Check a formula against the model, one value per state.
pub fn check(
    model: &SparseModel,
    task: &CheckTask,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    check_formula(model, task, task.formula(), minmax)
}

fn check_formula(
    model: &SparseModel,
    task: &CheckTask,
    formula: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    match formula {
        StateFormula::Probability { path, .. } => check_path(model, task, path, minmax),
        StateFormula::Reward { path, .. } => check_reward(model, task, path, minmax),
        StateFormula::LongRunAverage { states, .. } => {
            if model.model_type.is_nondeterministic() {
                return Err(CheckError::unsupported(
                    "long-run averages on nondeterministic models",
                ));
            }
            let set = satisfaction(model, states, minmax)?;
            Ok(QuantitativeResult::from_values(lra::long_run_average(
                model, &set,
            )?))
        }
        StateFormula::MultiObjective(_) => {
            Err(CheckError::unsupported("multi-objective queries"))
        }
        _ => {
            let set = satisfaction(model, formula, minmax)?;
            let values = set
                .iter()
                .by_vals()
                .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
                .collect();
            Ok(QuantitativeResult::from_values(values))
        }
    }
}

/// Evaluate a state formula to its satisfying set. Operator subformulas are
/// checked recursively and decided against their own bound, so nesting
/// works; a nested operator without a bound has no truth value and is
/// rejected.
fn satisfaction(
    model: &SparseModel,
    formula: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<BitVec, CheckError> {
    let states = model.state_count();
    match formula {
        StateFormula::Probability { .. }
        | StateFormula::Reward { .. }
        | StateFormula::LongRunAverage { .. } => {
            let bound = formula.operator_bound().ok_or_else(|| {
                CheckError::unsupported(format!(
                    "nested quantitative query `{}`",
                    printer::state_formula(formula)
                ))
            })?;
            let bound = *bound;
            let sub_task = CheckTask::new(formula.clone());
            let result = check_formula(model, &sub_task, formula, minmax)?;
            let mut set = BitVec::repeat(false, states);
            for (state, &value) in result.values.iter().enumerate() {
                if bound.check(value) {
                    set.set(state, true);
                }
            }
            Ok(set)
        }
        StateFormula::Not(inner) => Ok(!satisfaction(model, inner, minmax)?),
        StateFormula::And(conjuncts) => {
            let mut set = BitVec::repeat(true, states);
            for conjunct in conjuncts {
                let other = satisfaction(model, conjunct, minmax)?;
                for state in 0..states {
                    if !other[state] {
                        set.set(state, false);
                    }
                }
            }
            Ok(set)
        }
        StateFormula::Or(disjuncts) => {
            let mut set = BitVec::repeat(false, states);
            for disjunct in disjuncts {
                let other = satisfaction(model, disjunct, minmax)?;
                for state in other.iter_ones() {
                    set.set(state, true);
                }
            }
            Ok(set)
        }
        StateFormula::Implies(lhs, rhs) => {
            let lhs = satisfaction(model, lhs, minmax)?;
            let rhs = satisfaction(model, rhs, minmax)?;
            let mut set = BitVec::repeat(true, states);
            for state in 0..states {
                if lhs[state] && !rhs[state] {
                    set.set(state, false);
                }
            }
            Ok(set)
        }
        StateFormula::Iff(lhs, rhs) => {
            let lhs = satisfaction(model, lhs, minmax)?;
            let rhs = satisfaction(model, rhs, minmax)?;
            let mut set = BitVec::repeat(false, states);
            for state in 0..states {
                if lhs[state] == rhs[state] {
                    set.set(state, true);
                }
            }
            Ok(set)
        }
        _ => Ok(model.satisfaction_set(formula)?),
    }
}

fn check_path(
    model: &SparseModel,
    task: &CheckTask,
    path: &PathFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let matrix = untimed_matrix(model)?;
    match path {
        PathFormula::Next(inner) => next_probabilities(model, &matrix, task, inner, minmax),
        PathFormula::Until { lhs, rhs, bounds } if bounds.is_empty() => {
            until_probabilities(model, &matrix, task, lhs, rhs, minmax)
        }
        PathFormula::Eventually { inner, bounds } if bounds.is_empty() => {
            until_probabilities(model, &matrix, task, &StateFormula::true_(), inner, minmax)
        }
        PathFormula::Globally { inner, bounds } => {
            globally_probabilities(model, task, inner, bounds, minmax)
        }
        PathFormula::Until { .. } | PathFormula::Eventually { .. } => {
            bounded_path(model, &matrix, task, path, minmax)
        }
        PathFormula::Conditional { .. } => {
            Err(CheckError::unsupported("conditional path formulas"))
        }
        PathFormula::Cumulative { .. }
        | PathFormula::Instant { .. }
        | PathFormula::LongRunReward => Err(CheckError::unsupported(
            "reward path formulas under a probability operator",
        )),
    }
}

/// `P[G phi]` through the dual `1 - P[F !phi]`, with the optimization
/// direction flipped so the optimum is preserved.
fn globally_probabilities(
    model: &SparseModel,
    task: &CheckTask,
    inner: &StateFormula,
    bounds: &[TimeBound],
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let negated = StateFormula::not(inner.clone());
    let dual_path = if bounds.is_empty() {
        PathFormula::eventually(negated)
    } else {
        PathFormula::bounded_eventually(negated, bounds.to_vec())
    };
    let mut dual_task = task.substitute(StateFormula::prob_query(dual_path.clone()));
    if let Some(direction) = task.direction() {
        dual_task = dual_task.with_direction(opposite(direction));
    }
    let mut result = check_path(model, &dual_task, &dual_path, minmax)?;
    for value in &mut result.values {
        *value = 1.0 - *value;
    }
    Ok(result)
}

fn next_probabilities(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    inner: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let psi = satisfaction(model, inner, minmax)?;
    let nondeterministic = model.model_type.is_nondeterministic();
    let direction = if nondeterministic {
        numeric_direction(task.required_direction()?)
    } else {
        OptimizationDirection::Minimize
    };
    let indicator: Vec<f64> = psi
        .iter()
        .by_vals()
        .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
        .collect();
    let mut values = vec![0.0; model.state_count()];
    let mut choices = if task.produces_schedulers() && nondeterministic {
        Some(Vec::new())
    } else {
        None
    };
    matrix.multiply_and_reduce(direction, &indicator, None, &mut values, choices.as_mut())?;
    Ok(QuantitativeResult {
        values,
        scheduler: choices,
    })
}

fn until_probabilities(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    lhs: &StateFormula,
    rhs: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let phi = satisfaction(model, lhs, minmax)?;
    let psi = satisfaction(model, rhs, minmax)?;

    let nondeterministic = model.model_type.is_nondeterministic();
    let direction = if nondeterministic {
        Some(numeric_direction(task.required_direction()?))
    } else {
        None
    };

    let start = timing::start();
    let (prob0, prob1) = match direction {
        Some(direction) => {
            prob01::qualitative_nondeterministic(matrix, &phi, &psi, direction)
        }
        None => prob01::qualitative_deterministic(matrix, &phi, &psi),
    };
    timing::elapsed(TimeType::Precompute, start);

    reachability_values(model, matrix, task, &prob0, &prob1, direction, minmax)
}

/// Solve the quantitative part of a reachability query once the prob-0 and
/// prob-1 sets are known. Shared between the sparse and symbolic engines.
pub(crate) fn reachability_values(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    prob0: &BitSlice,
    prob1: &BitSlice,
    direction: Option<OptimizationDirection>,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let states = model.state_count();
    let mut values = vec![0.0; states];
    for state in prob1.iter_ones() {
        values[state] = 1.0;
    }

    let maybe = and_not(&!prob0.to_bitvec(), prob1);

    if task.is_qualitative() {
        // bounds at the 0/1 thresholds only need set membership; any value
        // strictly between the thresholds stands in for the maybe states
        for state in maybe.iter_ones() {
            values[state] = 0.5;
        }
        return Ok(QuantitativeResult::from_values(values));
    }

    let mut sub_scheduler = None;
    if maybe.any() {
        let keep: Vec<bool> = maybe.iter().by_vals().collect();
        let sub = matrix.submatrix(&keep, &keep)?;
        let mut b = Vec::with_capacity(sub.row_count());
        for state in maybe.iter_ones() {
            for row in matrix.group(state) {
                let into_prob1: f64 = matrix
                    .row(row)
                    .iter()
                    .filter(|&&(column, _)| prob1[column])
                    .map(|&(_, value)| value)
                    .sum();
                b.push(into_prob1);
            }
        }
        let solved = solve_fixpoint(model, task, &sub, &b, direction, minmax, &maybe)?;
        for (offset, state) in maybe.iter_ones().enumerate() {
            values[state] = solved.values[offset];
        }
        sub_scheduler = solved.scheduler;
    }

    let scheduler = if task.produces_schedulers() && direction.is_some() {
        let mut choices = vec![0usize; states];
        if let Some(local) = sub_scheduler {
            for (offset, state) in maybe.iter_ones().enumerate() {
                choices[state] = local[offset];
            }
        }
        Some(choices)
    } else {
        None
    };

    Ok(QuantitativeResult { values, scheduler })
}

struct SubSolution {
    values: Vec<f64>,
    scheduler: Option<Vec<usize>>,
}

/// Solve `x = opt(A x + b)` on a submatrix over the selected states:
/// Gauss-Seidel on the equation-system view for deterministic models, the
/// min-max solver otherwise.
fn solve_fixpoint(
    model: &SparseModel,
    task: &CheckTask,
    matrix: &SparseMatrix,
    b: &[f64],
    direction: Option<OptimizationDirection>,
    minmax: &MinMaxSettings,
    selected: &BitSlice,
) -> Result<SubSolution, CheckError> {
    match direction {
        None => {
            let solver = GaussSeidelSolver {
                max_iterations: minmax.max_iterations,
                precision: minmax.precision,
                criterion: minmax.criterion,
            };
            let equation = matrix.identity_minus()?;
            let mut x = vec![0.0; b.len()];
            let start = timing::start();
            let outcome = solver.solve(&equation, b, &mut x);
            timing::elapsed(TimeType::LinearSolve, start);
            outcome?;
            Ok(SubSolution {
                values: x,
                scheduler: None,
            })
        }
        Some(direction) => {
            let mut settings = minmax.clone();
            settings.track_scheduler = task.produces_schedulers();
            if task.only_initial_states_relevant() {
                let relevant = local_indices(&model.initial_states(), selected);
                if !relevant.is_empty() {
                    settings.relevant_states = Some(relevant);
                }
            }
            let mut solver = MinMaxSolver::new(settings);
            let start = timing::start();
            let outcome = solver.solve_equations(direction, matrix, b);
            timing::elapsed(TimeType::MinMaxSolve, start);
            let solution = outcome?;
            Ok(SubSolution {
                values: solution.values,
                scheduler: solution.scheduler,
            })
        }
    }
}

/// Map state indices to their rank within the selected set, dropping the
/// states outside it.
fn local_indices(states: &[usize], selected: &BitSlice) -> Vec<usize> {
    states
        .iter()
        .filter(|&&state| selected[state])
        .map(|&state| selected[..state].count_ones())
        .collect()
}

/// The integral step budget of a pure upper step bound, or `None` when the
/// dimension is anything else.
fn step_budget(bound: &TimeBound) -> Option<i64> {
    if !bound.is_step_bound() || bound.lower.is_some() {
        return None;
    }
    let BoundEnd { value, strict } = bound.upper?;
    let mut budget = value.floor() as i64;
    if strict && value.fract() == 0.0 {
        budget -= 1;
    }
    Some(budget)
}

fn bounded_path(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    path: &PathFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    if model.model_type.is_continuous_time() {
        return Err(CheckError::unsupported(
            "time-bounded operators on continuous-time models",
        ));
    }
    let (lhs, rhs, bounds) = match path {
        PathFormula::Until { lhs, rhs, bounds } => {
            (lhs.as_ref().clone(), rhs.as_ref().clone(), bounds)
        }
        PathFormula::Eventually { inner, bounds } => {
            (StateFormula::true_(), inner.as_ref().clone(), bounds)
        }
        _ => unreachable!("caller only passes bounded untils"),
    };

    let budgets: Option<Vec<i64>> = bounds.iter().map(step_budget).collect();
    match budgets {
        Some(budgets) => {
            // conjunctive dimensions: the tightest budget decides
            let steps = budgets.into_iter().min().unwrap_or(0);
            if steps < 0 {
                // a strict bound below one step leaves only the goal states
                let psi = satisfaction(model, &rhs, minmax)?;
                let values = psi
                    .iter()
                    .by_vals()
                    .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
                    .collect();
                return Ok(QuantitativeResult::from_values(values));
            }
            step_bounded_until(model, matrix, task, &lhs, &rhs, steps as usize, minmax)
        }
        None => {
            // reward bounds and lower bounds go through the unfolding
            let formula = StateFormula::probability(task.direction(), None, path.clone());
            reward_bounded(model, task, &formula, minmax)
        }
    }
}

fn step_bounded_until(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    lhs: &StateFormula,
    rhs: &StateFormula,
    steps: usize,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let phi = satisfaction(model, lhs, minmax)?;
    let psi = satisfaction(model, rhs, minmax)?;
    let direction = if model.model_type.is_nondeterministic() {
        numeric_direction(task.required_direction()?)
    } else {
        OptimizationDirection::Minimize
    };

    let states = model.state_count();
    let mut values: Vec<f64> = psi
        .iter()
        .by_vals()
        .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
        .collect();
    let mut next = vec![0.0; states];
    for _ in 0..steps {
        if let Some(token) = &minmax.cancel {
            if token.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
        }
        matrix.multiply_and_reduce(direction, &values, None, &mut next, None)?;
        for state in 0..states {
            values[state] = if psi[state] {
                1.0
            } else if !phi[state] {
                0.0
            } else {
                next[state]
            };
        }
    }
    Ok(QuantitativeResult::from_values(values))
}

/// Check a reward-bounded reachability through the epoch unfolding.
///
/// The product is solved as plain reachability and the value at its initial
/// state is carried back. Only the initial states of the original model
/// receive a value; everywhere else the result is zero.
fn reward_bounded(
    model: &SparseModel,
    task: &CheckTask,
    formula: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let start = timing::start();
    let unfolded = unfold(model, formula, ObservationMode::Basic)?;
    timing::elapsed(TimeType::Unfold, start);
    log::debug!(
        "unfolded into {} product states over {} epochs",
        unfolded.model.state_count(),
        unfolded.epochs.len()
    );

    let product_task = task.substitute(unfolded.formula.clone());
    let product = check(&unfolded.model, &product_task, minmax)?;

    let mut values = vec![0.0; model.state_count()];
    if let Some(&product_initial) = unfolded.model.initial_states().first() {
        for state in model.initial_states() {
            values[state] = product.values[product_initial];
        }
    }
    Ok(QuantitativeResult::from_values(values))
}

fn check_reward(
    model: &SparseModel,
    task: &CheckTask,
    path: &PathFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let matrix = untimed_matrix(model)?;
    match path {
        PathFormula::Eventually { inner, bounds } if bounds.is_empty() => {
            reachability_reward(model, &matrix, task, inner, minmax)
        }
        PathFormula::Until { lhs, rhs, bounds }
            if bounds.is_empty() && matches!(lhs.as_ref(), StateFormula::Literal(true)) =>
        {
            reachability_reward(model, &matrix, task, rhs, minmax)
        }
        PathFormula::Cumulative { bounds } => {
            cumulative_reward(model, &matrix, task, bounds, minmax)
        }
        PathFormula::Instant { time } => {
            instantaneous_reward(model, &matrix, task, *time, minmax)
        }
        PathFormula::LongRunReward => {
            if model.model_type.is_nondeterministic() {
                return Err(CheckError::unsupported(
                    "long-run rewards on nondeterministic models",
                ));
            }
            let rewards = model.reward_model(task.reward_model())?;
            Ok(QuantitativeResult::from_values(lra::long_run_reward(
                model, rewards,
            )?))
        }
        _ => Err(CheckError::unsupported(
            "this path formula under a reward operator",
        )),
    }
}

/// The expected reward of every choice row: the state and action parts plus
/// the probability-weighted transition rewards.
fn row_rewards(
    matrix: &SparseMatrix,
    rewards: &RewardModel,
) -> Result<Vec<f64>, CheckError> {
    let mut out = Vec::with_capacity(matrix.row_count());
    for (state, rows) in matrix.groups().enumerate() {
        for row in rows {
            let mut value = rewards.choice_reward(state, row);
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
            out.push(value);
        }
    }
    Ok(out)
}

/// Expected reward accumulated until a goal state is reached.
///
/// States that miss the goal with positive probability under the relevant
/// schedulers accumulate forever and get the value infinity; rows that can
/// fall into that region are dropped before the solve so the remaining
/// system is finite.
fn reachability_reward(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    goal: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let rewards = model.reward_model(task.reward_model())?;
    let psi = satisfaction(model, goal, minmax)?;
    let states = model.state_count();
    let nondeterministic = model.model_type.is_nondeterministic();
    let all = BitVec::repeat(true, states);

    // minimal reward is finite when some scheduler reaches almost surely,
    // maximal reward when all of them do
    let start = timing::start();
    let (direction, finite) = if nondeterministic {
        let direction = task.required_direction()?;
        let witness = numeric_direction(opposite(direction));
        let finite = prob01::qualitative_nondeterministic(matrix, &all, &psi, witness).1;
        (Some(numeric_direction(direction)), finite)
    } else {
        (
            None,
            prob01::qualitative_deterministic(matrix, &all, &psi).1,
        )
    };
    timing::elapsed(TimeType::Precompute, start);

    let mut values = vec![0.0; states];
    for state in 0..states {
        if !finite[state] {
            values[state] = f64::INFINITY;
        }
    }

    let maybe = and_not(&finite, &psi);
    let mut sub_scheduler = None;
    let mut kept_rows: Vec<Vec<usize>> = Vec::new();
    if maybe.any() {
        let mut rank = vec![usize::MAX; states];
        for (offset, state) in maybe.iter_ones().enumerate() {
            rank[state] = offset;
        }
        let all_rewards = row_rewards(matrix, rewards)?;
        let mut builder = SparseMatrixBuilder::new();
        let mut b = Vec::new();
        let mut next_row = 0;
        for state in maybe.iter_ones() {
            builder.new_row_group(next_row)?;
            let mut kept = Vec::new();
            for (offset, row) in matrix.group(state).enumerate() {
                if matrix.row(row).iter().any(|&(column, _)| !finite[column]) {
                    continue;
                }
                for &(column, probability) in matrix.row(row) {
                    if maybe[column] {
                        builder.add_next_value(next_row, rank[column], probability)?;
                    }
                }
                b.push(all_rewards[row]);
                kept.push(offset);
                next_row += 1;
            }
            kept_rows.push(kept);
        }
        let sub = builder.build(Some(next_row), Some(maybe.count_ones()))?;
        let solved = solve_fixpoint(model, task, &sub, &b, direction, minmax, &maybe)?;
        for (offset, state) in maybe.iter_ones().enumerate() {
            values[state] = solved.values[offset];
        }
        sub_scheduler = solved.scheduler;
    }

    let scheduler = if task.produces_schedulers() && nondeterministic {
        let mut choices = vec![0usize; states];
        if let Some(local) = sub_scheduler {
            for (offset, state) in maybe.iter_ones().enumerate() {
                choices[state] = kept_rows[offset][local[offset]];
            }
        }
        Some(choices)
    } else {
        None
    };

    Ok(QuantitativeResult { values, scheduler })
}

/// Expected reward accumulated over the first `k` steps.
fn cumulative_reward(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    bounds: &[TimeBound],
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    if model.model_type.is_continuous_time() {
        return Err(CheckError::unsupported(
            "time-bounded cumulative rewards on continuous-time models",
        ));
    }
    let [bound] = bounds else {
        return Err(CheckError::unsupported(
            "multi-dimensional cumulative reward bounds",
        ));
    };
    let Some(steps) = step_budget(bound) else {
        return Err(CheckError::unsupported("reward-bounded cumulative rewards"));
    };
    let rewards = model.reward_model(task.reward_model())?;
    let direction = if model.model_type.is_nondeterministic() {
        numeric_direction(task.required_direction()?)
    } else {
        OptimizationDirection::Minimize
    };

    let b = row_rewards(matrix, rewards)?;
    let states = model.state_count();
    let mut values = vec![0.0; states];
    let mut next = vec![0.0; states];
    for _ in 0..steps.max(0) {
        if let Some(token) = &minmax.cancel {
            if token.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
        }
        matrix.multiply_and_reduce(direction, &values, Some(&b), &mut next, None)?;
        values.copy_from_slice(&next);
    }
    Ok(QuantitativeResult::from_values(values))
}

/// Expected state reward observed after exactly `k` steps.
fn instantaneous_reward(
    model: &SparseModel,
    matrix: &SparseMatrix,
    task: &CheckTask,
    time: f64,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    if model.model_type.is_continuous_time() {
        return Err(CheckError::unsupported(
            "time-instant rewards on continuous-time models",
        ));
    }
    if time.fract() != 0.0 || time < 0.0 {
        return Err(CheckError::unsupported(format!(
            "instantaneous reward at non-integral instant {time}"
        )));
    }
    let rewards = model.reward_model(task.reward_model())?;
    let direction = if model.model_type.is_nondeterministic() {
        numeric_direction(task.required_direction()?)
    } else {
        OptimizationDirection::Minimize
    };

    let states = model.state_count();
    let mut values: Vec<f64> = (0..states).map(|state| rewards.state_reward(state)).collect();
    let mut next = vec![0.0; states];
    for _ in 0..time as usize {
        if let Some(token) = &minmax.cancel {
            if token.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
        }
        matrix.multiply_and_reduce(direction, &values, None, &mut next, None)?;
        values.copy_from_slice(&next);
    }
    Ok(QuantitativeResult::from_values(values))
}
