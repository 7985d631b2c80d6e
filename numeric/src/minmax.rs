// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Solvers for the min-max fixed-point system `x = opt(A x + b)`, where
//! `opt` reduces the rows of each group by minimum or maximum.
//!
//! The solver owns its scratch buffers, so an instance may be reused for
//! several solves in sequence but not shared between threads. After a
//! cancelled or diverged solve the last completed iterate remains readable
//! through [`MinMaxSolver::last_iterate`].

use itertools::Itertools;

use crate::cancel::CancelToken;
use crate::linear::{
    within_precision, ConvergenceCriterion, GaussSeidelSolver, LinearEquationSolver,
};
use crate::sparse::{NumericError, OptimizationDirection, SparseMatrix};

/// Which algorithm [`MinMaxSolver`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolutionMethod {
    /// Iterate the Bellman operator until successive iterates are close.
    #[default]
    ValueIteration,
    /// Alternate exact solves of the chosen-row linear system with greedy
    /// choice improvement.
    PolicyIteration,
}

/// Configuration of a [`MinMaxSolver`].
#[derive(Debug, Clone)]
pub struct MinMaxSettings {
    /// The algorithm to run.
    pub method: SolutionMethod,
    /// Iteration budget before reporting divergence.
    pub max_iterations: usize,
    /// Termination threshold.
    pub precision: f64,
    /// Distance measure for termination.
    pub criterion: ConvergenceCriterion,
    /// When true, the solution carries the optimal choice per group.
    pub track_scheduler: bool,
    /// Lower clamping bound; applied only when the upper bound is also set.
    pub lower_bound: Option<f64>,
    /// Upper clamping bound; applied only when the lower bound is also set.
    pub upper_bound: Option<f64>,
    /// When set, convergence is checked on these indices only.
    pub relevant_states: Option<Vec<usize>>,
    /// Warm-start choices, one group-relative index per group.
    pub scheduler_hint: Option<Vec<usize>>,
    /// Warm-start iterate, one value per group.
    pub result_hint: Option<Vec<f64>>,
    /// Consulted between iterations; never inside one.
    pub cancel: Option<CancelToken>,
}

impl Default for MinMaxSettings {
    fn default() -> Self {
        MinMaxSettings {
            method: SolutionMethod::default(),
            max_iterations: 20000,
            precision: 1e-6,
            criterion: ConvergenceCriterion::Relative,
            track_scheduler: false,
            lower_bound: None,
            upper_bound: None,
            relevant_states: None,
            scheduler_hint: None,
            result_hint: None,
            cancel: None,
        }
    }
}

/// A converged solve: the fixed point, the realizing choices when tracked,
/// and the number of iterations taken.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxSolution {
    /// The fixed-point values, one per group.
    pub values: Vec<f64>,
    /// Group-relative optimal choices; present only when
    /// [`MinMaxSettings::track_scheduler`] was set.
    pub scheduler: Option<Vec<usize>>,
    /// Iterations performed.
    pub iterations: usize,
}

/// Solver for `x = opt(A x + b)` over a row-grouped matrix.
#[derive(Debug, Default)]
pub struct MinMaxSolver {
    /// Configuration; adjust freely between solves.
    pub settings: MinMaxSettings,
    iterate: Vec<f64>,
    next: Vec<f64>,
    scaled: Vec<f64>,
}

impl MinMaxSolver {
    /// Create a solver with the given settings.
    pub fn new(settings: MinMaxSettings) -> Self {
        MinMaxSolver {
            settings,
            ..MinMaxSolver::default()
        }
    }

    /// The iterate left behind by the most recent solve, converged or not.
    pub fn last_iterate(&self) -> &[f64] {
        &self.iterate
    }

    /// Solve `x = opt(A x + b)`.
    pub fn solve_equations(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        b: &[f64],
    ) -> Result<MinMaxSolution, NumericError> {
        self.check_problem(matrix, b)?;
        match self.settings.method {
            SolutionMethod::ValueIteration => self.value_iteration(direction, matrix, b, 1.0),
            SolutionMethod::PolicyIteration => self.policy_iteration(direction, matrix, b),
        }
    }

    /// Solve the discounted system `x = opt(discount * A x + b)` for a
    /// discount factor in `(0, 1]`, which contracts at that rate.
    pub fn solve_discounted(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        b: &[f64],
        discount: f64,
    ) -> Result<MinMaxSolution, NumericError> {
        if !(discount > 0.0 && discount <= 1.0) {
            return Err(NumericError::InvalidInput(format!(
                "discount factor {discount} is not in (0, 1]"
            )));
        }
        self.check_problem(matrix, b)?;
        self.value_iteration(direction, matrix, b, discount)
    }

    /// Apply `x := opt(A x + b)` exactly `steps` times, leaving the result
    /// in `x`. Cancellation is consulted between steps.
    pub fn repeated_multiply(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        x: &mut [f64],
        b: Option<&[f64]>,
        steps: usize,
    ) -> Result<(), NumericError> {
        self.check_groups(matrix)?;
        self.next.clear();
        self.next.resize(matrix.group_count(), 0.0);
        for _ in 0..steps {
            self.check_cancelled()?;
            matrix.multiply_and_reduce(direction, x, b, &mut self.next, None)?;
            x.copy_from_slice(&self.next);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), NumericError> {
        match &self.settings.cancel {
            Some(token) if token.is_cancelled() => Err(NumericError::Cancelled),
            _ => Ok(()),
        }
    }

    fn check_groups(&self, matrix: &SparseMatrix) -> Result<(), NumericError> {
        if matrix.column_count() != matrix.group_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "matrix has {} columns but {} row groups",
                matrix.column_count(),
                matrix.group_count()
            )));
        }
        for (group, rows) in matrix.groups().enumerate() {
            if rows.is_empty() {
                return Err(NumericError::InvalidInput(format!(
                    "row group {group} is empty"
                )));
            }
        }
        Ok(())
    }

    fn check_problem(&self, matrix: &SparseMatrix, b: &[f64]) -> Result<(), NumericError> {
        self.check_groups(matrix)?;
        if b.len() != matrix.row_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "offset vector has length {} but the matrix has {} rows",
                b.len(),
                matrix.row_count()
            )));
        }
        if !(self.settings.precision > 0.0) {
            return Err(NumericError::InvalidInput(format!(
                "precision {} is not positive",
                self.settings.precision
            )));
        }
        let groups = matrix.group_count();
        if let Some(hint) = &self.settings.result_hint {
            if hint.len() != groups {
                return Err(NumericError::InfeasibleHint(format!(
                    "result hint has length {} but the matrix has {groups} row groups",
                    hint.len()
                )));
            }
        }
        if let Some(hint) = &self.settings.scheduler_hint {
            if hint.len() != groups {
                return Err(NumericError::InfeasibleHint(format!(
                    "scheduler hint has length {} but the matrix has {groups} row groups",
                    hint.len()
                )));
            }
            for (group, &choice) in hint.iter().enumerate() {
                if choice >= matrix.group(group).len() {
                    return Err(NumericError::InfeasibleHint(format!(
                        "scheduler hint picks choice {choice} in group {group} with {} rows",
                        matrix.group(group).len()
                    )));
                }
            }
        }
        if let Some(relevant) = &self.settings.relevant_states {
            if let Some(&index) = relevant.iter().find(|&&index| index >= groups) {
                return Err(NumericError::InvalidInput(format!(
                    "relevant state {index} is out of range for {groups} row groups"
                )));
            }
        }
        Ok(())
    }

    fn start_iterate(&mut self, groups: usize) {
        match &self.settings.result_hint {
            Some(hint) => {
                self.iterate.clear();
                self.iterate.extend_from_slice(hint);
            }
            None => {
                self.iterate.clear();
                self.iterate.resize(groups, 0.0);
            }
        }
    }

    fn clamp_iterate(next: &mut [f64], settings: &MinMaxSettings) {
        if let (Some(lower), Some(upper)) = (settings.lower_bound, settings.upper_bound) {
            for value in next.iter_mut() {
                *value = value.clamp(lower, upper);
            }
        }
    }

    fn value_iteration(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        b: &[f64],
        discount: f64,
    ) -> Result<MinMaxSolution, NumericError> {
        let groups = matrix.group_count();
        self.start_iterate(groups);
        self.next.clear();
        self.next.resize(groups, 0.0);

        for iteration in 1..=self.settings.max_iterations {
            self.check_cancelled()?;
            let input = scaled_input(&self.iterate, &mut self.scaled, discount);
            matrix.multiply_and_reduce(direction, input, Some(b), &mut self.next, None)?;
            Self::clamp_iterate(&mut self.next, &self.settings);
            let done = within_precision(
                &self.iterate,
                &self.next,
                self.settings.precision,
                self.settings.criterion,
                self.settings.relevant_states.as_deref(),
            );
            std::mem::swap(&mut self.iterate, &mut self.next);
            if done {
                log::debug!(
                    "{direction} value iteration converged after {iteration} iterations"
                );
                let scheduler = self.extract_scheduler(direction, matrix, b, discount)?;
                return Ok(MinMaxSolution {
                    values: self.iterate.clone(),
                    scheduler,
                    iterations: iteration,
                });
            }
        }
        Err(NumericError::Diverged {
            iterations: self.settings.max_iterations,
        })
    }

    /// One more reduction over the final iterate, recording the realizing
    /// row per group.
    fn extract_scheduler(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        b: &[f64],
        discount: f64,
    ) -> Result<Option<Vec<usize>>, NumericError> {
        if !self.settings.track_scheduler {
            return Ok(None);
        }
        let mut choices = Vec::new();
        let input = scaled_input(&self.iterate, &mut self.scaled, discount);
        matrix.multiply_and_reduce(
            direction,
            input,
            Some(b),
            &mut self.next,
            Some(&mut choices),
        )?;
        Ok(Some(choices))
    }

    fn policy_iteration(
        &mut self,
        direction: OptimizationDirection,
        matrix: &SparseMatrix,
        b: &[f64],
    ) -> Result<MinMaxSolution, NumericError> {
        let groups = matrix.group_count();
        let mut choices = match &self.settings.scheduler_hint {
            Some(hint) => hint.clone(),
            None => vec![0; groups],
        };
        self.start_iterate(groups);
        let linear = GaussSeidelSolver {
            max_iterations: self.settings.max_iterations,
            precision: self.settings.precision,
            criterion: self.settings.criterion,
        };

        for iteration in 1..=self.settings.max_iterations {
            self.check_cancelled()?;
            // evaluate the current policy exactly
            let induced = matrix.select_rows(&choices)?;
            let induced_b = choices
                .iter()
                .enumerate()
                .map(|(group, &choice)| b[matrix.group(group).start + choice])
                .collect_vec();
            let equation = induced.identity_minus()?;
            linear.solve(&equation, &induced_b, &mut self.iterate)?;

            // greedy improvement against the evaluated values
            let mut changed = false;
            for group in 0..groups {
                let rows = matrix.group(group);
                let row_value = |row: usize| {
                    let product: f64 = matrix
                        .row(row)
                        .iter()
                        .map(|&(column, value)| value * self.iterate[column])
                        .sum();
                    product + b[row]
                };
                let mut best_choice = choices[group];
                let mut best_value = row_value(rows.start + best_choice);
                for (offset, row) in rows.enumerate() {
                    let value = row_value(row);
                    if direction.improves(value, best_value)
                        && (value - best_value).abs() > self.settings.precision
                    {
                        best_value = value;
                        best_choice = offset;
                    }
                }
                if best_choice != choices[group] {
                    choices[group] = best_choice;
                    changed = true;
                }
            }
            if !changed {
                log::debug!(
                    "{direction} policy iteration converged after {iteration} improvement rounds"
                );
                return Ok(MinMaxSolution {
                    values: self.iterate.clone(),
                    scheduler: self.settings.track_scheduler.then_some(choices),
                    iterations: iteration,
                });
            }
        }
        Err(NumericError::Diverged {
            iterations: self.settings.max_iterations,
        })
    }
}

/// The multiplication input for an iterate: the iterate itself, or a copy
/// scaled into `scratch` when discounting.
fn scaled_input<'a>(iterate: &'a [f64], scratch: &'a mut Vec<f64>, discount: f64) -> &'a [f64] {
    if discount == 1.0 {
        iterate
    } else {
        scratch.clear();
        scratch.extend(iterate.iter().map(|value| value * discount));
        scratch
    }
}
