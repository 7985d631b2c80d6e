// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Iterative solvers for square linear systems `M x = b`.
//!
//! Callers solving the fixed-point system `x = A x + b` pass
//! [`SparseMatrix::identity_minus`] as `M`, which guarantees an explicit
//! diagonal in every row.

use crate::sparse::{NumericError, SparseMatrix};

/// How the distance between successive iterates is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// Terminate when `max_i |x'_i - x_i|` drops below the precision.
    Absolute,
    /// Terminate when `max_i |x'_i - x_i| / |x'_i|` drops below the
    /// precision. Components converging to zero compare absolutely.
    Relative,
}

/// Whether the step from `old` to `new` is within `precision` under the
/// given criterion, restricted to `relevant` indices when present.
pub(crate) fn within_precision(
    old: &[f64],
    new: &[f64],
    precision: f64,
    criterion: ConvergenceCriterion,
    relevant: Option<&[usize]>,
) -> bool {
    let in_bounds = |index: usize| {
        let difference = (new[index] - old[index]).abs();
        match criterion {
            ConvergenceCriterion::Absolute => difference <= precision,
            ConvergenceCriterion::Relative => {
                difference <= precision * new[index].abs() || difference <= precision
            }
        }
    };
    match relevant {
        Some(indices) => indices.iter().all(|&index| in_bounds(index)),
        None => (0..new.len()).all(in_bounds),
    }
}

/// A backend solving `M x = b` in place, starting from the initial guess
/// already in `x`. Returns the number of iterations performed.
pub trait LinearEquationSolver {
    /// Solve the system, leaving the solution in `x`.
    fn solve(
        &self,
        matrix: &SparseMatrix,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<usize, NumericError>;
}

fn check_system_shape(
    matrix: &SparseMatrix,
    b: &[f64],
    x: &[f64],
) -> Result<(), NumericError> {
    if matrix.row_count() != matrix.column_count() {
        return Err(NumericError::DimensionMismatch(format!(
            "linear system matrix is {} by {}",
            matrix.row_count(),
            matrix.column_count()
        )));
    }
    if b.len() != matrix.row_count() || x.len() != matrix.row_count() {
        return Err(NumericError::DimensionMismatch(format!(
            "system has {} rows but b has length {} and x has length {}",
            matrix.row_count(),
            b.len(),
            x.len()
        )));
    }
    Ok(())
}

/// The diagonal entry of every row, rejecting rows where it is missing or
/// zero.
fn diagonal(matrix: &SparseMatrix) -> Result<Vec<f64>, NumericError> {
    (0..matrix.row_count())
        .map(|row| {
            matrix
                .row(row)
                .iter()
                .find(|&&(column, _)| column == row)
                .map(|&(_, value)| value)
                .filter(|value| *value != 0.0)
                .ok_or_else(|| {
                    NumericError::InvalidInput(format!("row {row} has a zero diagonal"))
                })
        })
        .collect()
}

/// Jacobi iteration: every component of the next iterate is computed from
/// the previous iterate only.
#[derive(Debug, Clone)]
pub struct JacobiSolver {
    /// Iteration budget before reporting divergence.
    pub max_iterations: usize,
    /// Termination threshold.
    pub precision: f64,
    /// Distance measure for termination.
    pub criterion: ConvergenceCriterion,
}

impl Default for JacobiSolver {
    fn default() -> Self {
        JacobiSolver {
            max_iterations: 20000,
            precision: 1e-6,
            criterion: ConvergenceCriterion::Relative,
        }
    }
}

impl LinearEquationSolver for JacobiSolver {
    fn solve(
        &self,
        matrix: &SparseMatrix,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<usize, NumericError> {
        check_system_shape(matrix, b, x)?;
        let diagonal = diagonal(matrix)?;
        let mut next = vec![0.0; x.len()];
        for iteration in 1..=self.max_iterations {
            for row in 0..matrix.row_count() {
                let off_diagonal: f64 = matrix
                    .row(row)
                    .iter()
                    .filter(|&&(column, _)| column != row)
                    .map(|&(column, value)| value * x[column])
                    .sum();
                next[row] = (b[row] - off_diagonal) / diagonal[row];
            }
            let done = within_precision(x, &next, self.precision, self.criterion, None);
            x.copy_from_slice(&next);
            if done {
                log::debug!("jacobi converged after {iteration} iterations");
                return Ok(iteration);
            }
        }
        Err(NumericError::Diverged {
            iterations: self.max_iterations,
        })
    }
}

/// Gauss-Seidel iteration: components updated in place, so each sweep uses
/// already-updated values for preceding components.
#[derive(Debug, Clone)]
pub struct GaussSeidelSolver {
    /// Iteration budget before reporting divergence.
    pub max_iterations: usize,
    /// Termination threshold.
    pub precision: f64,
    /// Distance measure for termination.
    pub criterion: ConvergenceCriterion,
}

impl Default for GaussSeidelSolver {
    fn default() -> Self {
        GaussSeidelSolver {
            max_iterations: 20000,
            precision: 1e-6,
            criterion: ConvergenceCriterion::Relative,
        }
    }
}

impl LinearEquationSolver for GaussSeidelSolver {
    fn solve(
        &self,
        matrix: &SparseMatrix,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<usize, NumericError> {
        check_system_shape(matrix, b, x)?;
        let diagonal = diagonal(matrix)?;
        let mut previous = vec![0.0; x.len()];
        for iteration in 1..=self.max_iterations {
            previous.copy_from_slice(x);
            for row in 0..matrix.row_count() {
                let off_diagonal: f64 = matrix
                    .row(row)
                    .iter()
                    .filter(|&&(column, _)| column != row)
                    .map(|&(column, value)| value * x[column])
                    .sum();
                x[row] = (b[row] - off_diagonal) / diagonal[row];
            }
            if within_precision(&previous, x, self.precision, self.criterion, None) {
                log::debug!("gauss-seidel converged after {iteration} iterations");
                return Ok(iteration);
            }
        }
        Err(NumericError::Diverged {
            iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseMatrixBuilder;

    /// The fixed-point system x = A x + b with A = [[0.5, 0.25], [0.1, 0.3]]
    /// and b = (1, 2), whose solution is (48/13, 44/13).
    fn small_system() -> (SparseMatrix, Vec<f64>) {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 0, 0.5).unwrap();
        builder.add_next_value(0, 1, 0.25).unwrap();
        builder.add_next_value(1, 0, 0.1).unwrap();
        builder.add_next_value(1, 1, 0.3).unwrap();
        let a = builder.build(None, None).unwrap();
        (a.identity_minus().unwrap(), vec![1.0, 2.0])
    }

    #[test]
    fn jacobi_solves_a_two_state_system() {
        let (matrix, b) = small_system();
        let mut x = vec![0.0, 0.0];
        let iterations = JacobiSolver::default().solve(&matrix, &b, &mut x).unwrap();
        assert!(iterations > 1);
        assert!((x[0] - 48.0 / 13.0).abs() < 1e-5);
        assert!((x[1] - 44.0 / 13.0).abs() < 1e-5);
    }

    #[test]
    fn gauss_seidel_solves_a_two_state_system() {
        let (matrix, b) = small_system();
        let mut x = vec![0.0, 0.0];
        let iterations = GaussSeidelSolver::default()
            .solve(&matrix, &b, &mut x)
            .unwrap();
        assert!(iterations > 1);
        assert!((x[0] - 48.0 / 13.0).abs() < 1e-5);
        assert!((x[1] - 44.0 / 13.0).abs() < 1e-5);
    }

    #[test]
    fn zero_diagonals_are_rejected() {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 1, 1.0).unwrap();
        builder.add_next_value(1, 0, 1.0).unwrap();
        let matrix = builder.build(None, None).unwrap();
        let mut x = vec![0.0, 0.0];
        assert!(matches!(
            JacobiSolver::default().solve(&matrix, &[1.0, 1.0], &mut x),
            Err(NumericError::InvalidInput(_))
        ));
    }

    #[test]
    fn rectangular_systems_are_rejected() {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 2, 1.0).unwrap();
        let matrix = builder.build(None, None).unwrap();
        let mut x = vec![0.0, 0.0, 0.0];
        assert!(matches!(
            GaussSeidelSolver::default().solve(&matrix, &[1.0], &mut x),
            Err(NumericError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn non_contractive_systems_diverge() {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 0, 0.1).unwrap();
        builder.add_next_value(0, 1, -1.0).unwrap();
        builder.add_next_value(1, 0, -1.0).unwrap();
        builder.add_next_value(1, 1, 0.1).unwrap();
        let matrix = builder.build(None, None).unwrap();
        let solver = JacobiSolver {
            max_iterations: 50,
            ..JacobiSolver::default()
        };
        let mut x = vec![0.0, 0.0];
        assert_eq!(
            solver.solve(&matrix, &[1.0, 1.0], &mut x),
            Err(NumericError::Diverged { iterations: 50 })
        );
    }
}
