// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Row-grouped sparse matrices in compressed row storage.
//!
//! A matrix is a sequence of rows partitioned into row groups. Deterministic
//! models use one row per group; nondeterministic models use one row per
//! choice, grouped by state. Matrices are immutable after [`SparseMatrixBuilder::build`],
//! so callers share them freely.

use std::fmt;
use std::ops::Range;

use rayon::prelude::*;
use thiserror::Error;

/// Errors reported by matrices and the solvers operating on them.
#[derive(Error, Debug, PartialEq)]
pub enum NumericError {
    /// A builder call broke the monotonicity contract.
    #[error("out of range: {0}")]
    OutOfRange(String),
    /// Operand sizes do not line up.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// A caller-supplied quantity violates a precondition.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A call arrived in the wrong state, such as querying before solving.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A warm-start hint does not fit the problem.
    #[error("infeasible hint: {0}")]
    InfeasibleHint(String),
    /// An iterative method exhausted its iteration budget.
    #[error("no convergence within {iterations} iterations")]
    Diverged {
        /// Number of iterations performed before giving up.
        iterations: usize,
    },
    /// The cancellation token was triggered between iterations.
    #[error("cancelled")]
    Cancelled,
}

/// Whether a reduction over the rows of a group keeps the smallest or the
/// largest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizationDirection {
    /// Keep the smallest row value.
    Minimize,
    /// Keep the largest row value.
    Maximize,
}

impl OptimizationDirection {
    /// Whether `candidate` is strictly better than `incumbent` in this
    /// direction.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            OptimizationDirection::Minimize => candidate < incumbent,
            OptimizationDirection::Maximize => candidate > incumbent,
        }
    }

    /// The opposite direction.
    pub fn opposite(&self) -> OptimizationDirection {
        match self {
            OptimizationDirection::Minimize => OptimizationDirection::Maximize,
            OptimizationDirection::Maximize => OptimizationDirection::Minimize,
        }
    }
}

impl fmt::Display for OptimizationDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OptimizationDirection::Minimize => write!(f, "minimize"),
            OptimizationDirection::Maximize => write!(f, "maximize"),
        }
    }
}

/// Incremental construction of a [`SparseMatrix`].
///
/// Entries arrive in lexicographically increasing `(row, column)` order.
/// Groups are opened with [`new_row_group`](Self::new_row_group) before their
/// first row; if no group is ever opened, every row becomes its own group.
#[derive(Debug, Default)]
pub struct SparseMatrixBuilder {
    entries: Vec<(usize, f64)>,
    row_starts: Vec<usize>,
    group_starts: Vec<usize>,
    current_row: Option<usize>,
    last_column: Option<usize>,
    highest_column: Option<usize>,
    custom_groups: bool,
}

impl SparseMatrixBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new row group starting at `start_row`. Starts must be
    /// non-decreasing and may not fall before a row that already has values.
    pub fn new_row_group(&mut self, start_row: usize) -> Result<(), NumericError> {
        if !self.custom_groups && self.current_row.is_some() {
            return Err(NumericError::InvalidOperation(
                "row group opened after values were added without grouping".to_string(),
            ));
        }
        self.custom_groups = true;
        if let Some(&previous) = self.group_starts.last() {
            if start_row < previous {
                return Err(NumericError::OutOfRange(format!(
                    "row group start {start_row} is before previous start {previous}"
                )));
            }
        }
        let rows_done = self.current_row.map_or(0, |r| r + 1);
        if start_row < rows_done {
            return Err(NumericError::OutOfRange(format!(
                "row group start {start_row} is before already filled row {}",
                rows_done - 1
            )));
        }
        self.group_starts.push(start_row);
        Ok(())
    }

    /// Append the entry `value` at `(row, column)`.
    pub fn add_next_value(
        &mut self,
        row: usize,
        column: usize,
        value: f64,
    ) -> Result<(), NumericError> {
        match self.current_row {
            Some(current) if row < current => {
                return Err(NumericError::OutOfRange(format!(
                    "row {row} is before current row {current}"
                )));
            }
            Some(current) if row == current => {
                if self.last_column.is_some_and(|last| column <= last) {
                    return Err(NumericError::OutOfRange(format!(
                        "column {column} does not increase within row {row}"
                    )));
                }
            }
            _ => {
                // advance to `row`, recording starts of all rows in between
                let first_new = self.current_row.map_or(0, |r| r + 1);
                for _ in first_new..=row {
                    self.row_starts.push(self.entries.len());
                }
                self.current_row = Some(row);
                self.last_column = None;
            }
        }
        self.entries.push((column, value));
        self.last_column = Some(column);
        self.highest_column = Some(self.highest_column.map_or(column, |h| h.max(column)));
        Ok(())
    }

    /// Freeze the structure. `row_count` and `column_count` may pad the
    /// matrix with trailing empty rows or columns; they may not shrink it.
    pub fn build(
        self,
        row_count: Option<usize>,
        column_count: Option<usize>,
    ) -> Result<SparseMatrix, NumericError> {
        let rows_done = self.current_row.map_or(0, |r| r + 1);
        let rows = match row_count {
            Some(requested) if requested < rows_done => {
                return Err(NumericError::InvalidInput(format!(
                    "requested {requested} rows but {rows_done} were filled"
                )));
            }
            Some(requested) => requested,
            None => rows_done,
        };

        let columns_needed = self.highest_column.map_or(0, |h| h + 1);
        let columns = match column_count {
            Some(requested) if requested < columns_needed => {
                return Err(NumericError::InvalidInput(format!(
                    "requested {requested} columns but column {} is present",
                    columns_needed - 1
                )));
            }
            Some(requested) => requested,
            None => columns_needed,
        };

        let mut row_starts = self.row_starts;
        while row_starts.len() < rows {
            row_starts.push(self.entries.len());
        }
        row_starts.push(self.entries.len());

        let mut group_starts = if self.custom_groups {
            self.group_starts
        } else {
            (0..rows).collect()
        };
        group_starts.push(rows);

        Ok(SparseMatrix {
            column_count: columns,
            row_starts,
            group_starts,
            entries: self.entries,
        })
    }
}

/// An immutable sparse matrix with a row grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    column_count: usize,
    /// Index of each row's first entry; one trailing sentinel.
    row_starts: Vec<usize>,
    /// First row of each group; one trailing sentinel.
    group_starts: Vec<usize>,
    /// `(column, value)` pairs, row-major, columns increasing within a row.
    entries: Vec<(usize, f64)>,
}

impl SparseMatrix {
    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.row_starts.len() - 1
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of row groups.
    pub fn group_count(&self) -> usize {
        self.group_starts.len() - 1
    }

    /// Number of explicitly stored entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The `(column, value)` entries of one row.
    pub fn row(&self, row: usize) -> &[(usize, f64)] {
        &self.entries[self.row_starts[row]..self.row_starts[row + 1]]
    }

    /// The rows belonging to one group.
    pub fn group(&self, group: usize) -> Range<usize> {
        self.group_starts[group]..self.group_starts[group + 1]
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[(usize, f64)]> {
        (0..self.row_count()).map(|row| self.row(row))
    }

    /// Iterate over the row ranges of all groups in order.
    pub fn groups(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.group_count()).map(|group| self.group(group))
    }

    fn row_times_vector(&self, row: usize, x: &[f64]) -> f64 {
        self.row(row)
            .iter()
            .map(|&(column, value)| value * x[column])
            .sum()
    }

    fn check_multiply_sizes(&self, x: &[f64], result_len: usize) -> Result<(), NumericError> {
        if x.len() != self.column_count {
            return Err(NumericError::DimensionMismatch(format!(
                "input vector has length {} but the matrix has {} columns",
                x.len(),
                self.column_count
            )));
        }
        if result_len != self.row_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "result vector has length {result_len} but the matrix has {} rows",
                self.row_count()
            )));
        }
        Ok(())
    }

    /// Compute `result = A * x` row by row.
    pub fn multiply_with_vector(&self, x: &[f64], result: &mut [f64]) -> Result<(), NumericError> {
        self.check_multiply_sizes(x, result.len())?;
        for (row, slot) in result.iter_mut().enumerate() {
            *slot = self.row_times_vector(row, x);
        }
        Ok(())
    }

    /// Compute `result = A * x` with the rows distributed over the rayon
    /// thread pool. The matrix and `x` are shared read-only; every worker
    /// owns its output slot exclusively.
    pub fn multiply_with_vector_parallel(
        &self,
        x: &[f64],
        result: &mut [f64],
    ) -> Result<(), NumericError> {
        self.check_multiply_sizes(x, result.len())?;
        result.par_iter_mut().enumerate().for_each(|(row, slot)| {
            *slot = self.row_times_vector(row, x);
        });
        Ok(())
    }

    fn reduce_group(
        &self,
        direction: OptimizationDirection,
        group: usize,
        x: &[f64],
        b: Option<&[f64]>,
    ) -> Result<(f64, usize), NumericError> {
        let rows = self.group(group);
        if rows.is_empty() {
            return Err(NumericError::InvalidInput(format!(
                "row group {group} is empty"
            )));
        }
        let value_of = |row: usize| {
            self.row_times_vector(row, x) + b.map_or(0.0, |offsets| offsets[row])
        };
        let mut best = value_of(rows.start);
        let mut choice = 0;
        for (offset, row) in rows.enumerate().skip(1) {
            let value = value_of(row);
            if direction.improves(value, best) {
                best = value;
                choice = offset;
            }
        }
        Ok((best, choice))
    }

    /// Compute `result[g] = opt over rows r of group g of (A_r * x + b_r)`,
    /// where `opt` keeps the smallest or largest value per `direction`.
    ///
    /// When `choices` is given it receives, per group, the group-relative
    /// index of the row realizing the reduced value.
    pub fn multiply_and_reduce(
        &self,
        direction: OptimizationDirection,
        x: &[f64],
        b: Option<&[f64]>,
        result: &mut [f64],
        mut choices: Option<&mut Vec<usize>>,
    ) -> Result<(), NumericError> {
        self.check_reduce_sizes(x, b, result.len())?;
        if let Some(choices) = choices.as_deref_mut() {
            choices.clear();
            choices.resize(self.group_count(), 0);
        }
        for (group, slot) in result.iter_mut().enumerate() {
            let (value, choice) = self.reduce_group(direction, group, x, b)?;
            *slot = value;
            if let Some(choices) = choices.as_deref_mut() {
                choices[group] = choice;
            }
        }
        Ok(())
    }

    /// [`multiply_and_reduce`](Self::multiply_and_reduce) with the groups
    /// distributed over the rayon thread pool. Choice tracking is left to
    /// the sequential form, which the final scheduler-extraction pass uses.
    pub fn multiply_and_reduce_parallel(
        &self,
        direction: OptimizationDirection,
        x: &[f64],
        b: Option<&[f64]>,
        result: &mut [f64],
    ) -> Result<(), NumericError> {
        self.check_reduce_sizes(x, b, result.len())?;
        result
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(group, slot)| {
                let (value, _) = self.reduce_group(direction, group, x, b)?;
                *slot = value;
                Ok(())
            })
    }

    fn check_reduce_sizes(
        &self,
        x: &[f64],
        b: Option<&[f64]>,
        result_len: usize,
    ) -> Result<(), NumericError> {
        if x.len() != self.column_count {
            return Err(NumericError::DimensionMismatch(format!(
                "input vector has length {} but the matrix has {} columns",
                x.len(),
                self.column_count
            )));
        }
        if result_len != self.group_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "result vector has length {result_len} but the matrix has {} row groups",
                self.group_count()
            )));
        }
        if let Some(offsets) = b {
            if offsets.len() != self.row_count() {
                return Err(NumericError::DimensionMismatch(format!(
                    "offset vector has length {} but the matrix has {} rows",
                    offsets.len(),
                    self.row_count()
                )));
            }
        }
        Ok(())
    }

    /// The transposed matrix. The result has one row per original column and
    /// a trivial grouping.
    pub fn transpose(&self) -> SparseMatrix {
        let mut counts = vec![0usize; self.column_count];
        for &(column, _) in &self.entries {
            counts[column] += 1;
        }
        let mut row_starts = Vec::with_capacity(self.column_count + 1);
        let mut total = 0;
        for &count in &counts {
            row_starts.push(total);
            total += count;
        }
        row_starts.push(total);

        let mut cursors = row_starts.clone();
        let mut entries = vec![(0usize, 0.0); self.entries.len()];
        for row in 0..self.row_count() {
            for &(column, value) in self.row(row) {
                entries[cursors[column]] = (row, value);
                cursors[column] += 1;
            }
        }

        SparseMatrix {
            column_count: self.row_count(),
            row_starts,
            group_starts: (0..=self.column_count).collect(),
            entries,
        }
    }

    /// The submatrix keeping the row groups selected by `keep_groups` and
    /// the columns selected by `keep_columns`, both renumbered by rank among
    /// the kept ones. Entries in dropped columns are discarded.
    pub fn submatrix(
        &self,
        keep_groups: &[bool],
        keep_columns: &[bool],
    ) -> Result<SparseMatrix, NumericError> {
        if keep_groups.len() != self.group_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "group filter has length {} but the matrix has {} row groups",
                keep_groups.len(),
                self.group_count()
            )));
        }
        if keep_columns.len() != self.column_count {
            return Err(NumericError::DimensionMismatch(format!(
                "column filter has length {} but the matrix has {} columns",
                keep_columns.len(),
                self.column_count
            )));
        }

        let mut column_rank = vec![usize::MAX; self.column_count];
        let mut kept_columns = 0;
        for (column, &keep) in keep_columns.iter().enumerate() {
            if keep {
                column_rank[column] = kept_columns;
                kept_columns += 1;
            }
        }

        let mut entries = Vec::new();
        let mut row_starts = Vec::new();
        let mut group_starts = Vec::new();
        for (group, &keep) in keep_groups.iter().enumerate() {
            if !keep {
                continue;
            }
            group_starts.push(row_starts.len());
            for row in self.group(group) {
                row_starts.push(entries.len());
                for &(column, value) in self.row(row) {
                    if keep_columns[column] {
                        entries.push((column_rank[column], value));
                    }
                }
            }
        }
        group_starts.push(row_starts.len());
        row_starts.push(entries.len());

        Ok(SparseMatrix {
            column_count: kept_columns,
            row_starts,
            group_starts,
            entries,
        })
    }

    /// The matrix keeping exactly one row per group, selected by the
    /// group-relative indices in `choices`. Columns are unchanged; the
    /// result has a trivial grouping.
    pub fn select_rows(&self, choices: &[usize]) -> Result<SparseMatrix, NumericError> {
        if choices.len() != self.group_count() {
            return Err(NumericError::DimensionMismatch(format!(
                "choice vector has length {} but the matrix has {} row groups",
                choices.len(),
                self.group_count()
            )));
        }
        let mut entries = Vec::new();
        let mut row_starts = Vec::with_capacity(self.group_count() + 1);
        for (group, &choice) in choices.iter().enumerate() {
            let rows = self.group(group);
            if choice >= rows.len() {
                return Err(NumericError::InvalidInput(format!(
                    "choice {choice} is out of range for group {group} with {} rows",
                    rows.len()
                )));
            }
            row_starts.push(entries.len());
            entries.extend_from_slice(self.row(rows.start + choice));
        }
        row_starts.push(entries.len());

        Ok(SparseMatrix {
            column_count: self.column_count,
            row_starts,
            group_starts: (0..=self.group_count()).collect(),
            entries,
        })
    }

    /// The equation-system view `I - A` of a square matrix, with the
    /// diagonal entry present in every row. This is the coefficient matrix
    /// the linear solvers expect for the fixed-point system `x = A x + b`.
    pub fn identity_minus(&self) -> Result<SparseMatrix, NumericError> {
        if self.row_count() != self.column_count {
            return Err(NumericError::DimensionMismatch(format!(
                "matrix is {} by {} but the equation-system view needs a square matrix",
                self.row_count(),
                self.column_count
            )));
        }
        let mut entries = Vec::with_capacity(self.entries.len() + self.row_count());
        let mut row_starts = Vec::with_capacity(self.row_count() + 1);
        for row in 0..self.row_count() {
            row_starts.push(entries.len());
            let mut diagonal_seen = false;
            for &(column, value) in self.row(row) {
                if column == row {
                    entries.push((column, 1.0 - value));
                    diagonal_seen = true;
                } else {
                    if !diagonal_seen && column > row {
                        entries.push((row, 1.0));
                        diagonal_seen = true;
                    }
                    entries.push((column, -value));
                }
            }
            if !diagonal_seen {
                entries.push((row, 1.0));
            }
        }
        row_starts.push(entries.len());

        Ok(SparseMatrix {
            column_count: self.column_count,
            row_starts,
            group_starts: self.group_starts.clone(),
            entries,
        })
    }
}
