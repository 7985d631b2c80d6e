// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Back-end interface for linear programming, consumed by threshold and
//! multi-objective computations.
//!
//! Real LP back-ends live outside this crate as adapters implementing
//! [`LpSolver`]. [`BoxLpSolver`] is a reference implementation covering
//! models whose constraints each touch a single variable, enough to give
//! the contract an executable form. [`RecordingLpSolver`] captures calls
//! and plays back a scripted outcome.

use std::fmt;

use crate::sparse::{NumericError, OptimizationDirection};

/// Outcome of the most recent solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// No solve has run since the model last changed.
    NotRun,
    /// An optimal assignment is available.
    Optimal,
    /// The constraints admit no assignment.
    Infeasible,
    /// The objective is unbounded over the feasible region.
    Unbounded,
}

impl fmt::Display for LpStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LpStatus::NotRun => write!(f, "not run"),
            LpStatus::Optimal => write!(f, "optimal"),
            LpStatus::Infeasible => write!(f, "infeasible"),
            LpStatus::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Domain of an LP variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Any real value within the bounds.
    Continuous,
    /// Whole values within the bounds.
    Integer,
    /// Either zero or one.
    Binary,
}

/// Comparison in a linear constraint.
///
/// Strict comparisons are not represented. Callers encode a strict `<`
/// against `rhs` as a non-strict bound against `rhs` minus
/// [`LpSolver::integer_tolerance`], and symmetrically for `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Left-hand side equals the right-hand side.
    Equal,
    /// Left-hand side is at most the right-hand side.
    LessOrEqual,
    /// Left-hand side is at least the right-hand side.
    GreaterOrEqual,
}

/// Handle to a variable created through [`LpSolver::add_variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LpVariable(usize);

impl LpVariable {
    /// Handle for the `index`-th created variable.
    pub fn from_index(index: usize) -> LpVariable {
        LpVariable(index)
    }

    /// Position of the variable in creation order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A variable as handed to a solver implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// Display name, for diagnostics only.
    pub name: String,
    /// Domain of the variable.
    pub kind: VariableKind,
    /// Optional lower bound.
    pub lower: Option<f64>,
    /// Optional upper bound.
    pub upper: Option<f64>,
    /// Coefficient of the variable in the objective.
    pub objective: f64,
}

/// A linear constraint as handed to a solver implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDefinition {
    /// Display name, for diagnostics only.
    pub name: String,
    /// Left-hand side as coefficient-weighted variables.
    pub terms: Vec<(LpVariable, f64)>,
    /// Comparison between the two sides.
    pub relation: Relation,
    /// Right-hand side constant.
    pub rhs: f64,
}

/// Interface to a linear-programming back-end.
///
/// Building is push-based: create variables, add constraints, pick a sense,
/// then call [`optimize`](Self::optimize). Results are readable only while
/// [`status`](Self::status) reports [`LpStatus::Optimal`]; querying earlier
/// is an [`NumericError::InvalidOperation`]. Infeasibility and unboundedness
/// are statuses, not errors. Mutating the model or the sense after a solve
/// resets the status to [`LpStatus::NotRun`].
pub trait LpSolver {
    /// Create a variable with the given domain, optional bounds, and
    /// objective coefficient. Binary variables are implicitly bounded by the
    /// unit interval.
    fn add_variable(
        &mut self,
        name: &str,
        kind: VariableKind,
        lower: Option<f64>,
        upper: Option<f64>,
        objective: f64,
    ) -> LpVariable;

    /// Add the constraint `terms  relation  rhs`, where `terms` is a sum of
    /// coefficient-weighted variables.
    fn add_constraint(&mut self, name: &str, terms: &[(LpVariable, f64)], relation: Relation, rhs: f64);

    /// Select the optimization sense for subsequent solves.
    fn set_direction(&mut self, direction: OptimizationDirection);

    /// Solve the current model. A well-formed model always returns `Ok`; the
    /// outcome, including infeasibility and unboundedness, is reported
    /// through [`status`](Self::status).
    fn optimize(&mut self) -> Result<(), NumericError>;

    /// Outcome of the most recent [`optimize`](Self::optimize) call.
    fn status(&self) -> LpStatus;

    /// Value of `variable` in the optimal assignment.
    fn value(&self, variable: LpVariable) -> Result<f64, NumericError>;

    /// Objective value of the optimal assignment.
    fn objective_value(&self) -> Result<f64, NumericError>;

    /// Tolerance below which a fractional value counts as integral, and the
    /// offset used when encoding strict inequalities.
    fn integer_tolerance(&self) -> f64;
}

fn require_optimal(status: LpStatus, what: &str) -> Result<(), NumericError> {
    if status == LpStatus::Optimal {
        Ok(())
    } else {
        Err(NumericError::InvalidOperation(format!(
            "{what} queried while the solver status is {status}"
        )))
    }
}

fn tighten_lower(slot: &mut Option<f64>, bound: f64) {
    *slot = Some(slot.map_or(bound, |current| current.max(bound)));
}

fn tighten_upper(slot: &mut Option<f64>, bound: f64) {
    *slot = Some(slot.map_or(bound, |current| current.min(bound)));
}

/// Reference implementation for models whose constraints each touch at most
/// one variable.
///
/// Every constraint folds into the bounds of its variable, so the feasible
/// region is a box and each variable settles on the bound its objective
/// coefficient points at. [`optimize`](LpSolver::optimize) rejects
/// constraints over several variables with [`NumericError::InvalidInput`].
#[derive(Debug, Clone)]
pub struct BoxLpSolver {
    direction: OptimizationDirection,
    variables: Vec<VariableDefinition>,
    constraints: Vec<ConstraintDefinition>,
    integer_tolerance: f64,
    status: LpStatus,
    solution: Vec<f64>,
    objective: f64,
}

impl BoxLpSolver {
    /// Create a solver with minimization sense and an integer tolerance of
    /// `1e-6`.
    pub fn new() -> Self {
        Self::with_integer_tolerance(1e-6)
    }

    /// Create a solver with a custom integer tolerance.
    pub fn with_integer_tolerance(integer_tolerance: f64) -> Self {
        BoxLpSolver {
            direction: OptimizationDirection::Minimize,
            variables: Vec::new(),
            constraints: Vec::new(),
            integer_tolerance,
            status: LpStatus::NotRun,
            solution: Vec::new(),
            objective: 0.0,
        }
    }
}

impl Default for BoxLpSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LpSolver for BoxLpSolver {
    fn add_variable(
        &mut self,
        name: &str,
        kind: VariableKind,
        lower: Option<f64>,
        upper: Option<f64>,
        objective: f64,
    ) -> LpVariable {
        self.status = LpStatus::NotRun;
        self.variables.push(VariableDefinition {
            name: name.to_string(),
            kind,
            lower,
            upper,
            objective,
        });
        LpVariable(self.variables.len() - 1)
    }

    fn add_constraint(&mut self, name: &str, terms: &[(LpVariable, f64)], relation: Relation, rhs: f64) {
        self.status = LpStatus::NotRun;
        self.constraints.push(ConstraintDefinition {
            name: name.to_string(),
            terms: terms.to_vec(),
            relation,
            rhs,
        });
    }

    fn set_direction(&mut self, direction: OptimizationDirection) {
        self.status = LpStatus::NotRun;
        self.direction = direction;
    }

    fn optimize(&mut self) -> Result<(), NumericError> {
        self.status = LpStatus::NotRun;
        self.solution.clear();
        for constraint in &self.constraints {
            let mut active = 0;
            for &(variable, coefficient) in &constraint.terms {
                if variable.index() >= self.variables.len() {
                    return Err(NumericError::OutOfRange(format!(
                        "constraint {} references unknown variable {}",
                        constraint.name,
                        variable.index()
                    )));
                }
                if coefficient != 0.0 {
                    active += 1;
                }
            }
            if active > 1 {
                return Err(NumericError::InvalidInput(format!(
                    "constraint {} touches {active} variables, more than the box form supports",
                    constraint.name
                )));
            }
        }

        let mut lower = self
            .variables
            .iter()
            .map(|definition| match definition.kind {
                VariableKind::Binary => Some(definition.lower.unwrap_or(0.0).max(0.0)),
                _ => definition.lower,
            })
            .collect::<Vec<_>>();
        let mut upper = self
            .variables
            .iter()
            .map(|definition| match definition.kind {
                VariableKind::Binary => Some(definition.upper.unwrap_or(1.0).min(1.0)),
                _ => definition.upper,
            })
            .collect::<Vec<_>>();

        let mut feasible = true;
        for constraint in &self.constraints {
            match constraint.terms.iter().find(|(_, coefficient)| *coefficient != 0.0) {
                None => {
                    // only the constant left, so the constraint holds for
                    // every assignment or for none
                    feasible &= match constraint.relation {
                        Relation::Equal => constraint.rhs == 0.0,
                        Relation::LessOrEqual => constraint.rhs >= 0.0,
                        Relation::GreaterOrEqual => constraint.rhs <= 0.0,
                    };
                }
                Some(&(variable, coefficient)) => {
                    let bound = constraint.rhs / coefficient;
                    let flipped = coefficient < 0.0;
                    let low = &mut lower[variable.index()];
                    let high = &mut upper[variable.index()];
                    match constraint.relation {
                        Relation::Equal => {
                            tighten_lower(low, bound);
                            tighten_upper(high, bound);
                        }
                        Relation::LessOrEqual if flipped => tighten_lower(low, bound),
                        Relation::LessOrEqual => tighten_upper(high, bound),
                        Relation::GreaterOrEqual if flipped => tighten_upper(high, bound),
                        Relation::GreaterOrEqual => tighten_lower(low, bound),
                    }
                }
            }
        }

        for (index, definition) in self.variables.iter().enumerate() {
            if definition.kind != VariableKind::Continuous {
                if let Some(bound) = lower[index] {
                    lower[index] = Some((bound - self.integer_tolerance).ceil());
                }
                if let Some(bound) = upper[index] {
                    upper[index] = Some((bound + self.integer_tolerance).floor());
                }
            }
            if let (Some(low), Some(high)) = (lower[index], upper[index]) {
                if low > high {
                    feasible = false;
                }
            }
        }
        if !feasible {
            log::debug!("box LP model over {} variables is infeasible", self.variables.len());
            self.status = LpStatus::Infeasible;
            return Ok(());
        }

        let mut solution = Vec::with_capacity(self.variables.len());
        for (index, definition) in self.variables.iter().enumerate() {
            let value = if definition.objective == 0.0 {
                lower[index].or(upper[index]).unwrap_or(0.0)
            } else {
                let toward_lower = match self.direction {
                    OptimizationDirection::Minimize => definition.objective > 0.0,
                    OptimizationDirection::Maximize => definition.objective < 0.0,
                };
                let bound = if toward_lower { lower[index] } else { upper[index] };
                match bound {
                    Some(bound) => bound,
                    None => {
                        log::debug!("variable {} is unbounded toward the objective", definition.name);
                        self.status = LpStatus::Unbounded;
                        return Ok(());
                    }
                }
            };
            solution.push(value);
        }
        self.objective = self
            .variables
            .iter()
            .zip(&solution)
            .map(|(definition, value)| definition.objective * value)
            .sum();
        self.solution = solution;
        self.status = LpStatus::Optimal;
        log::debug!(
            "box LP solve over {} variables found objective {}",
            self.variables.len(),
            self.objective
        );
        Ok(())
    }

    fn status(&self) -> LpStatus {
        self.status
    }

    fn value(&self, variable: LpVariable) -> Result<f64, NumericError> {
        require_optimal(self.status, "variable value")?;
        self.solution.get(variable.index()).copied().ok_or_else(|| {
            NumericError::OutOfRange(format!("no variable with index {}", variable.index()))
        })
    }

    fn objective_value(&self) -> Result<f64, NumericError> {
        require_optimal(self.status, "objective value")?;
        Ok(self.objective)
    }

    fn integer_tolerance(&self) -> f64 {
        self.integer_tolerance
    }
}

/// Captures every call for later inspection and plays back a scripted
/// outcome.
///
/// Tests drive code that talks to an LP back-end without standing up a real
/// solver: script the desired [`outcome`](Self::outcome), run the code under
/// test, then assert on the captured model.
#[derive(Debug, Clone)]
pub struct RecordingLpSolver {
    /// Variables created so far, in creation order.
    pub variables: Vec<VariableDefinition>,
    /// Constraints added so far, in insertion order.
    pub constraints: Vec<ConstraintDefinition>,
    /// The most recently selected optimization sense.
    pub direction: OptimizationDirection,
    /// How many times [`LpSolver::optimize`] ran.
    pub optimize_calls: usize,
    /// Status to report once [`LpSolver::optimize`] has run.
    pub outcome: LpStatus,
    /// Assignment played back while the outcome is optimal. Missing entries
    /// read as zero.
    pub solution: Vec<f64>,
    /// Objective value played back while the outcome is optimal.
    pub objective: f64,
    /// Tolerance reported through [`LpSolver::integer_tolerance`].
    pub integer_tolerance: f64,
    status: LpStatus,
}

impl RecordingLpSolver {
    /// Create a recorder whose scripted outcome is an optimal solve with an
    /// all-zero assignment.
    pub fn new() -> Self {
        RecordingLpSolver {
            variables: Vec::new(),
            constraints: Vec::new(),
            direction: OptimizationDirection::Minimize,
            optimize_calls: 0,
            outcome: LpStatus::Optimal,
            solution: Vec::new(),
            objective: 0.0,
            integer_tolerance: 1e-6,
            status: LpStatus::NotRun,
        }
    }
}

impl Default for RecordingLpSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LpSolver for RecordingLpSolver {
    fn add_variable(
        &mut self,
        name: &str,
        kind: VariableKind,
        lower: Option<f64>,
        upper: Option<f64>,
        objective: f64,
    ) -> LpVariable {
        self.status = LpStatus::NotRun;
        self.variables.push(VariableDefinition {
            name: name.to_string(),
            kind,
            lower,
            upper,
            objective,
        });
        LpVariable(self.variables.len() - 1)
    }

    fn add_constraint(&mut self, name: &str, terms: &[(LpVariable, f64)], relation: Relation, rhs: f64) {
        self.status = LpStatus::NotRun;
        self.constraints.push(ConstraintDefinition {
            name: name.to_string(),
            terms: terms.to_vec(),
            relation,
            rhs,
        });
    }

    fn set_direction(&mut self, direction: OptimizationDirection) {
        self.status = LpStatus::NotRun;
        self.direction = direction;
    }

    fn optimize(&mut self) -> Result<(), NumericError> {
        self.optimize_calls += 1;
        self.status = self.outcome;
        Ok(())
    }

    fn status(&self) -> LpStatus {
        self.status
    }

    fn value(&self, variable: LpVariable) -> Result<f64, NumericError> {
        require_optimal(self.status, "variable value")?;
        Ok(self.solution.get(variable.index()).copied().unwrap_or(0.0))
    }

    fn objective_value(&self) -> Result<f64, NumericError> {
        require_optimal(self.status, "objective value")?;
        Ok(self.objective)
    }

    fn integer_tolerance(&self) -> f64 {
        self.integer_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_pair() -> (BoxLpSolver, LpVariable, LpVariable) {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Continuous, Some(1.0), Some(4.0), 2.0);
        let y = solver.add_variable("y", VariableKind::Continuous, Some(-2.0), Some(3.0), -1.0);
        (solver, x, y)
    }

    #[test]
    fn minimizing_settles_on_bounds_by_objective_sign() {
        let (mut solver, x, y) = bounded_pair();
        solver.optimize().unwrap();
        assert_eq!(solver.status(), LpStatus::Optimal);
        assert_eq!(solver.value(x).unwrap(), 1.0);
        assert_eq!(solver.value(y).unwrap(), 3.0);
        assert_eq!(solver.objective_value().unwrap(), -1.0);
    }

    #[test]
    fn maximizing_settles_on_the_opposite_bounds() {
        let (mut solver, x, y) = bounded_pair();
        solver.set_direction(OptimizationDirection::Maximize);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 4.0);
        assert_eq!(solver.value(y).unwrap(), -2.0);
        assert_eq!(solver.objective_value().unwrap(), 10.0);
    }

    #[test]
    fn single_variable_constraints_tighten_the_box() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Continuous, Some(0.0), Some(10.0), 1.0);
        solver.add_constraint("at-least-three", &[(x, 2.0)], Relation::GreaterOrEqual, 6.0);
        solver.add_constraint("at-most-eight", &[(x, -1.0)], Relation::GreaterOrEqual, -8.0);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 3.0);

        solver.set_direction(OptimizationDirection::Maximize);
        assert_eq!(solver.status(), LpStatus::NotRun);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 8.0);
    }

    #[test]
    fn equality_pins_a_variable_in_both_directions() {
        for direction in [OptimizationDirection::Minimize, OptimizationDirection::Maximize] {
            let mut solver = BoxLpSolver::new();
            let x = solver.add_variable("x", VariableKind::Continuous, Some(0.0), Some(10.0), 1.0);
            solver.add_constraint("pin", &[(x, 2.0)], Relation::Equal, 8.0);
            solver.set_direction(direction);
            solver.optimize().unwrap();
            assert_eq!(solver.value(x).unwrap(), 4.0);
        }
    }

    #[test]
    fn crossed_bounds_are_infeasible() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Continuous, Some(5.0), Some(3.0), 1.0);
        solver.optimize().unwrap();
        assert_eq!(solver.status(), LpStatus::Infeasible);
        assert!(matches!(solver.value(x), Err(NumericError::InvalidOperation(_))));
    }

    #[test]
    fn constant_constraints_can_rule_out_every_assignment() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Continuous, Some(0.0), Some(1.0), 1.0);
        solver.add_constraint("impossible", &[(x, 0.0)], Relation::GreaterOrEqual, 0.5);
        solver.optimize().unwrap();
        assert_eq!(solver.status(), LpStatus::Infeasible);
    }

    #[test]
    fn missing_bound_in_the_objective_direction_is_unbounded() {
        let mut solver = BoxLpSolver::new();
        solver.add_variable("x", VariableKind::Continuous, Some(0.0), None, 1.0);
        solver.set_direction(OptimizationDirection::Maximize);
        solver.optimize().unwrap();
        assert_eq!(solver.status(), LpStatus::Unbounded);
        assert!(matches!(solver.objective_value(), Err(NumericError::InvalidOperation(_))));
    }

    #[test]
    fn integer_bounds_snap_to_whole_numbers() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Integer, Some(0.3), Some(2.7), 1.0);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 1.0);

        solver.set_direction(OptimizationDirection::Maximize);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 2.0);
    }

    #[test]
    fn integer_tolerance_forgives_near_integral_bounds() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Integer, Some(2.0000001), Some(5.0), 1.0);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 2.0);

        let mut coarse = BoxLpSolver::with_integer_tolerance(0.5);
        let y = coarse.add_variable("y", VariableKind::Integer, Some(2.3), Some(5.0), 1.0);
        coarse.optimize().unwrap();
        assert_eq!(coarse.value(y).unwrap(), 2.0);
    }

    #[test]
    fn binary_variables_default_to_the_unit_interval() {
        let mut solver = BoxLpSolver::new();
        let x = solver.add_variable("x", VariableKind::Binary, None, None, -1.0);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 1.0);

        solver.set_direction(OptimizationDirection::Maximize);
        solver.optimize().unwrap();
        assert_eq!(solver.value(x).unwrap(), 0.0);
    }

    #[test]
    fn values_are_unreadable_before_optimizing() {
        let (solver, x, _) = bounded_pair();
        assert_eq!(solver.status(), LpStatus::NotRun);
        assert!(matches!(solver.value(x), Err(NumericError::InvalidOperation(_))));
        assert!(matches!(solver.objective_value(), Err(NumericError::InvalidOperation(_))));
    }

    #[test]
    fn constraints_over_several_variables_are_rejected() {
        let (mut solver, x, y) = bounded_pair();
        solver.add_constraint("coupled", &[(x, 1.0), (y, 1.0)], Relation::LessOrEqual, 1.0);
        assert!(matches!(solver.optimize(), Err(NumericError::InvalidInput(_))));
    }

    #[test]
    fn recording_solver_captures_the_model() {
        let mut solver = RecordingLpSolver::new();
        solver.solution = vec![0.25];
        solver.objective = 0.5;
        let x = solver.add_variable("p", VariableKind::Continuous, Some(0.0), Some(1.0), 2.0);
        solver.add_constraint("cap", &[(x, 1.0)], Relation::LessOrEqual, 0.25);
        solver.set_direction(OptimizationDirection::Maximize);
        solver.optimize().unwrap();

        assert_eq!(solver.optimize_calls, 1);
        assert_eq!(solver.direction, OptimizationDirection::Maximize);
        assert_eq!(solver.variables[0].name, "p");
        assert_eq!(solver.constraints[0].terms, vec![(x, 1.0)]);
        assert_eq!(solver.constraints[0].relation, Relation::LessOrEqual);
        assert_eq!(solver.constraints[0].rhs, 0.25);
        assert_eq!(solver.value(x).unwrap(), 0.25);
        assert_eq!(solver.objective_value().unwrap(), 0.5);
    }

    #[test]
    fn recording_solver_plays_back_failures() {
        let mut solver = RecordingLpSolver::new();
        solver.outcome = LpStatus::Infeasible;
        let x = solver.add_variable("x", VariableKind::Continuous, None, None, 0.0);
        solver.optimize().unwrap();
        assert_eq!(solver.status(), LpStatus::Infeasible);
        assert!(matches!(solver.value(x), Err(NumericError::InvalidOperation(_))));
    }
}
