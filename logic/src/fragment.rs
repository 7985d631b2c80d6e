// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Formula fragments: which constructs a checking engine accepts.
//!
//! Engines describe their supported input as a [`FragmentSpec`], a record of
//! Boolean capabilities. Before checking, the pipeline gates every formula
//! against the engine's fragment; the gate walks the formula and reports the
//! first subformula needing a capability the fragment does not grant,
//! together with the rendered subformula.

use serde::Serialize;
use thiserror::Error;

use crate::printer;
use crate::syntax::{PathFormula, StateFormula, TimeBound};
use crate::visitor::FormulaVisitor;

/// A formula construct that falls outside a fragment.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{construct} not supported here, in `{formula}`")]
pub struct FragmentViolation {
    /// The capability the formula needed
    pub construct: String,
    /// The offending subformula, rendered back to property syntax
    pub formula: String,
}

/// The set of formula constructs an engine accepts.
///
/// Start from [`FragmentSpec::none`] or one of the presets and toggle
/// individual capabilities with the `with_*` setters. All capabilities are
/// permissions except `qualitative_bounds_only`,
/// `operator_at_top_level_required`, and `only_eventually_in_conditionals`,
/// which restrict the shape of otherwise permitted formulas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FragmentSpec {
    boolean_literals: bool,
    atomic_labels: bool,
    atomic_expressions: bool,
    negation: bool,
    binary_boolean: bool,
    probability_operators: bool,
    reward_operators: bool,
    long_run_average_operators: bool,
    multi_objective: bool,
    conditional_paths: bool,
    next: bool,
    until: bool,
    eventually: bool,
    globally: bool,
    step_bounded_until: bool,
    time_bounded_until: bool,
    reward_bounded_until: bool,
    step_bounded_eventually: bool,
    time_bounded_eventually: bool,
    reward_bounded_eventually: bool,
    bounded_globally: bool,
    cumulative_rewards: bool,
    instantaneous_rewards: bool,
    lra_rewards: bool,
    reward_model_names: bool,
    quantitative_queries: bool,
    operator_bounds: bool,
    optimization_directions: bool,
    qualitative_bounds_only: bool,
    nested_operators: bool,
    nested_path_formulas: bool,
    nested_multi_objective: bool,
    operator_at_top_level_required: bool,
    only_eventually_in_conditionals: bool,
    variance_measures: bool,
    multi_dimensional_bounds: bool,
}

impl FragmentSpec {
    /// The empty fragment: rejects every formula.
    pub fn none() -> Self {
        Self::default()
    }

    /// Propositional state formulas over labels and expressions.
    pub fn propositional() -> Self {
        Self::none()
            .with_boolean_literals(true)
            .with_atomic_labels(true)
            .with_atomic_expressions(true)
            .with_negation(true)
            .with_binary_boolean(true)
    }

    /// Unnested probabilistic reachability: `P<<cmp>> [ a U b ]` and
    /// `P=? [ F goal ]` over propositional operands.
    pub fn reachability() -> Self {
        Self::propositional()
            .with_probability_operators(true)
            .with_until(true)
            .with_eventually(true)
            .with_quantitative_queries(true)
            .with_operator_bounds(true)
            .with_optimization_directions(true)
    }

    /// Full PCTL: reachability plus next, globally, step bounds, and nested
    /// operators.
    pub fn pctl() -> Self {
        Self::reachability()
            .with_next(true)
            .with_globally(true)
            .with_step_bounded_until(true)
            .with_step_bounded_eventually(true)
            .with_bounded_globally(true)
            .with_nested_operators(true)
    }

    /// PCTL without operator nesting.
    pub fn flat_pctl() -> Self {
        Self::pctl().with_nested_operators(false)
    }

    /// PCTL with reward operators (PRCTL).
    pub fn prctl() -> Self {
        Self::pctl()
            .with_reward_operators(true)
            .with_cumulative_rewards(true)
            .with_instantaneous_rewards(true)
            .with_reward_model_names(true)
            .with_reward_bounded_until(true)
            .with_reward_bounded_eventually(true)
    }

    /// CSL: PCTL plus real-valued time bounds.
    pub fn csl() -> Self {
        Self::pctl()
            .with_time_bounded_until(true)
            .with_time_bounded_eventually(true)
    }

    /// CSL with reward operators (CSRL).
    pub fn csrl() -> Self {
        Self::csl().union(&Self::prctl())
    }

    /// Multi-objective queries over reachability and reward objectives. The
    /// top level must be an operator or a `multi(...)` wrapper.
    pub fn multi_objective() -> Self {
        Self::reachability()
            .with_multi_objective(true)
            .with_operator_at_top_level_required(true)
            .with_next(true)
            .with_globally(true)
            .with_step_bounded_until(true)
            .with_step_bounded_eventually(true)
            .with_bounded_globally(true)
            .with_reward_operators(true)
            .with_reward_model_names(true)
    }

    /// The union of two fragments: every permission either grants; a
    /// restriction survives only if both have it.
    pub fn union(self, other: &Self) -> Self {
        FragmentSpec {
            boolean_literals: self.boolean_literals || other.boolean_literals,
            atomic_labels: self.atomic_labels || other.atomic_labels,
            atomic_expressions: self.atomic_expressions || other.atomic_expressions,
            negation: self.negation || other.negation,
            binary_boolean: self.binary_boolean || other.binary_boolean,
            probability_operators: self.probability_operators || other.probability_operators,
            reward_operators: self.reward_operators || other.reward_operators,
            long_run_average_operators: self.long_run_average_operators
                || other.long_run_average_operators,
            multi_objective: self.multi_objective || other.multi_objective,
            conditional_paths: self.conditional_paths || other.conditional_paths,
            next: self.next || other.next,
            until: self.until || other.until,
            eventually: self.eventually || other.eventually,
            globally: self.globally || other.globally,
            step_bounded_until: self.step_bounded_until || other.step_bounded_until,
            time_bounded_until: self.time_bounded_until || other.time_bounded_until,
            reward_bounded_until: self.reward_bounded_until || other.reward_bounded_until,
            step_bounded_eventually: self.step_bounded_eventually
                || other.step_bounded_eventually,
            time_bounded_eventually: self.time_bounded_eventually
                || other.time_bounded_eventually,
            reward_bounded_eventually: self.reward_bounded_eventually
                || other.reward_bounded_eventually,
            bounded_globally: self.bounded_globally || other.bounded_globally,
            cumulative_rewards: self.cumulative_rewards || other.cumulative_rewards,
            instantaneous_rewards: self.instantaneous_rewards || other.instantaneous_rewards,
            lra_rewards: self.lra_rewards || other.lra_rewards,
            reward_model_names: self.reward_model_names || other.reward_model_names,
            quantitative_queries: self.quantitative_queries || other.quantitative_queries,
            operator_bounds: self.operator_bounds || other.operator_bounds,
            optimization_directions: self.optimization_directions
                || other.optimization_directions,
            qualitative_bounds_only: self.qualitative_bounds_only
                && other.qualitative_bounds_only,
            nested_operators: self.nested_operators || other.nested_operators,
            nested_path_formulas: self.nested_path_formulas || other.nested_path_formulas,
            nested_multi_objective: self.nested_multi_objective
                || other.nested_multi_objective,
            operator_at_top_level_required: self.operator_at_top_level_required
                && other.operator_at_top_level_required,
            only_eventually_in_conditionals: self.only_eventually_in_conditionals
                && other.only_eventually_in_conditionals,
            variance_measures: self.variance_measures || other.variance_measures,
            multi_dimensional_bounds: self.multi_dimensional_bounds
                || other.multi_dimensional_bounds,
        }
    }

    /// Gate a formula against this fragment. Idempotent: gating an accepted
    /// formula again accepts it, and widening the fragment never turns an
    /// accepted formula into a rejected one.
    pub fn check(&self, formula: &StateFormula) -> Result<(), FragmentViolation> {
        if self.operator_at_top_level_required
            && !formula.is_operator()
            && !matches!(formula, StateFormula::MultiObjective(_))
        {
            return Err(FragmentViolation {
                construct: "non-operator top-level formula".to_string(),
                formula: printer::state_formula(formula),
            });
        }
        let mut gate = Gate {
            spec: self,
            operator_depth: 0,
            multi_objective_depth: 0,
            path_depth: 0,
            saved_path_depths: Vec::new(),
        };
        formula.accept(&mut gate)
    }
}

/// Setters, one per capability.
impl FragmentSpec {
    /// Allow `true` and `false`.
    pub fn with_boolean_literals(mut self, value: bool) -> Self {
        self.boolean_literals = value;
        self
    }

    /// Allow atomic labels.
    pub fn with_atomic_labels(mut self, value: bool) -> Self {
        self.atomic_labels = value;
        self
    }

    /// Allow atomic expressions over model variables.
    pub fn with_atomic_expressions(mut self, value: bool) -> Self {
        self.atomic_expressions = value;
        self
    }

    /// Allow negation.
    pub fn with_negation(mut self, value: bool) -> Self {
        self.negation = value;
        self
    }

    /// Allow conjunction, disjunction, implication, and equivalence.
    pub fn with_binary_boolean(mut self, value: bool) -> Self {
        self.binary_boolean = value;
        self
    }

    /// Allow the probability operator `P`.
    pub fn with_probability_operators(mut self, value: bool) -> Self {
        self.probability_operators = value;
        self
    }

    /// Allow the reward operator `R`.
    pub fn with_reward_operators(mut self, value: bool) -> Self {
        self.reward_operators = value;
        self
    }

    /// Allow the long-run-average operator `LRA`.
    pub fn with_long_run_average_operators(mut self, value: bool) -> Self {
        self.long_run_average_operators = value;
        self
    }

    /// Allow `multi(...)` wrappers.
    pub fn with_multi_objective(mut self, value: bool) -> Self {
        self.multi_objective = value;
        self
    }

    /// Allow conditional path formulas `path || condition`.
    pub fn with_conditional_paths(mut self, value: bool) -> Self {
        self.conditional_paths = value;
        self
    }

    /// Allow the next operator `X`.
    pub fn with_next(mut self, value: bool) -> Self {
        self.next = value;
        self
    }

    /// Allow the unbounded until.
    pub fn with_until(mut self, value: bool) -> Self {
        self.until = value;
        self
    }

    /// Allow the unbounded eventually.
    pub fn with_eventually(mut self, value: bool) -> Self {
        self.eventually = value;
        self
    }

    /// Allow the unbounded globally.
    pub fn with_globally(mut self, value: bool) -> Self {
        self.globally = value;
        self
    }

    /// Allow until with integer step bounds.
    pub fn with_step_bounded_until(mut self, value: bool) -> Self {
        self.step_bounded_until = value;
        self
    }

    /// Allow until with real-valued time bounds.
    pub fn with_time_bounded_until(mut self, value: bool) -> Self {
        self.time_bounded_until = value;
        self
    }

    /// Allow until with reward bounds.
    pub fn with_reward_bounded_until(mut self, value: bool) -> Self {
        self.reward_bounded_until = value;
        self
    }

    /// Allow eventually with integer step bounds.
    pub fn with_step_bounded_eventually(mut self, value: bool) -> Self {
        self.step_bounded_eventually = value;
        self
    }

    /// Allow eventually with real-valued time bounds.
    pub fn with_time_bounded_eventually(mut self, value: bool) -> Self {
        self.time_bounded_eventually = value;
        self
    }

    /// Allow eventually with reward bounds.
    pub fn with_reward_bounded_eventually(mut self, value: bool) -> Self {
        self.reward_bounded_eventually = value;
        self
    }

    /// Allow globally with any kind of bound.
    pub fn with_bounded_globally(mut self, value: bool) -> Self {
        self.bounded_globally = value;
        self
    }

    /// Allow cumulative reward formulas `C<=k`.
    pub fn with_cumulative_rewards(mut self, value: bool) -> Self {
        self.cumulative_rewards = value;
        self
    }

    /// Allow instantaneous reward formulas `I=k`.
    pub fn with_instantaneous_rewards(mut self, value: bool) -> Self {
        self.instantaneous_rewards = value;
        self
    }

    /// Allow the long-run reward formula `LRA` under a reward operator.
    pub fn with_lra_rewards(mut self, value: bool) -> Self {
        self.lra_rewards = value;
        self
    }

    /// Allow naming a reward model on the reward operator.
    pub fn with_reward_model_names(mut self, value: bool) -> Self {
        self.reward_model_names = value;
        self
    }

    /// Allow quantitative queries (`P=?`).
    pub fn with_quantitative_queries(mut self, value: bool) -> Self {
        self.quantitative_queries = value;
        self
    }

    /// Allow operator bounds (`P<0.5`).
    pub fn with_operator_bounds(mut self, value: bool) -> Self {
        self.operator_bounds = value;
        self
    }

    /// Allow explicit optimization directions (`Pmax`).
    pub fn with_optimization_directions(mut self, value: bool) -> Self {
        self.optimization_directions = value;
        self
    }

    /// Restrict operator bounds to qualitative thresholds (0 and 1 for
    /// probabilities, 0 for rewards).
    pub fn with_qualitative_bounds_only(mut self, value: bool) -> Self {
        self.qualitative_bounds_only = value;
        self
    }

    /// Allow operators nested inside other operators.
    pub fn with_nested_operators(mut self, value: bool) -> Self {
        self.nested_operators = value;
        self
    }

    /// Allow path formulas as direct operands of other path formulas, as in
    /// the two sides of a conditional.
    pub fn with_nested_path_formulas(mut self, value: bool) -> Self {
        self.nested_path_formulas = value;
        self
    }

    /// Allow `multi(...)` wrappers inside other `multi(...)` wrappers.
    pub fn with_nested_multi_objective(mut self, value: bool) -> Self {
        self.nested_multi_objective = value;
        self
    }

    /// Require the top-level formula to be an operator (or a `multi(...)`
    /// wrapper); bare propositional formulas are rejected.
    pub fn with_operator_at_top_level_required(mut self, value: bool) -> Self {
        self.operator_at_top_level_required = value;
        self
    }

    /// Restrict both operands of a conditional to eventually formulas.
    pub fn with_only_eventually_in_conditionals(mut self, value: bool) -> Self {
        self.only_eventually_in_conditionals = value;
        self
    }

    /// Allow variance instead of expectation as the operator measure. The
    /// property syntax carries no measure annotation yet, so no parsed
    /// formula requires this.
    pub fn with_variance_measures(mut self, value: bool) -> Self {
        self.variance_measures = value;
        self
    }

    /// Allow more than one bound dimension on a path operator.
    pub fn with_multi_dimensional_bounds(mut self, value: bool) -> Self {
        self.multi_dimensional_bounds = value;
        self
    }
}

/// Kinds a bound dimension can have, by its shape.
enum BoundKind {
    Step,
    Time,
    Reward,
}

fn bound_kind(bound: &TimeBound) -> BoundKind {
    if bound.reward_model.is_some() {
        return BoundKind::Reward;
    }
    let integral = |end: &Option<crate::syntax::BoundEnd>| match end {
        Some(e) => e.value.fract() == 0.0,
        None => true,
    };
    if integral(&bound.lower) && integral(&bound.upper) {
        BoundKind::Step
    } else {
        BoundKind::Time
    }
}

struct Gate<'a> {
    spec: &'a FragmentSpec,
    operator_depth: usize,
    multi_objective_depth: usize,
    /// Path formulas on the stack since the innermost operator.
    path_depth: usize,
    /// Path depths suspended while inside a nested operator.
    saved_path_depths: Vec<usize>,
}

impl Gate<'_> {
    fn violation(&self, construct: &str, formula: String) -> FragmentViolation {
        FragmentViolation {
            construct: construct.to_string(),
            formula,
        }
    }

    fn require_state(
        &self,
        allowed: bool,
        construct: &str,
        formula: &StateFormula,
    ) -> Result<(), FragmentViolation> {
        if allowed {
            Ok(())
        } else {
            Err(self.violation(construct, printer::state_formula(formula)))
        }
    }

    fn require_path(
        &self,
        allowed: bool,
        construct: &str,
        formula: &PathFormula,
    ) -> Result<(), FragmentViolation> {
        if allowed {
            Ok(())
        } else {
            Err(self.violation(construct, printer::path_formula(formula)))
        }
    }

    fn check_operator_shape(
        &self,
        direction: &Option<crate::syntax::OptimizationDirection>,
        bound: &Option<crate::syntax::Bound>,
        is_probability: bool,
        formula: &StateFormula,
    ) -> Result<(), FragmentViolation> {
        if direction.is_some() {
            self.require_state(
                self.spec.optimization_directions,
                "optimization direction",
                formula,
            )?;
        }
        match bound {
            Some(b) => {
                self.require_state(self.spec.operator_bounds, "operator bound", formula)?;
                let qualitative = if is_probability {
                    b.is_qualitative_probability()
                } else {
                    b.threshold == 0.0
                };
                if self.spec.qualitative_bounds_only && !qualitative {
                    return Err(self.violation(
                        "quantitative bound",
                        printer::state_formula(formula),
                    ));
                }
            }
            None => {
                self.require_state(self.spec.quantitative_queries, "quantitative query", formula)?;
            }
        }
        Ok(())
    }

    fn check_bounds(
        &self,
        bounds: &[TimeBound],
        caps: [bool; 3],
        names: [&str; 3],
        formula: &PathFormula,
    ) -> Result<(), FragmentViolation> {
        if bounds.len() > 1 {
            self.require_path(
                self.spec.multi_dimensional_bounds,
                "multi-dimensional bound",
                formula,
            )?;
        }
        for bound in bounds {
            let (allowed, name) = match bound_kind(bound) {
                BoundKind::Step => (caps[0], names[0]),
                BoundKind::Time => (caps[1], names[1]),
                BoundKind::Reward => (caps[2], names[2]),
            };
            self.require_path(allowed, name, formula)?;
        }
        Ok(())
    }
}

impl FormulaVisitor for Gate<'_> {
    type Error = FragmentViolation;

    fn enter_state(&mut self, formula: &StateFormula) -> Result<(), FragmentViolation> {
        if formula.is_operator() {
            if self.operator_depth > 0 {
                self.require_state(self.spec.nested_operators, "nested operator", formula)?;
            }
            self.operator_depth += 1;
            self.saved_path_depths.push(self.path_depth);
            self.path_depth = 0;
        }
        match formula {
            StateFormula::Literal(_) => {
                self.require_state(self.spec.boolean_literals, "boolean literal", formula)
            }
            StateFormula::Label(_) => {
                self.require_state(self.spec.atomic_labels, "atomic label", formula)
            }
            StateFormula::Expression(_) => {
                self.require_state(self.spec.atomic_expressions, "atomic expression", formula)
            }
            StateFormula::Not(_) => self.require_state(self.spec.negation, "negation", formula),
            StateFormula::And(_)
            | StateFormula::Or(_)
            | StateFormula::Implies(..)
            | StateFormula::Iff(..) => {
                self.require_state(self.spec.binary_boolean, "boolean connective", formula)
            }
            StateFormula::Probability {
                direction, bound, ..
            } => {
                self.require_state(
                    self.spec.probability_operators,
                    "probability operator",
                    formula,
                )?;
                self.check_operator_shape(direction, bound, true, formula)
            }
            StateFormula::Reward {
                reward_model,
                direction,
                bound,
                ..
            } => {
                self.require_state(self.spec.reward_operators, "reward operator", formula)?;
                if reward_model.is_some() {
                    self.require_state(
                        self.spec.reward_model_names,
                        "named reward model",
                        formula,
                    )?;
                }
                self.check_operator_shape(direction, bound, false, formula)
            }
            StateFormula::LongRunAverage {
                direction, bound, ..
            } => {
                self.require_state(
                    self.spec.long_run_average_operators,
                    "long-run-average operator",
                    formula,
                )?;
                self.check_operator_shape(direction, bound, true, formula)
            }
            StateFormula::MultiObjective(operands) => {
                self.require_state(self.spec.multi_objective, "multi-objective query", formula)?;
                if self.multi_objective_depth > 0 {
                    self.require_state(
                        self.spec.nested_multi_objective,
                        "nested multi-objective query",
                        formula,
                    )?;
                }
                for operand in operands {
                    if !operand.is_operator()
                        && !matches!(operand, StateFormula::MultiObjective(_))
                    {
                        return Err(self.violation(
                            "non-operator multi-objective operand",
                            printer::state_formula(operand),
                        ));
                    }
                }
                self.multi_objective_depth += 1;
                Ok(())
            }
        }
    }

    fn exit_state(&mut self, formula: &StateFormula) -> Result<(), FragmentViolation> {
        if formula.is_operator() {
            self.operator_depth -= 1;
            self.path_depth = self.saved_path_depths.pop().unwrap_or(0);
        }
        if matches!(formula, StateFormula::MultiObjective(_)) {
            self.multi_objective_depth -= 1;
        }
        Ok(())
    }

    fn enter_path(&mut self, formula: &PathFormula) -> Result<(), FragmentViolation> {
        if self.path_depth > 0 {
            self.require_path(
                self.spec.nested_path_formulas,
                "nested path formula",
                formula,
            )?;
        }
        self.path_depth += 1;
        match formula {
            PathFormula::Next(_) => self.require_path(self.spec.next, "next operator", formula),
            PathFormula::Until { bounds, .. } => {
                if bounds.is_empty() {
                    self.require_path(self.spec.until, "until operator", formula)
                } else {
                    self.check_bounds(
                        bounds,
                        [
                            self.spec.step_bounded_until,
                            self.spec.time_bounded_until,
                            self.spec.reward_bounded_until,
                        ],
                        ["step-bounded until", "time-bounded until", "reward-bounded until"],
                        formula,
                    )
                }
            }
            PathFormula::Eventually { bounds, .. } => {
                if bounds.is_empty() {
                    self.require_path(self.spec.eventually, "eventually operator", formula)
                } else {
                    self.check_bounds(
                        bounds,
                        [
                            self.spec.step_bounded_eventually,
                            self.spec.time_bounded_eventually,
                            self.spec.reward_bounded_eventually,
                        ],
                        [
                            "step-bounded eventually",
                            "time-bounded eventually",
                            "reward-bounded eventually",
                        ],
                        formula,
                    )
                }
            }
            PathFormula::Globally { bounds, .. } => {
                if bounds.is_empty() {
                    self.require_path(self.spec.globally, "globally operator", formula)
                } else {
                    self.require_path(self.spec.bounded_globally, "bounded globally", formula)
                }
            }
            PathFormula::Cumulative { bounds } => {
                self.require_path(self.spec.cumulative_rewards, "cumulative reward", formula)?;
                if bounds.len() > 1 {
                    self.require_path(
                        self.spec.multi_dimensional_bounds,
                        "multi-dimensional bound",
                        formula,
                    )?;
                }
                Ok(())
            }
            PathFormula::Instant { .. } => self.require_path(
                self.spec.instantaneous_rewards,
                "instantaneous reward",
                formula,
            ),
            PathFormula::LongRunReward => {
                self.require_path(self.spec.lra_rewards, "long-run reward", formula)
            }
            PathFormula::Conditional { path, condition } => {
                self.require_path(self.spec.conditional_paths, "conditional path", formula)?;
                if self.spec.only_eventually_in_conditionals {
                    for operand in [path.as_ref(), condition.as_ref()] {
                        if !matches!(operand, PathFormula::Eventually { .. }) {
                            return Err(self.violation(
                                "non-eventually conditional operand",
                                printer::path_formula(operand),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn exit_path(&mut self, _formula: &PathFormula) -> Result<(), FragmentViolation> {
        self.path_depth -= 1;
        Ok(())
    }
}
