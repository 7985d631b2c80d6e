// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Check tasks: the descriptor the pipeline hands to an engine.
//!
//! A task bundles a formula with everything about *how* it should be
//! checked: the optimization direction, the bound to decide, whether only
//! qualitative information is needed, which reward model applies, whether a
//! scheduler should be produced, and warm-start hints. Tasks are built from
//! the outermost operator of a formula and refined with `with_*` setters.

use serde::Serialize;
use thiserror::Error;

use crate::printer;
use crate::syntax::{Bound, OptimizationDirection, StateFormula};
use crate::visitor::FormulaVisitor;

/// Errors from reading task fields that were never set.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The task carries no bound (the formula was a quantitative query)
    #[error("no bound set on check task for `{0}`")]
    NoBound(String),
    /// The task carries no optimization direction
    #[error("no optimization direction set on check task for `{0}`")]
    NoDirection(String),
}

/// Warm-start information an engine may exploit and must never rely on.
///
/// A wrong hint may slow checking down or be rejected, but must not change
/// the result.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TaskHint {
    /// A guess at the per-state result values
    pub values: Option<Vec<f64>>,
    /// A guess at an optimal choice per state
    pub scheduler: Option<Vec<u64>>,
}

impl TaskHint {
    /// Whether the hint carries any information at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_none() && self.scheduler.is_none()
    }
}

/// Everything an engine needs to know to check one formula.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckTask {
    formula: StateFormula,
    direction: Option<OptimizationDirection>,
    bound: Option<Bound>,
    qualitative: bool,
    reward_model: Option<String>,
    only_initial_states_relevant: bool,
    produce_schedulers: bool,
    hint: TaskHint,
}

/// Grabs direction, bound, and reward model off the outermost operator.
#[derive(Default)]
struct OperatorInfo {
    direction: Option<OptimizationDirection>,
    bound: Option<Bound>,
    reward_model: Option<String>,
    is_probability: bool,
}

/// Sentinel error used to stop the traversal at the first operator.
struct Stop;

impl FormulaVisitor for OperatorInfo {
    type Error = Stop;

    fn enter_state(&mut self, formula: &StateFormula) -> Result<(), Stop> {
        match formula {
            StateFormula::Probability {
                direction, bound, ..
            } => {
                self.direction = *direction;
                self.bound = *bound;
                self.is_probability = true;
                Err(Stop)
            }
            StateFormula::Reward {
                reward_model,
                direction,
                bound,
                ..
            } => {
                self.direction = *direction;
                self.bound = *bound;
                self.reward_model = reward_model.clone();
                Err(Stop)
            }
            StateFormula::LongRunAverage {
                direction, bound, ..
            } => {
                self.direction = *direction;
                self.bound = *bound;
                self.is_probability = true;
                Err(Stop)
            }
            _ => Ok(()),
        }
    }
}

impl CheckTask {
    /// Build a task from a formula.
    ///
    /// The outermost operator determines the task fields. An explicit
    /// direction on the operator wins; otherwise the bound's comparison
    /// infers one (upper bounds maximize, lower bounds minimize, an exact
    /// bound leaves the direction unset). A bound whose threshold is 0 or 1
    /// (0 for rewards) marks the task qualitative.
    pub fn new(formula: StateFormula) -> Self {
        let mut info = OperatorInfo::default();
        let _ = formula.accept(&mut info);

        let direction = info
            .direction
            .or_else(|| info.bound.as_ref().and_then(|b| b.inferred_direction()));
        let qualitative = match &info.bound {
            Some(b) if info.is_probability => b.is_qualitative_probability(),
            Some(b) => b.threshold == 0.0,
            None => false,
        };

        CheckTask {
            formula,
            direction,
            bound: info.bound,
            qualitative,
            reward_model: info.reward_model,
            only_initial_states_relevant: false,
            produce_schedulers: false,
            hint: TaskHint::default(),
        }
    }

    /// Replace the formula, keeping the remaining task configuration.
    ///
    /// Engines use this when they rewrite a formula into a simpler one (the
    /// unfolder turns a bounded query into plain reachability, bounded
    /// variants lose their bounds). The bound refers to the original
    /// formula's values at every state, so it is dropped, except when only
    /// the values at initial states matter and therefore still decide the
    /// original bound.
    pub fn substitute(&self, formula: StateFormula) -> CheckTask {
        let mut task = self.clone();
        task.formula = formula;
        if !task.only_initial_states_relevant {
            task.bound = None;
        }
        task
    }

    /// The formula to check.
    pub fn formula(&self) -> &StateFormula {
        &self.formula
    }

    /// The optimization direction, if one is set.
    pub fn direction(&self) -> Option<OptimizationDirection> {
        self.direction
    }

    /// The optimization direction, or an error naming the formula.
    pub fn required_direction(&self) -> Result<OptimizationDirection, TaskError> {
        self.direction
            .ok_or_else(|| TaskError::NoDirection(printer::state_formula(&self.formula)))
    }

    /// Whether the task carries a bound.
    pub fn has_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// The bound, or an error naming the formula.
    pub fn bound(&self) -> Result<&Bound, TaskError> {
        self.bound
            .as_ref()
            .ok_or_else(|| TaskError::NoBound(printer::state_formula(&self.formula)))
    }

    /// Whether only the qualitative answer is needed.
    pub fn is_qualitative(&self) -> bool {
        self.qualitative
    }

    /// The reward model named on the operator, if any.
    pub fn reward_model(&self) -> Option<&str> {
        self.reward_model.as_deref()
    }

    /// Whether results are only needed at the model's initial states.
    pub fn only_initial_states_relevant(&self) -> bool {
        self.only_initial_states_relevant
    }

    /// Whether the engine should extract an optimizing scheduler.
    pub fn produces_schedulers(&self) -> bool {
        self.produce_schedulers
    }

    /// The warm-start hint.
    pub fn hint(&self) -> &TaskHint {
        &self.hint
    }

    /// Set the optimization direction explicitly.
    pub fn with_direction(mut self, direction: OptimizationDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Mark whether only initial-state results matter.
    pub fn with_only_initial_states_relevant(mut self, value: bool) -> Self {
        self.only_initial_states_relevant = value;
        self
    }

    /// Override the qualitative flag.
    pub fn with_qualitative(mut self, value: bool) -> Self {
        self.qualitative = value;
        self
    }

    /// Request scheduler extraction.
    pub fn with_produce_schedulers(mut self, value: bool) -> Self {
        self.produce_schedulers = value;
        self
    }

    /// Attach a warm-start hint.
    pub fn with_hint(mut self, hint: TaskHint) -> Self {
        self.hint = hint;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::formula;
    use crate::syntax::ComparisonType;

    #[test]
    fn test_direction_inference() {
        // upper bounds maximize
        let task = CheckTask::new(formula("P<0.3 [ F \"bad\" ]"));
        assert_eq!(task.direction(), Some(OptimizationDirection::Maximize));
        let task = CheckTask::new(formula("P<=0.3 [ F \"bad\" ]"));
        assert_eq!(task.direction(), Some(OptimizationDirection::Maximize));

        // lower bounds minimize
        let task = CheckTask::new(formula("P>=0.7 [ F \"good\" ]"));
        assert_eq!(task.direction(), Some(OptimizationDirection::Minimize));

        // exact bounds leave the direction unset
        let task = CheckTask::new(formula("P=0.5 [ F \"goal\" ]"));
        assert_eq!(task.direction(), None);
        assert!(task.required_direction().is_err());

        // an explicit direction wins over the inference
        let task = CheckTask::new(formula("Pmax>=0.7 [ F \"good\" ]"));
        assert_eq!(task.direction(), Some(OptimizationDirection::Maximize));
    }

    #[test]
    fn test_qualitative_auto_set() {
        assert!(CheckTask::new(formula("P>=1 [ F \"goal\" ]")).is_qualitative());
        assert!(CheckTask::new(formula("P<=0 [ F \"bad\" ]")).is_qualitative());
        assert!(!CheckTask::new(formula("P>=0.5 [ F \"goal\" ]")).is_qualitative());
        assert!(!CheckTask::new(formula("P=? [ F \"goal\" ]")).is_qualitative());
        // rewards are qualitative only at threshold zero
        assert!(CheckTask::new(formula("R<=0 [ F \"done\" ]")).is_qualitative());
        assert!(!CheckTask::new(formula("R<=1 [ F \"done\" ]")).is_qualitative());
    }

    #[test]
    fn test_bound_access() {
        let task = CheckTask::new(formula("P=? [ F \"goal\" ]"));
        assert!(!task.has_bound());
        match task.bound() {
            Err(TaskError::NoBound(f)) => assert_eq!(f, "P=? [ F \"goal\" ]"),
            other => panic!("expected NoBound, got {other:?}"),
        }

        let task = CheckTask::new(formula("P<0.3 [ F \"bad\" ]"));
        let bound = task.bound().unwrap();
        assert_eq!(bound.comparison, ComparisonType::Less);
        assert_eq!(bound.threshold, 0.3);
    }

    #[test]
    fn test_substitution_drops_bound() {
        let task = CheckTask::new(formula("P<0.3 [ true U<=5 \"bad\" ]"));
        let simpler = formula("P<0.3 [ F \"bad\" ]");

        // values at arbitrary states no longer decide the original bound
        let substituted = task.substitute(simpler.clone());
        assert!(!substituted.has_bound());
        // the direction survives
        assert_eq!(
            substituted.direction(),
            Some(OptimizationDirection::Maximize)
        );

        // when only initial states matter, the bound still applies there
        let substituted = task
            .with_only_initial_states_relevant(true)
            .substitute(simpler);
        assert!(substituted.has_bound());
    }

    #[test]
    fn test_reward_model_capture() {
        let task = CheckTask::new(formula("R{\"energy\"}max=? [ C<=10 ]"));
        assert_eq!(task.reward_model(), Some("energy"));
        assert_eq!(task.direction(), Some(OptimizationDirection::Maximize));
    }

    #[test]
    fn test_hints() {
        let task = CheckTask::new(formula("Pmin=? [ F \"goal\" ]")).with_hint(TaskHint {
            values: Some(vec![0.0, 0.5, 1.0]),
            scheduler: None,
        });
        assert!(!task.hint().is_empty());
        assert_eq!(task.hint().values.as_ref().unwrap().len(), 3);
    }
}
