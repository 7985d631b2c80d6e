// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A visitor protocol over the formula AST.
//!
//! The AST is a closed sum, so consumers that need to walk whole formulas
//! (the fragment gate, the check-task builder) implement [`FormulaVisitor`]
//! instead of re-spelling the recursion. The walk is depth-first; `enter_*`
//! runs before a node's children, `exit_*` after them, and the first error
//! aborts the traversal.

use crate::syntax::{PathFormula, StateFormula};

/// Callbacks invoked while walking a formula.
///
/// All methods default to doing nothing, so implementations only override
/// the hooks they care about.
pub trait FormulaVisitor {
    /// Error type used to abort the traversal
    type Error;

    /// Called before descending into a state formula.
    fn enter_state(&mut self, _formula: &StateFormula) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called after all children of a state formula have been visited.
    fn exit_state(&mut self, _formula: &StateFormula) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called before descending into a path formula.
    fn enter_path(&mut self, _formula: &PathFormula) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called after all children of a path formula have been visited.
    fn exit_path(&mut self, _formula: &PathFormula) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl StateFormula {
    /// Walk this formula depth-first with the given visitor.
    pub fn accept<V: FormulaVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.enter_state(self)?;
        match self {
            StateFormula::Literal(_) | StateFormula::Label(_) | StateFormula::Expression(_) => {}
            StateFormula::Not(f) => f.accept(visitor)?,
            StateFormula::And(fs) | StateFormula::Or(fs) | StateFormula::MultiObjective(fs) => {
                for f in fs {
                    f.accept(visitor)?;
                }
            }
            StateFormula::Implies(lhs, rhs) | StateFormula::Iff(lhs, rhs) => {
                lhs.accept(visitor)?;
                rhs.accept(visitor)?;
            }
            StateFormula::Probability { path, .. } | StateFormula::Reward { path, .. } => {
                path.accept(visitor)?;
            }
            StateFormula::LongRunAverage { states, .. } => states.accept(visitor)?,
        }
        visitor.exit_state(self)
    }
}

impl PathFormula {
    /// Walk this formula depth-first with the given visitor.
    pub fn accept<V: FormulaVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.enter_path(self)?;
        match self {
            PathFormula::Next(f) => f.accept(visitor)?,
            PathFormula::Until { lhs, rhs, .. } => {
                lhs.accept(visitor)?;
                rhs.accept(visitor)?;
            }
            PathFormula::Eventually { inner, .. } | PathFormula::Globally { inner, .. } => {
                inner.accept(visitor)?;
            }
            PathFormula::Cumulative { .. }
            | PathFormula::Instant { .. }
            | PathFormula::LongRunReward => {}
            PathFormula::Conditional { path, condition } => {
                path.accept(visitor)?;
                condition.accept(visitor)?;
            }
        }
        visitor.exit_path(self)
    }
}
