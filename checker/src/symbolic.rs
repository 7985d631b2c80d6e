// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The symbolic-hybrid engine.
//!
//! The model's transition relation is encoded as a decision diagram, the
//! reachable state space and the qualitative probability-0/1 sets are
//! computed as symbolic fixpoints, and only the remaining quantitative
//! equations drop down to the explicit solvers. The offset-labelled diagram
//! ties the two worlds together by giving every encoded state its dense
//! explicit index.
//!
//! Deterministic models only; the diagram encoding carries no choice
//! variables.

use bitvec::prelude::*;

use dd::odd::Odd;
use dd::{DdManager, Metavariable, Ref, ValueKind};
use logic::fragment::FragmentSpec;
use logic::syntax::{PathFormula, StateFormula};
use logic::task::CheckTask;
use models::SparseModel;
use numeric::MinMaxSettings;

use crate::error::CheckError;
use crate::prob01;
use crate::sparse::{self, untimed_matrix, QuantitativeResult};
use crate::timing::{self, TimeType};

/// The fragment this engine accepts: unbounded reachability with next and
/// globally, no nesting and no rewards.
pub fn fragment() -> FragmentSpec {
    FragmentSpec::reachability()
        .with_next(true)
        .with_globally(true)
}

/// The diagram encoding of a deterministic model.
struct SymbolicModel {
    manager: DdManager,
    state: Metavariable,
    /// 0/1 transition relation over the row/column variable pairs
    transitions01: Ref,
    /// All valid state encodings, over row variables
    states: Ref,
    initial: Ref,
    /// Dense indexing of the valid encodings; index `i` is state `i`
    odd: Odd,
}

impl SymbolicModel {
    fn build(model: &SparseModel) -> Result<SymbolicModel, CheckError> {
        use dd::manager::PairSide;

        let matrix = untimed_matrix(model)?;
        let count = model.state_count();
        let bits = (usize::BITS - (count.max(2) - 1).leading_zeros()) as usize;
        let manager = DdManager::new();
        let state = manager.new_metavariable("s", bits);

        let zero_leaf = manager.zero_leaf(ValueKind::Double);
        let mut probabilities = zero_leaf;
        for (source, rows) in matrix.groups().enumerate() {
            for row in rows {
                for &(column, value) in matrix.row(row) {
                    let cube = manager.apply_and(
                        manager.encode(&state, PairSide::Rows, source as u64),
                        manager.encode(&state, PairSide::Columns, column as u64),
                    );
                    let leaf = manager.leaf(dd::Value::Double(value));
                    probabilities = manager.apply_value_ite(cube, leaf, probabilities);
                }
            }
        }
        let transitions01 = manager.not_zero(probabilities);

        let mut states = manager.zero;
        for index in 0..count {
            states = manager.apply_or(states, manager.encode(&state, PairSide::Rows, index as u64));
        }
        let mut initial = manager.zero;
        for index in model.initial_states() {
            initial =
                manager.apply_or(initial, manager.encode(&state, PairSide::Rows, index as u64));
        }
        let odd = Odd::from_bdd(&manager, states, &state.row_variables())?;

        log::debug!(
            "encoded {count} states over {bits} bits, {} transition nodes",
            manager.node_count(&[transitions01])
        );

        Ok(SymbolicModel {
            manager,
            state,
            transitions01,
            states,
            initial,
            odd,
        })
    }

    /// The states reachable from the initial ones, as a forward fixpoint.
    fn reachable(&self) -> Ref {
        let pairs = self.state.pairs();
        let mut reach = self.initial;
        loop {
            let image =
                self.manager
                    .relational_image(reach, self.transitions01, pairs);
            let next = self.manager.apply_or(reach, image);
            if next == reach {
                return reach;
            }
            reach = next;
        }
    }

    /// Lift an explicit state set into a Boolean diagram over row variables.
    fn encode_set(&self, set: &BitSlice) -> Ref {
        use dd::manager::PairSide;
        let mut result = self.manager.zero;
        for index in set.iter_ones() {
            result = self.manager.apply_or(
                result,
                self.manager.encode(&self.state, PairSide::Rows, index as u64),
            );
        }
        result
    }

    /// Extract a Boolean diagram over row variables as an explicit state set.
    fn decode_set(&self, set: Ref) -> Result<BitVec, CheckError> {
        let values = self
            .odd
            .to_vector(&self.manager, self.manager.from_bdd(set, ValueKind::Double))?;
        Ok(values.iter().map(|&value| value != 0.0).collect())
    }
}

/// Check a formula with symbolic qualitative analysis and explicit
/// quantitative solves.
pub fn check(
    model: &SparseModel,
    task: &CheckTask,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    if model.model_type.is_nondeterministic() {
        return Err(CheckError::unsupported(
            "nondeterministic models in the symbolic engine",
        ));
    }
    check_formula(model, task, task.formula(), minmax)
}

fn check_formula(
    model: &SparseModel,
    task: &CheckTask,
    formula: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let StateFormula::Probability { path, .. } = formula else {
        let set = model.satisfaction_set(formula)?;
        let values = set
            .iter()
            .by_vals()
            .map(|satisfied| if satisfied { 1.0 } else { 0.0 })
            .collect();
        return Ok(QuantitativeResult::from_values(values));
    };
    match path.as_ref() {
        PathFormula::Until { lhs, rhs, bounds } if bounds.is_empty() => {
            until_probabilities(model, task, lhs, rhs, minmax)
        }
        PathFormula::Eventually { inner, bounds } if bounds.is_empty() => {
            until_probabilities(model, task, &StateFormula::true_(), inner, minmax)
        }
        PathFormula::Globally { inner, bounds } if bounds.is_empty() => {
            let negated = StateFormula::not(inner.as_ref().clone());
            let dual = StateFormula::prob_query(PathFormula::eventually(negated));
            let dual_task = task.substitute(dual.clone());
            let mut result = check_formula(model, &dual_task, &dual, minmax)?;
            for value in &mut result.values {
                *value = 1.0 - *value;
            }
            Ok(result)
        }
        // a single step has no qualitative part worth a symbolic pass
        PathFormula::Next(_) => sparse::check(model, &task.substitute(formula.clone()), minmax),
        _ => Err(CheckError::unsupported(
            "bounded operators in the symbolic engine",
        )),
    }
}

fn until_probabilities(
    model: &SparseModel,
    task: &CheckTask,
    lhs: &StateFormula,
    rhs: &StateFormula,
    minmax: &MinMaxSettings,
) -> Result<QuantitativeResult, CheckError> {
    let symbolic = SymbolicModel::build(model)?;
    let manager = &symbolic.manager;
    let pairs = symbolic.state.pairs();

    let phi = symbolic.encode_set(&model.satisfaction_set(lhs)?);
    let psi = symbolic.encode_set(&model.satisfaction_set(rhs)?);

    let start = timing::start();
    let reachable = symbolic.reachable();
    let (prob0_sym, prob1_sym) = prob01::qualitative_symbolic(
        manager,
        symbolic.transitions01,
        pairs,
        reachable,
        manager.apply_and(phi, reachable),
        manager.apply_and(psi, reachable),
    );
    timing::elapsed(TimeType::SymbolicFixpoint, start);

    let mut prob0 = symbolic.decode_set(prob0_sym)?;
    let prob1 = symbolic.decode_set(prob1_sym)?;
    // unreachable states never influence the initial states; folding them
    // into prob-0 keeps them out of the equation system
    let unreachable = symbolic.decode_set(manager.apply_and(symbolic.states, -reachable))?;
    log::debug!(
        "{} of {} states reachable",
        model.state_count() - unreachable.count_ones(),
        model.state_count()
    );
    for state in unreachable.iter_ones() {
        prob0.set(state, true);
    }

    let matrix = untimed_matrix(model)?;
    sparse::reachability_values(model, &matrix, task, &prob0, &prob1, None, minmax)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logic::parser::formula;
    use models::{Labeling, ModelType};
    use numeric::SparseMatrixBuilder;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    /// 0 flips between the path to the goal and the trap; 4 is unreachable.
    fn gridless_chain() -> SparseModel {
        let mut builder = SparseMatrixBuilder::new();
        builder.add_next_value(0, 1, 0.5).unwrap();
        builder.add_next_value(0, 3, 0.5).unwrap();
        builder.add_next_value(1, 2, 1.0).unwrap();
        builder.add_next_value(2, 2, 1.0).unwrap();
        builder.add_next_value(3, 3, 1.0).unwrap();
        builder.add_next_value(4, 2, 1.0).unwrap();
        let matrix = builder.build(None, Some(5)).unwrap();
        let mut labeling = Labeling::new(5);
        labeling.add_label("init").unwrap();
        labeling.add_label("goal").unwrap();
        labeling.add_label("safe").unwrap();
        labeling.assign("init", 0).unwrap();
        labeling.assign("goal", 2).unwrap();
        for state in [0, 1, 2, 4] {
            labeling.assign("safe", state).unwrap();
        }
        SparseModel::new(ModelType::Dtmc, matrix, labeling).unwrap()
    }

    fn run(model: &SparseModel, property: &str) -> QuantitativeResult {
        let task = CheckTask::new(formula(property));
        check(model, &task, &MinMaxSettings::default()).unwrap()
    }

    #[test]
    fn test_matches_sparse_engine() {
        let model = gridless_chain();
        let property = "P=? [ F \"goal\" ]";
        let symbolic = run(&model, property);
        let task = CheckTask::new(formula(property));
        let explicit = sparse::check(&model, &task, &MinMaxSettings::default()).unwrap();
        for state in 0..4 {
            assert_close(symbolic.values[state], explicit.values[state]);
        }
    }

    #[test]
    fn test_reachability_values() {
        let model = gridless_chain();
        let result = run(&model, "P=? [ F \"goal\" ]");
        assert_close(result.values[0], 0.5);
        assert_close(result.values[1], 1.0);
        assert_close(result.values[3], 0.0);
        // the unreachable state is folded into prob-0
        assert_close(result.values[4], 0.0);
    }

    #[test]
    fn test_globally_and_next() {
        let model = gridless_chain();
        let result = run(&model, "P=? [ G \"safe\" ]");
        assert_close(result.values[0], 0.5);
        let result = run(&model, "P=? [ X \"goal\" ]");
        assert_close(result.values[1], 1.0);
        assert_close(result.values[0], 0.0);
    }

    #[test]
    fn test_rejects_nondeterminism() {
        let mut builder = SparseMatrixBuilder::new();
        builder.new_row_group(0).unwrap();
        builder.add_next_value(0, 0, 1.0).unwrap();
        builder.add_next_value(1, 1, 1.0).unwrap();
        builder.new_row_group(2).unwrap();
        builder.add_next_value(2, 1, 1.0).unwrap();
        let matrix = builder.build(None, None).unwrap();
        let mut labeling = Labeling::new(2);
        labeling.add_label("init").unwrap();
        labeling.assign("init", 0).unwrap();
        let model = SparseModel::new(ModelType::Mdp, matrix, labeling).unwrap();

        let task = CheckTask::new(formula("Pmax=? [ F \"init\" ]"));
        let result = check(&model, &task, &MinMaxSettings::default());
        assert!(matches!(result, Err(CheckError::Unsupported(_))));
    }
}
