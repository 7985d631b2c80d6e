// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Reward-bounded unfolding of partially observable models.
//!
//! A probability formula over a reach with reward bounds is turned into a
//! plain reachability probability on a product model whose states pair an
//! original state with an epoch vector of remaining budgets and outstanding
//! requirements. Upper bounds route exhausted choices to an absorbing sink;
//! lower bounds hold the goal back until their requirement reaches zero.

use std::collections::{BTreeMap, VecDeque};

use fxhash::FxHashMap;
use itertools::Itertools;
use logic::printer;
use logic::syntax::{BoundEnd, PathFormula, StateFormula};
use numeric::{NumericError, SparseMatrixBuilder};
use thiserror::Error;

use crate::model::{Labeling, ModelError, ModelType, SparseModel};

/// Product state holding the runs that satisfied the formula.
const TARGET_STATE: usize = 0;
/// Product state holding the runs that can no longer satisfy it.
const SINK_STATE: usize = 1;

/// Errors of the reward-bounded unfolding.
#[derive(Error, Debug, PartialEq)]
pub enum UnfoldError {
    /// The formula is not a probability of a reward-bounded reach over
    /// propositional operands.
    #[error("formula {0} is not a reward-bounded reachability probability")]
    UnsupportedFormula(String),
    /// A tracked reward model carries a non-integral reward.
    #[error("reward model {model:?} has non-integral reward {value} at {place}")]
    NonIntegralReward {
        /// Name of the reward model
        model: String,
        /// The state or choice carrying the reward
        place: String,
        /// The offending value
        value: f64,
    },
    /// A tracked reward model carries a negative reward.
    #[error("reward model {model:?} has negative reward {value} at {place}")]
    NegativeReward {
        /// Name of the reward model
        model: String,
        /// The state or choice carrying the reward
        place: String,
        /// The offending value
        value: f64,
    },
    /// A tracked reward model rewards individual transitions.
    #[error("reward model {0:?} carries transition rewards, which the unfolding cannot track")]
    TransitionRewardsUnsupported(String),
    /// Continuous-time models cannot be unfolded.
    #[error("{0} models cannot be unfolded")]
    UnsupportedModel(ModelType),
    /// The unfolding starts from a single initial state.
    #[error("the unfolding needs exactly one initial state, found {0}")]
    InitialStateCount(usize),
    /// The model rejected a query.
    #[error("{0}")]
    Model(#[from] ModelError),
    /// The product matrix could not be built.
    #[error("{0}")]
    Numeric(#[from] NumericError),
}

/// How observations of the input model are carried to the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationMode {
    /// The product state (s, e) observes what s observes
    #[default]
    Basic,
    /// Observations additionally reveal which class of per-choice reward
    /// vectors s belongs to
    RewardAware,
}

/// Whether a dimension tracks a budget or a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// Remaining budget; exhausting it misses the goal
    Upper,
    /// Outstanding requirement; the goal counts once it reaches zero
    Lower,
}

/// One dimension of the epoch vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// Reward model the dimension tracks; `None` counts steps
    pub reward_model: Option<String>,
    /// Budget or requirement
    pub kind: BoundKind,
    /// The non-strict integer bound
    pub bound: u64,
}

/// The outcome of unfolding: the product model, the rewritten formula, and
/// the correspondence between product states and (state, epoch) pairs.
#[derive(Debug)]
pub struct UnfoldedPomdp {
    /// The product model, of the same class as the input
    pub model: SparseModel,
    /// `P[⋄ goal]` with the bounds stripped
    pub formula: StateFormula,
    /// The tracked dimensions, upper bounds first
    pub dimensions: Vec<Dimension>,
    /// The interned epoch vectors, indexed by epoch id
    pub epochs: Vec<Vec<u64>>,
    /// (state, epoch id) → product state
    pub state_epoch_to_new: FxHashMap<(usize, usize), usize>,
    /// Product state → (state, epoch id); the target and sink map to `None`
    pub new_to_state_epoch: Vec<Option<(usize, usize)>>,
}

fn unsupported(formula: &StateFormula) -> UnfoldError {
    UnfoldError::UnsupportedFormula(printer::state_formula(formula))
}

/// Convert a bound end to an integer, rejecting non-integral values.
fn integral_end(formula: &StateFormula, end: &BoundEnd) -> Result<i64, UnfoldError> {
    if end.value.fract() != 0.0 || end.value.abs() > i64::MAX as f64 {
        return Err(unsupported(formula));
    }
    Ok(end.value as i64)
}

/// Keep the tightest bound per reward model: the smallest budget, the
/// largest requirement.
fn merge_tightest(
    list: &mut Vec<(Option<String>, u64)>,
    reward_model: &Option<String>,
    value: u64,
    keep_smaller: bool,
) {
    match list.iter_mut().find(|(model, _)| model == reward_model) {
        Some((_, existing)) => {
            *existing = if keep_smaller {
                (*existing).min(value)
            } else {
                (*existing).max(value)
            };
        }
        None => list.push((reward_model.clone(), value)),
    }
}

/// Check one reward summand and convert it to the integer the epoch tracks.
fn to_integral(model: &str, place: String, value: f64) -> Result<u64, UnfoldError> {
    if value < 0.0 {
        return Err(UnfoldError::NegativeReward {
            model: model.to_string(),
            place,
            value,
        });
    }
    if value.fract() != 0.0 {
        return Err(UnfoldError::NonIntegralReward {
            model: model.to_string(),
            place,
            value,
        });
    }
    Ok(value as u64)
}

fn intern_epoch(
    ids: &mut FxHashMap<Vec<u64>, usize>,
    epochs: &mut Vec<Vec<u64>>,
    epoch: Vec<u64>,
) -> usize {
    if let Some(&id) = ids.get(&epoch) {
        return id;
    }
    let id = epochs.len();
    ids.insert(epoch.clone(), id);
    epochs.push(epoch);
    id
}

fn resolve_product_state(
    index: &mut FxHashMap<(usize, usize), usize>,
    back: &mut Vec<Option<(usize, usize)>>,
    queue: &mut VecDeque<(usize, usize)>,
    state: usize,
    epoch: usize,
) -> usize {
    if let Some(&id) = index.get(&(state, epoch)) {
        return id;
    }
    let id = back.len();
    index.insert((state, epoch), id);
    back.push(Some((state, epoch)));
    queue.push_back((state, epoch));
    id
}

/// Unfold a reward-bounded reachability formula into a product model.
///
/// The formula must be a probability operator over a bounded until or
/// eventually with propositional operands. Its bound dimensions become the
/// epoch vector: strict ends are shifted to their non-strict neighbor, and
/// several bounds on the same reward model keep the tightest. Requirements
/// that are already met drop out. Every tracked reward must be a
/// non-negative integer per choice.
pub fn unfold(
    model: &SparseModel,
    formula: &StateFormula,
    mode: ObservationMode,
) -> Result<UnfoldedPomdp, UnfoldError> {
    if model.model_type.is_continuous_time() {
        return Err(UnfoldError::UnsupportedModel(model.model_type));
    }
    let StateFormula::Probability {
        direction,
        bound,
        path,
    } = formula
    else {
        return Err(unsupported(formula));
    };
    let (lhs, rhs, bounds) = match path.as_ref() {
        PathFormula::Until { lhs, rhs, bounds } if !bounds.is_empty() => {
            (lhs.as_ref().clone(), rhs.as_ref().clone(), bounds)
        }
        PathFormula::Eventually { inner, bounds } if !bounds.is_empty() => {
            (StateFormula::true_(), inner.as_ref().clone(), bounds)
        }
        _ => return Err(unsupported(formula)),
    };

    let initial_states = model.initial_states();
    let &[initial_state] = initial_states.as_slice() else {
        return Err(UnfoldError::InitialStateCount(initial_states.len()));
    };

    // turn the bound ends into integer budgets and requirements
    let mut uppers: Vec<(Option<String>, u64)> = Vec::new();
    let mut lowers: Vec<(Option<String>, u64)> = Vec::new();
    for time_bound in bounds {
        if let Some(end) = &time_bound.upper {
            let mut budget = integral_end(formula, end)?;
            if end.strict {
                budget -= 1;
            }
            if budget < 0 {
                return Err(unsupported(formula));
            }
            merge_tightest(&mut uppers, &time_bound.reward_model, budget as u64, true);
        }
        if let Some(end) = &time_bound.lower {
            let mut requirement = integral_end(formula, end)?;
            if end.strict {
                requirement += 1;
            }
            // a requirement of zero is met before the first step
            if requirement > 0 {
                merge_tightest(&mut lowers, &time_bound.reward_model, requirement as u64, false);
            }
        }
    }
    let mut dimensions = uppers
        .into_iter()
        .map(|(reward_model, bound)| Dimension {
            reward_model,
            kind: BoundKind::Upper,
            bound,
        })
        .collect_vec();
    dimensions.extend(lowers.into_iter().map(|(reward_model, bound)| Dimension {
        reward_model,
        kind: BoundKind::Lower,
        bound,
    }));

    // per dimension, the integer reward each choice row accumulates
    let rows = model.transitions.row_count();
    let mut dimension_rewards: Vec<Vec<u64>> = Vec::with_capacity(dimensions.len());
    for dimension in &dimensions {
        match &dimension.reward_model {
            None => dimension_rewards.push(vec![1; rows]),
            Some(name) => {
                let rewards = model.reward_model(Some(name))?;
                if rewards.has_transition_rewards() {
                    return Err(UnfoldError::TransitionRewardsUnsupported(name.clone()));
                }
                let mut per_row = Vec::with_capacity(rows);
                for state in 0..model.state_count() {
                    let state_part = to_integral(
                        name,
                        format!("state {state}"),
                        rewards.state_reward(state),
                    )?;
                    for row in model.transitions.group(state) {
                        let action = rewards
                            .state_action_rewards
                            .as_ref()
                            .map_or(0.0, |rewards| rewards[row]);
                        let action_part = to_integral(name, format!("choice {row}"), action)?;
                        per_row.push(state_part + action_part);
                    }
                }
                dimension_rewards.push(per_row);
            }
        }
    }

    let propositional = |error| match error {
        ModelError::NotPropositional(text) => UnfoldError::UnsupportedFormula(text),
        other => UnfoldError::Model(other),
    };
    let lhs_states = model.satisfaction_set(&lhs).map_err(propositional)?;
    let rhs_states = model.satisfaction_set(&rhs).map_err(propositional)?;

    let mut epoch_ids: FxHashMap<Vec<u64>, usize> = FxHashMap::default();
    let mut epochs: Vec<Vec<u64>> = Vec::new();
    let mut state_epoch_to_new: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    let mut new_to_state_epoch: Vec<Option<(usize, usize)>> = vec![None, None];
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    let initial_epoch = intern_epoch(
        &mut epoch_ids,
        &mut epochs,
        dimensions.iter().map(|dimension| dimension.bound).collect(),
    );
    let initial_id = resolve_product_state(
        &mut state_epoch_to_new,
        &mut new_to_state_epoch,
        &mut queue,
        initial_state,
        initial_epoch,
    );

    let mut builder = SparseMatrixBuilder::new();
    let mut next_row = 0;
    // the target and the sink hold their runs forever
    for sentinel in [TARGET_STATE, SINK_STATE] {
        builder.new_row_group(next_row)?;
        builder.add_next_value(next_row, sentinel, 1.0)?;
        next_row += 1;
    }

    while let Some((state, epoch_id)) = queue.pop_front() {
        builder.new_row_group(next_row)?;
        let epoch = epochs[epoch_id].clone();
        for row in model.transitions.group(state) {
            let mut successor_epoch = epoch.clone();
            let mut exhausted = false;
            for (d, dimension) in dimensions.iter().enumerate() {
                let reward = dimension_rewards[d][row];
                match dimension.kind {
                    BoundKind::Upper => {
                        if reward > successor_epoch[d] {
                            exhausted = true;
                            break;
                        }
                        successor_epoch[d] -= reward;
                    }
                    BoundKind::Lower => {
                        successor_epoch[d] = successor_epoch[d].saturating_sub(reward);
                    }
                }
            }
            if exhausted {
                builder.add_next_value(next_row, SINK_STATE, 1.0)?;
                next_row += 1;
                continue;
            }
            let lower_satisfied = dimensions
                .iter()
                .enumerate()
                .all(|(d, dimension)| dimension.kind != BoundKind::Lower || successor_epoch[d] == 0);
            let successor_epoch_id = intern_epoch(&mut epoch_ids, &mut epochs, successor_epoch);

            // branches landing on the same product state sum their probability
            let mut edges: BTreeMap<usize, f64> = BTreeMap::new();
            for &(successor, probability) in model.transitions.row(row) {
                let product_successor = if lower_satisfied && rhs_states[successor] {
                    TARGET_STATE
                } else if lhs_states[successor] {
                    resolve_product_state(
                        &mut state_epoch_to_new,
                        &mut new_to_state_epoch,
                        &mut queue,
                        successor,
                        successor_epoch_id,
                    )
                } else {
                    SINK_STATE
                };
                *edges.entry(product_successor).or_insert(0.0) += probability;
            }
            for (successor, probability) in edges {
                builder.add_next_value(next_row, successor, probability)?;
            }
            next_row += 1;
        }
    }

    let product_states = new_to_state_epoch.len();
    let matrix = builder.build(Some(next_row), Some(product_states))?;

    let mut labeling = Labeling::new(product_states);
    labeling.add_label("goal")?;
    labeling.assign("goal", TARGET_STATE)?;
    labeling.add_label("init")?;
    labeling.assign("init", initial_id)?;

    let observations = model.observations.as_ref().map(|observations| {
        let count = observations.iter().copied().max().map_or(0, |largest| largest + 1);
        let (class_count, state_class) = match mode {
            ObservationMode::Basic => (1, vec![0; model.state_count()]),
            ObservationMode::RewardAware => {
                // the class of a state is its sequence of per-choice reward vectors
                let mut classes: FxHashMap<Vec<Vec<u64>>, usize> = FxHashMap::default();
                let mut state_class = vec![0; model.state_count()];
                for state in 0..model.state_count() {
                    let signature = model
                        .transitions
                        .group(state)
                        .map(|row| {
                            dimension_rewards
                                .iter()
                                .map(|rewards| rewards[row])
                                .collect_vec()
                        })
                        .collect_vec();
                    let next_class = classes.len();
                    state_class[state] = *classes.entry(signature).or_insert(next_class);
                }
                (classes.len().max(1), state_class)
            }
        };
        let mut product_observations = vec![0; product_states];
        product_observations[TARGET_STATE] = count * class_count;
        product_observations[SINK_STATE] = count * class_count + 1;
        for (id, origin) in new_to_state_epoch.iter().enumerate() {
            if let Some((state, _)) = origin {
                product_observations[id] = observations[*state] + count * state_class[*state];
            }
        }
        product_observations
    });

    let mut product = SparseModel::new(model.model_type, matrix, labeling)?;
    if let Some(observations) = observations {
        product = product.with_observations(observations)?;
    }

    log::debug!(
        "unfolded {} states over {} epochs into {} product states ({} dimensions)",
        model.state_count(),
        epochs.len(),
        product_states,
        dimensions.len()
    );

    let formula = StateFormula::Probability {
        direction: *direction,
        bound: bound.clone(),
        path: Box::new(PathFormula::eventually(StateFormula::label("goal"))),
    };
    Ok(UnfoldedPomdp {
        model: product,
        formula,
        dimensions,
        epochs,
        state_epoch_to_new,
        new_to_state_epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::RewardModel;
    use logic::syntax::TimeBound;

    /// A model with one choice per state and the labels `init` on state 0
    /// and `goal` on the given states.
    fn model_from_rows(
        model_type: ModelType,
        rows: &[Vec<(usize, f64)>],
        goal: &[usize],
    ) -> SparseModel {
        let mut builder = SparseMatrixBuilder::new();
        let nondeterministic = model_type.is_nondeterministic();
        for (state, row) in rows.iter().enumerate() {
            if nondeterministic {
                builder.new_row_group(state).unwrap();
            }
            for &(dst, value) in row {
                builder.add_next_value(state, dst, value).unwrap();
            }
        }
        let matrix = builder.build(None, Some(rows.len())).unwrap();
        let mut labeling = Labeling::new(rows.len());
        labeling.add_label("init").unwrap();
        labeling.add_label("goal").unwrap();
        labeling.assign("init", 0).unwrap();
        for &state in goal {
            labeling.assign("goal", state).unwrap();
        }
        SparseModel::new(model_type, matrix, labeling).unwrap()
    }

    fn bounded_reach(bounds: Vec<TimeBound>) -> StateFormula {
        StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::bounded_until(
                StateFormula::true_(),
                StateFormula::label("goal"),
                bounds,
            )),
        }
    }

    fn lower_steps(steps: f64, strict: bool) -> TimeBound {
        TimeBound {
            reward_model: None,
            lower: Some(BoundEnd {
                value: steps,
                strict,
            }),
            upper: None,
        }
    }

    #[test]
    fn a_step_bound_unrolls_into_epochs() {
        // state 0 loops forever, so the budget can only run out
        let model = model_from_rows(ModelType::Mdp, &[vec![(0, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_steps(3)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(
            result.dimensions,
            vec![Dimension {
                reward_model: None,
                kind: BoundKind::Upper,
                bound: 3
            }]
        );
        assert_eq!(result.epochs, vec![vec![3], vec![2], vec![1], vec![0]]);
        assert_eq!(result.model.state_count(), 6);
        // the sentinels hold their runs
        assert_eq!(result.model.transitions.row(0), &[(0, 1.0)]);
        assert_eq!(result.model.transitions.row(1), &[(1, 1.0)]);
        // (0, e) steps down to (0, e-1) until the budget is exhausted
        assert_eq!(result.model.transitions.row(2), &[(3, 1.0)]);
        assert_eq!(result.model.transitions.row(3), &[(4, 1.0)]);
        assert_eq!(result.model.transitions.row(4), &[(5, 1.0)]);
        assert_eq!(result.model.transitions.row(5), &[(1, 1.0)]);
        assert!(result.model.labeling.is_marked("goal", 0));
        assert!(result.model.labeling.is_marked("init", 2));
        let expected = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::eventually(StateFormula::label("goal"))),
        };
        assert_eq!(result.formula, expected);
    }

    #[test]
    fn product_states_and_state_epoch_pairs_correspond() {
        let model = model_from_rows(ModelType::Mdp, &[vec![(0, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_steps(3)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(result.new_to_state_epoch[TARGET_STATE], None);
        assert_eq!(result.new_to_state_epoch[SINK_STATE], None);
        for (&(state, epoch), &id) in &result.state_epoch_to_new {
            assert_eq!(result.new_to_state_epoch[id], Some((state, epoch)));
        }
        for (id, origin) in result.new_to_state_epoch.iter().enumerate().skip(2) {
            let pair = origin.unwrap();
            assert_eq!(result.state_epoch_to_new[&pair], id);
        }
    }

    #[test]
    fn lower_bounds_count_down_to_satisfaction() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![lower_steps(2.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(
            result.dimensions,
            vec![Dimension {
                reward_model: None,
                kind: BoundKind::Lower,
                bound: 2
            }]
        );
        // reaching the goal after one step is too early; the second visit counts
        assert_eq!(result.model.state_count(), 4);
        assert_eq!(result.model.transitions.row(2), &[(3, 1.0)]);
        assert_eq!(result.model.transitions.row(3), &[(0, 1.0)]);
        assert_eq!(result.model.model_type, ModelType::Dtmc);
    }

    #[test]
    fn strict_bounds_shift_by_one() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let below = TimeBound {
            reward_model: None,
            lower: None,
            upper: Some(BoundEnd {
                value: 4.0,
                strict: true,
            }),
        };
        let result = unfold(&model, &bounded_reach(vec![below]), ObservationMode::Basic).unwrap();
        assert_eq!(result.dimensions[0].bound, 3);

        let result = unfold(
            &model,
            &bounded_reach(vec![lower_steps(1.0, true)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(
            result.dimensions,
            vec![Dimension {
                reward_model: None,
                kind: BoundKind::Lower,
                bound: 2
            }]
        );
    }

    #[test]
    fn bounds_on_the_same_dimension_keep_the_tightest() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_steps(5), TimeBound::upper_steps(3)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(result.dimensions.len(), 1);
        assert_eq!(result.dimensions[0].bound, 3);
    }

    #[test]
    fn upper_dimensions_come_before_lower_ones() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![lower_steps(1.0, false), TimeBound::upper_steps(3)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(result.dimensions[0].kind, BoundKind::Upper);
        assert_eq!(result.dimensions[1].kind, BoundKind::Lower);
    }

    #[test]
    fn trivially_satisfied_requirements_drop_out() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let result = unfold(
            &model,
            &bounded_reach(vec![lower_steps(0.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert!(result.dimensions.is_empty());
        assert_eq!(result.epochs.len(), 1);
        assert!(result.epochs[0].is_empty());
        // what remains is the plain reachability structure
        assert_eq!(result.model.state_count(), 3);
        assert_eq!(result.model.transitions.row(2), &[(0, 1.0)]);
    }

    #[test]
    fn bounded_eventually_unfolds_like_until() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let formula = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::bounded_eventually(
                StateFormula::label("goal"),
                vec![TimeBound::upper_steps(1)],
            )),
        };
        let result = unfold(&model, &formula, ObservationMode::Basic).unwrap();
        assert_eq!(result.model.state_count(), 3);
        assert_eq!(result.model.transitions.row(2), &[(0, 1.0)]);
    }

    #[test]
    fn parallel_branches_to_the_goal_merge() {
        let model = model_from_rows(
            ModelType::Dtmc,
            &[
                vec![(1, 0.5), (2, 0.5)],
                vec![(1, 1.0)],
                vec![(2, 1.0)],
            ],
            &[1, 2],
        );
        let result = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_steps(2)]),
            ObservationMode::Basic,
        )
        .unwrap();
        assert_eq!(result.model.transitions.row(2), &[(0, 1.0)]);
    }

    #[test]
    fn leaving_the_invariant_leads_to_the_sink() {
        let mut model = model_from_rows(
            ModelType::Dtmc,
            &[
                vec![(1, 0.5), (2, 0.5)],
                vec![(1, 1.0)],
                vec![(2, 1.0)],
            ],
            &[2],
        );
        model.labeling.add_label("safe").unwrap();
        model.labeling.assign("safe", 0).unwrap();
        let formula = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::bounded_until(
                StateFormula::label("safe"),
                StateFormula::label("goal"),
                vec![TimeBound::upper_steps(2)],
            )),
        };
        let result = unfold(&model, &formula, ObservationMode::Basic).unwrap();
        assert_eq!(result.model.state_count(), 3);
        assert_eq!(result.model.transitions.row(2), &[(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn rewards_must_be_non_negative_integers() {
        let mut model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        model
            .add_reward_model(RewardModel::new("energy").with_state_rewards(vec![0.5, 0.0]))
            .unwrap();
        let error = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_reward("energy", 4.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap_err();
        assert_eq!(
            error,
            UnfoldError::NonIntegralReward {
                model: "energy".to_string(),
                place: "state 0".to_string(),
                value: 0.5
            }
        );

        let mut model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        model
            .add_reward_model(RewardModel::new("energy").with_state_rewards(vec![-1.0, 0.0]))
            .unwrap();
        let error = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_reward("energy", 4.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap_err();
        assert_eq!(
            error,
            UnfoldError::NegativeReward {
                model: "energy".to_string(),
                place: "state 0".to_string(),
                value: -1.0
            }
        );

        let mut model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        model
            .add_reward_model(
                RewardModel::new("energy").with_state_action_rewards(vec![0.0, 2.5]),
            )
            .unwrap();
        let error = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_reward("energy", 4.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap_err();
        assert_eq!(
            error,
            UnfoldError::NonIntegralReward {
                model: "energy".to_string(),
                place: "choice 1".to_string(),
                value: 2.5
            }
        );
    }

    #[test]
    fn transition_rewards_are_rejected() {
        let mut model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let per_transition = model.transitions.clone();
        model
            .add_reward_model(RewardModel::new("wear").with_transition_rewards(per_transition))
            .unwrap();
        let error = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_reward("wear", 4.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap_err();
        assert_eq!(
            error,
            UnfoldError::TransitionRewardsUnsupported("wear".to_string())
        );
    }

    #[test]
    fn only_bounded_reaches_unfold() {
        let model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        let plain = StateFormula::label("goal");
        assert!(matches!(
            unfold(&model, &plain, ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));

        let next = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::next(StateFormula::label("goal"))),
        };
        assert!(matches!(
            unfold(&model, &next, ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));

        let unbounded = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::until(
                StateFormula::true_(),
                StateFormula::label("goal"),
            )),
        };
        assert!(matches!(
            unfold(&model, &unbounded, ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));

        // an operand that is itself an operator formula
        let nested = StateFormula::Probability {
            direction: None,
            bound: None,
            path: Box::new(PathFormula::bounded_until(
                StateFormula::true_(),
                StateFormula::Probability {
                    direction: None,
                    bound: None,
                    path: Box::new(PathFormula::next(StateFormula::label("goal"))),
                },
                vec![TimeBound::upper_steps(1)],
            )),
        };
        assert!(matches!(
            unfold(&model, &nested, ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));

        // a strict upper bound of zero admits no step at all
        let impossible = TimeBound {
            reward_model: None,
            lower: None,
            upper: Some(BoundEnd {
                value: 0.0,
                strict: true,
            }),
        };
        assert!(matches!(
            unfold(&model, &bounded_reach(vec![impossible]), ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));

        // non-integral bounds cannot become epochs
        let fractional = TimeBound {
            reward_model: None,
            lower: None,
            upper: Some(BoundEnd {
                value: 2.5,
                strict: false,
            }),
        };
        assert!(matches!(
            unfold(&model, &bounded_reach(vec![fractional]), ObservationMode::Basic),
            Err(UnfoldError::UnsupportedFormula(_))
        ));
    }

    #[test]
    fn continuous_time_models_do_not_unfold() {
        let model = model_from_rows(ModelType::Ctmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1])
            .with_exit_rates(vec![1.0, 1.0])
            .unwrap();
        assert_eq!(
            unfold(
                &model,
                &bounded_reach(vec![TimeBound::upper_steps(1)]),
                ObservationMode::Basic
            )
            .unwrap_err(),
            UnfoldError::UnsupportedModel(ModelType::Ctmc)
        );
    }

    #[test]
    fn the_unfolding_needs_one_initial_state() {
        let mut model = model_from_rows(ModelType::Dtmc, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1]);
        model.labeling.assign("init", 1).unwrap();
        assert_eq!(
            unfold(
                &model,
                &bounded_reach(vec![TimeBound::upper_steps(1)]),
                ObservationMode::Basic
            )
            .unwrap_err(),
            UnfoldError::InitialStateCount(2)
        );
    }

    #[test]
    fn observations_survive_the_unfolding() {
        let model = model_from_rows(ModelType::Mdp, &[vec![(1, 1.0)], vec![(1, 1.0)]], &[1])
            .with_observations(vec![0, 1])
            .unwrap();
        let result = unfold(
            &model,
            &bounded_reach(vec![lower_steps(2.0, false)]),
            ObservationMode::Basic,
        )
        .unwrap();
        // the sentinels observe fresh classes after the model's own
        assert_eq!(result.model.observations, Some(vec![2, 3, 0, 1]));
    }

    #[test]
    fn reward_aware_observations_reveal_the_choice_rewards() {
        let mut model = model_from_rows(
            ModelType::Mdp,
            &[vec![(1, 1.0)], vec![(2, 1.0)], vec![(2, 1.0)]],
            &[2],
        )
        .with_observations(vec![0, 0, 0])
        .unwrap();
        model
            .add_reward_model(RewardModel::new("energy").with_state_rewards(vec![2.0, 0.0, 0.0]))
            .unwrap();
        let result = unfold(
            &model,
            &bounded_reach(vec![TimeBound::upper_reward("energy", 4.0, false)]),
            ObservationMode::RewardAware,
        )
        .unwrap();
        // states that cost 2 and states that cost nothing fall into
        // different classes, and the base observation is the same
        assert_eq!(result.model.observations, Some(vec![2, 3, 0, 1]));
    }
}
