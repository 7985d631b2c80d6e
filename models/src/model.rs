// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The in-memory representation of explicit-state probabilistic models.
//!
//! A [`SparseModel`] couples a row-grouped transition matrix with a state
//! labeling and optional per-class extras: reward models, exit rates for
//! continuous-time classes, the Markovian-state set of Markov automata,
//! per-state observations for partial observability, and a choice labeling.
//! Deterministic classes keep one row per state; nondeterministic classes
//! group one row per available action.

use std::fmt;

use bitvec::prelude::*;
use fxhash::FxHashMap;
use logic::printer;
use logic::syntax::StateFormula;
use numeric::SparseMatrix;
use thiserror::Error;

use crate::rewards::RewardModel;

/// Errors raised when a model is assembled from mismatched parts or queried
/// for something it does not carry.
#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    /// A label name was declared twice in the same labeling.
    #[error("label {0:?} is already declared")]
    DuplicateLabel(String),
    /// A label was referenced without being declared.
    #[error("label {0:?} is not declared")]
    UnknownLabel(String),
    /// A state or choice index beyond the labeled range.
    #[error("index {index} is out of range for {count} items")]
    OutOfRange {
        /// The offending index
        index: usize,
        /// The number of items the labeling covers
        count: usize,
    },
    /// Two parts of the model disagree about a dimension.
    #[error("{0}")]
    DimensionMismatch(String),
    /// A reward model with this name was requested but none exists.
    #[error("reward model {0:?} does not exist")]
    UnknownRewardModel(String),
    /// A reward model was requested without a name while several exist.
    #[error("no reward model was named, but the model carries {0}")]
    NoUniqueRewardModel(usize),
    /// The formula reaches beyond the propositional fragment the labeling
    /// can evaluate.
    #[error("formula {0} is not propositional")]
    NotPropositional(String),
}

/// The class of an explicit-state model, as declared by the header token of
/// its transitions file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Discrete-time Markov chain
    Dtmc,
    /// Continuous-time Markov chain
    Ctmc,
    /// Markov decision process; a POMDP is an MDP with observations attached
    Mdp,
    /// Markov automaton
    Ma,
}

impl ModelType {
    /// Whether states of this class choose among several action rows.
    pub fn is_nondeterministic(self) -> bool {
        matches!(self, ModelType::Mdp | ModelType::Ma)
    }

    /// Whether this class carries exit rates next to its branching
    /// probabilities.
    pub fn is_continuous_time(self) -> bool {
        matches!(self, ModelType::Ctmc | ModelType::Ma)
    }

    /// Matches a header token against the known classes, ignoring case.
    pub fn from_header_token(token: &str) -> Option<ModelType> {
        match token.to_uppercase().as_str() {
            "DTMC" => Some(ModelType::Dtmc),
            "CTMC" => Some(ModelType::Ctmc),
            "MDP" => Some(ModelType::Mdp),
            "MA" => Some(ModelType::Ma),
            _ => None,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelType::Dtmc => write!(f, "DTMC"),
            ModelType::Ctmc => write!(f, "CTMC"),
            ModelType::Mdp => write!(f, "MDP"),
            ModelType::Ma => write!(f, "MA"),
        }
    }
}

/// An assignment of named labels to a fixed range of items, which are either
/// the states of a model or its choices.
///
/// Every label must be declared before items are assigned to it. The bit set
/// behind a label always spans all items.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeling {
    item_count: usize,
    names: Vec<String>,
    sets: Vec<BitVec>,
    index: FxHashMap<String, usize>,
}

impl Labeling {
    /// Create a labeling over `item_count` items with no labels declared.
    pub fn new(item_count: usize) -> Labeling {
        Labeling {
            item_count,
            names: Vec::new(),
            sets: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// The number of items this labeling spans.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Declare a new label with an empty item set.
    pub fn add_label(&mut self, name: &str) -> Result<(), ModelError> {
        if self.index.contains_key(name) {
            return Err(ModelError::DuplicateLabel(name.to_string()));
        }
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.sets.push(BitVec::repeat(false, self.item_count));
        Ok(())
    }

    /// Attach a declared label to one item.
    pub fn assign(&mut self, name: &str, item: usize) -> Result<(), ModelError> {
        let id = *self
            .index
            .get(name)
            .ok_or_else(|| ModelError::UnknownLabel(name.to_string()))?;
        if item >= self.item_count {
            return Err(ModelError::OutOfRange {
                index: item,
                count: self.item_count,
            });
        }
        self.sets[id].set(item, true);
        Ok(())
    }

    /// Whether a label with this name is declared.
    pub fn has_label(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// The set of items carrying the label, as a bit vector over all items.
    pub fn items_with(&self, name: &str) -> Result<&BitVec, ModelError> {
        let id = *self
            .index
            .get(name)
            .ok_or_else(|| ModelError::UnknownLabel(name.to_string()))?;
        Ok(&self.sets[id])
    }

    /// Whether `item` carries the label. Unknown labels mark nothing.
    pub fn is_marked(&self, name: &str, item: usize) -> bool {
        self.index
            .get(name)
            .is_some_and(|&id| item < self.item_count && self.sets[id][item])
    }

    /// All declared label names, in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|name| name.as_str())
    }
}

/// An explicit-state probabilistic model in sparse row-grouped form.
///
/// The transition matrix has one row group per state. The labeling spans the
/// states; the label `init` marks the initial ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseModel {
    /// The declared class of the model
    pub model_type: ModelType,
    /// Row-grouped transition matrix, one group per state
    pub transitions: SparseMatrix,
    /// State labeling; `init` marks the initial states
    pub labeling: Labeling,
    /// Reward models, addressable by name
    pub reward_models: Vec<RewardModel>,
    /// Exit rate per state, for continuous-time classes
    pub exit_rates: Option<Vec<f64>>,
    /// States whose Markovian row carries rates, for Markov automata
    pub markovian_states: Option<BitVec>,
    /// Observation index per state, when the model is partially observable
    pub observations: Option<Vec<usize>>,
    /// Labeling of the choice rows rather than the states
    pub choice_labeling: Option<Labeling>,
}

impl SparseModel {
    /// Assemble a model from its mandatory parts. The matrix must be square
    /// over states (columns match row groups) and the labeling must span
    /// exactly the states.
    pub fn new(
        model_type: ModelType,
        transitions: SparseMatrix,
        labeling: Labeling,
    ) -> Result<SparseModel, ModelError> {
        let states = transitions.group_count();
        if transitions.column_count() != states {
            return Err(ModelError::DimensionMismatch(format!(
                "transition matrix has {} columns but {states} row groups",
                transitions.column_count()
            )));
        }
        if labeling.item_count() != states {
            return Err(ModelError::DimensionMismatch(format!(
                "labeling spans {} items but the model has {states} states",
                labeling.item_count()
            )));
        }
        Ok(SparseModel {
            model_type,
            transitions,
            labeling,
            reward_models: Vec::new(),
            exit_rates: None,
            markovian_states: None,
            observations: None,
            choice_labeling: None,
        })
    }

    /// The number of states.
    pub fn state_count(&self) -> usize {
        self.transitions.group_count()
    }

    /// The number of choice rows across all states.
    pub fn choice_count(&self) -> usize {
        self.transitions.row_count()
    }

    /// Attach a reward model. Names must be unique.
    pub fn add_reward_model(&mut self, rewards: RewardModel) -> Result<(), ModelError> {
        if self.reward_models.iter().any(|r| r.name == rewards.name) {
            return Err(ModelError::DuplicateLabel(rewards.name.clone()));
        }
        if let Some(state_rewards) = &rewards.state_rewards {
            if state_rewards.len() != self.state_count() {
                return Err(ModelError::DimensionMismatch(format!(
                    "state rewards cover {} states but the model has {}",
                    state_rewards.len(),
                    self.state_count()
                )));
            }
        }
        if let Some(action_rewards) = &rewards.state_action_rewards {
            if action_rewards.len() != self.choice_count() {
                return Err(ModelError::DimensionMismatch(format!(
                    "state-action rewards cover {} choices but the model has {}",
                    action_rewards.len(),
                    self.choice_count()
                )));
            }
        }
        self.reward_models.push(rewards);
        Ok(())
    }

    /// Attach exit rates, one per state.
    pub fn with_exit_rates(mut self, rates: Vec<f64>) -> Result<SparseModel, ModelError> {
        if rates.len() != self.state_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "exit rates cover {} states but the model has {}",
                rates.len(),
                self.state_count()
            )));
        }
        self.exit_rates = Some(rates);
        Ok(self)
    }

    /// Attach the Markovian-state set of a Markov automaton.
    pub fn with_markovian_states(mut self, states: BitVec) -> Result<SparseModel, ModelError> {
        if states.len() != self.state_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "Markovian set covers {} states but the model has {}",
                states.len(),
                self.state_count()
            )));
        }
        self.markovian_states = Some(states);
        Ok(self)
    }

    /// Attach one observation index per state, making the model partially
    /// observable.
    pub fn with_observations(mut self, observations: Vec<usize>) -> Result<SparseModel, ModelError> {
        if observations.len() != self.state_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "observations cover {} states but the model has {}",
                observations.len(),
                self.state_count()
            )));
        }
        self.observations = Some(observations);
        Ok(self)
    }

    /// Attach a labeling of the choice rows.
    pub fn with_choice_labeling(mut self, labeling: Labeling) -> Result<SparseModel, ModelError> {
        if labeling.item_count() != self.choice_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "choice labeling spans {} items but the model has {} choices",
                labeling.item_count(),
                self.choice_count()
            )));
        }
        self.choice_labeling = Some(labeling);
        Ok(self)
    }

    /// The states labeled `init`, in increasing order. Models without the
    /// label have no initial states.
    pub fn initial_states(&self) -> Vec<usize> {
        match self.labeling.items_with("init") {
            Ok(set) => set.iter_ones().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Select a reward model. A name picks that model; no name picks the
    /// model's only one.
    pub fn reward_model(&self, name: Option<&str>) -> Result<&RewardModel, ModelError> {
        match name {
            Some(name) => self
                .reward_models
                .iter()
                .find(|r| r.name == name)
                .ok_or_else(|| ModelError::UnknownRewardModel(name.to_string())),
            None if self.reward_models.len() == 1 => Ok(&self.reward_models[0]),
            None => Err(ModelError::NoUniqueRewardModel(self.reward_models.len())),
        }
    }

    /// Evaluate a propositional formula over the labeling, returning the set
    /// of satisfying states.
    pub fn satisfaction_set(&self, formula: &StateFormula) -> Result<BitVec, ModelError> {
        let mut result = BitVec::repeat(false, self.state_count());
        for state in 0..self.state_count() {
            if self.state_satisfies(formula, state)? {
                result.set(state, true);
            }
        }
        Ok(result)
    }

    fn state_satisfies(&self, formula: &StateFormula, state: usize) -> Result<bool, ModelError> {
        match formula {
            StateFormula::Literal(value) => Ok(*value),
            StateFormula::Label(name) => {
                // require the label to be declared so that typos surface
                self.labeling.items_with(name)?;
                Ok(self.labeling.is_marked(name, state))
            }
            StateFormula::Not(inner) => Ok(!self.state_satisfies(inner, state)?),
            StateFormula::And(conjuncts) => {
                for conjunct in conjuncts {
                    if !self.state_satisfies(conjunct, state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            StateFormula::Or(disjuncts) => {
                for disjunct in disjuncts {
                    if self.state_satisfies(disjunct, state)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            StateFormula::Implies(lhs, rhs) => {
                Ok(!self.state_satisfies(lhs, state)? || self.state_satisfies(rhs, state)?)
            }
            StateFormula::Iff(lhs, rhs) => {
                Ok(self.state_satisfies(lhs, state)? == self.state_satisfies(rhs, state)?)
            }
            _ => Err(ModelError::NotPropositional(printer::state_formula(
                formula,
            ))),
        }
    }
}
