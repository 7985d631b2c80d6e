// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Named reward structures attached to a model.

use numeric::SparseMatrix;

/// A named reward structure. Any of its three parts may be present: rewards
/// earned by visiting a state, by taking a choice row, or by crossing an
/// individual transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardModel {
    /// The name the formula language selects this model by
    pub name: String,
    /// Reward per state
    pub state_rewards: Option<Vec<f64>>,
    /// Reward per choice row, indexed like the transition matrix rows
    pub state_action_rewards: Option<Vec<f64>>,
    /// Reward per transition, sharing the transition matrix structure
    pub transition_rewards: Option<SparseMatrix>,
}

impl RewardModel {
    /// An empty reward model with the given name.
    pub fn new(name: &str) -> RewardModel {
        RewardModel {
            name: name.to_string(),
            state_rewards: None,
            state_action_rewards: None,
            transition_rewards: None,
        }
    }

    /// Attach a reward per state.
    pub fn with_state_rewards(mut self, rewards: Vec<f64>) -> RewardModel {
        self.state_rewards = Some(rewards);
        self
    }

    /// Attach a reward per choice row.
    pub fn with_state_action_rewards(mut self, rewards: Vec<f64>) -> RewardModel {
        self.state_action_rewards = Some(rewards);
        self
    }

    /// Attach a reward per transition.
    pub fn with_transition_rewards(mut self, rewards: SparseMatrix) -> RewardModel {
        self.transition_rewards = Some(rewards);
        self
    }

    /// Whether per-transition rewards are present.
    pub fn has_transition_rewards(&self) -> bool {
        self.transition_rewards.is_some()
    }

    /// The reward for visiting `state`; absent parts contribute zero.
    pub fn state_reward(&self, state: usize) -> f64 {
        self.state_rewards
            .as_ref()
            .map_or(0.0, |rewards| rewards[state])
    }

    /// The reward for taking the choice `row` out of `state`: the state part
    /// plus the state-action part, with absent parts contributing zero.
    pub fn choice_reward(&self, state: usize, row: usize) -> f64 {
        let action = self
            .state_action_rewards
            .as_ref()
            .map_or(0.0, |rewards| rewards[row]);
        self.state_reward(state) + action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_parts_contribute_zero() {
        let rewards = RewardModel::new("steps");
        assert_eq!(rewards.state_reward(5), 0.0);
        assert_eq!(rewards.choice_reward(5, 12), 0.0);
        assert!(!rewards.has_transition_rewards());
    }

    #[test]
    fn choice_reward_sums_state_and_action_parts() {
        let rewards = RewardModel::new("energy")
            .with_state_rewards(vec![1.0, 2.0])
            .with_state_action_rewards(vec![0.5, 0.0, 4.0]);
        assert_eq!(rewards.state_reward(1), 2.0);
        assert_eq!(rewards.choice_reward(0, 0), 1.5);
        assert_eq!(rewards.choice_reward(1, 2), 6.0);
    }
}
