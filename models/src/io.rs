// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Reading explicit-state models from their text representation.
//!
//! A model arrives as up to five files: transitions, state labeling, and
//! optionally state rewards, transition rewards, and choice labeling. The
//! transitions file opens with a model-class token (`DTMC`, `CTMC`, `MDP`,
//! `MA`, case-insensitive) and lists one transition per line, sorted by
//! source state and choice. Every parse error carries the 1-based line and
//! column where it was noticed.

use bitvec::prelude::*;
use numeric::{SparseMatrix, SparseMatrixBuilder};
use thiserror::Error;

use crate::model::{Labeling, ModelError, ModelType, SparseModel};
use crate::rewards::RewardModel;

/// Errors raised while reading model files.
#[derive(Error, Debug, PartialEq)]
pub enum FormatError {
    /// The file deviates from the format at the given position.
    #[error("line {line}, column {column}: {message}")]
    WrongFormat {
        /// 1-based line of the offending token
        line: usize,
        /// 1-based column of the offending token
        column: usize,
        /// What went wrong
        message: String,
    },
    /// The labeling marks no state as initial.
    #[error("the labeling marks no state as init")]
    NoInitialState,
    /// The files parsed individually but do not assemble into a model.
    #[error("{0}")]
    Model(#[from] ModelError),
}

fn wrong_format(line: usize, column: usize, message: impl Into<String>) -> FormatError {
    FormatError::WrongFormat {
        line,
        column,
        message: message.into(),
    }
}

/// The non-blank lines of a file, keeping their 1-based numbers.
fn numbered_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(offset, line)| (offset + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect()
}

/// Whitespace-separated tokens of a line, each with the 1-based column where
/// it starts.
fn tokens_with_columns(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut token_start = None;
    for (offset, character) in line.char_indices() {
        if character.is_whitespace() {
            if let Some(start) = token_start.take() {
                tokens.push((start + 1, &line[start..offset]));
            }
        } else if token_start.is_none() {
            token_start = Some(offset);
        }
    }
    if let Some(start) = token_start {
        tokens.push((start + 1, &line[start..]));
    }
    tokens
}

fn parse_index(line: usize, column: usize, token: &str, what: &str) -> Result<usize, FormatError> {
    token.parse().map_err(|_| {
        wrong_format(line, column, format!("expected {what}, found {token:?}"))
    })
}

fn parse_float(line: usize, column: usize, token: &str) -> Result<f64, FormatError> {
    let value: f64 = token.parse().map_err(|_| {
        wrong_format(
            line,
            column,
            format!("expected a numeric value, found {token:?}"),
        )
    })?;
    if !value.is_finite() {
        return Err(wrong_format(line, column, format!("value {token} is not finite")));
    }
    Ok(value)
}

/// Read the model class from the header token of a transitions file.
pub fn parse_model_type(content: &str) -> Result<ModelType, FormatError> {
    let lines = numbered_lines(content);
    let Some(&(number, text)) = lines.first() else {
        return Err(wrong_format(1, 1, "the transitions file is empty"));
    };
    let (column, token) = tokens_with_columns(text)[0];
    ModelType::from_header_token(token).ok_or_else(|| {
        wrong_format(number, column, format!("unknown model class {token:?}"))
    })
}

/// The parts read from a transitions file.
#[derive(Debug)]
pub struct ParsedTransitions {
    /// The declared model class
    pub model_type: ModelType,
    /// Row-grouped transition matrix, one group per state
    pub matrix: SparseMatrix,
    /// Exit rate per state, for continuous-time classes
    pub exit_rates: Option<Vec<f64>>,
    /// States with a Markovian choice, for Markov automata
    pub markovian_states: Option<BitVec>,
}

/// Read a transitions file.
///
/// Deterministic classes use `src dst value` lines, nondeterministic ones
/// `src choice dst value`. Markov automata mark the entries of a Markovian
/// choice with a `!` suffix on the choice token; the exit rate of a state is
/// the sum of its Markovian row, and of its only row for CTMCs. Optional
/// `STATES n` and `TRANSITIONS m` hint lines may precede the transitions and
/// are checked against the actual counts.
pub fn parse_transitions(content: &str) -> Result<ParsedTransitions, FormatError> {
    let lines = numbered_lines(content);
    let Some(&(header_line, header_text)) = lines.first() else {
        return Err(wrong_format(1, 1, "the transitions file is empty"));
    };
    let header = tokens_with_columns(header_text);
    let (header_column, header_token) = header[0];
    let model_type = ModelType::from_header_token(header_token).ok_or_else(|| {
        wrong_format(
            header_line,
            header_column,
            format!("unknown model class {header_token:?}"),
        )
    })?;
    if let Some(&(column, token)) = header.get(1) {
        return Err(wrong_format(
            header_line,
            column,
            format!("unexpected token {token:?} after the model class"),
        ));
    }

    let nondeterministic = model_type.is_nondeterministic();
    let mut builder = SparseMatrixBuilder::new();
    // hints are remembered as (line, column, count) for later reporting
    let mut state_hint: Option<(usize, usize, usize)> = None;
    let mut transition_hint: Option<(usize, usize, usize)> = None;
    let mut current: Option<(usize, usize)> = None;
    let mut row = 0;
    let mut row_is_markovian = false;
    let mut last_dst: Option<usize> = None;
    let mut highest_dst: Option<(usize, usize, usize)> = None;
    let mut entry_count = 0;
    let mut exit_rates: Vec<f64> = Vec::new();
    let mut markovian: Vec<bool> = Vec::new();

    for &(number, text) in &lines[1..] {
        let tokens = tokens_with_columns(text);
        let (first_column, first_token) = tokens[0];

        if current.is_none() && (first_token == "STATES" || first_token == "TRANSITIONS") {
            if tokens.len() != 2 {
                return Err(wrong_format(
                    number,
                    first_column,
                    format!("expected a single count after {first_token}"),
                ));
            }
            let (column, token) = tokens[1];
            let count = parse_index(number, column, token, "a count")?;
            let slot = if first_token == "STATES" {
                &mut state_hint
            } else {
                &mut transition_hint
            };
            if slot.is_some() {
                return Err(wrong_format(
                    number,
                    first_column,
                    format!("the {first_token} hint is given twice"),
                ));
            }
            *slot = Some((number, column, count));
            continue;
        }

        let expected = if nondeterministic { 4 } else { 3 };
        if tokens.len() != expected {
            return Err(match tokens.get(expected) {
                Some(&(column, token)) => {
                    wrong_format(number, column, format!("unexpected token {token:?}"))
                }
                None => wrong_format(
                    number,
                    first_column,
                    format!("expected {expected} fields on a transition line"),
                ),
            });
        }

        let src = parse_index(number, first_column, first_token, "a state index")?;
        let (choice_column, choice, markovian_marker) = if nondeterministic {
            let (column, token) = tokens[1];
            let (stripped, marker) = match token.strip_suffix('!') {
                Some(stripped) => (stripped, true),
                None => (token, false),
            };
            if marker && model_type != ModelType::Ma {
                return Err(wrong_format(
                    number,
                    column,
                    "the Markovian marker is only allowed in Markov automata",
                ));
            }
            (column, parse_index(number, column, stripped, "a choice index")?, marker)
        } else {
            (first_column, 0, false)
        };
        let (dst_column, dst_token) = tokens[expected - 2];
        let dst = parse_index(number, dst_column, dst_token, "a state index")?;
        let (value_column, value_token) = tokens[expected - 1];
        let value = parse_float(number, value_column, value_token)?;
        if value <= 0.0 {
            return Err(wrong_format(
                number,
                value_column,
                format!("transition value {value_token} must be positive"),
            ));
        }

        // place the entry relative to the previous one
        let (new_state, new_row) = match current {
            None => {
                if src != 0 {
                    return Err(wrong_format(number, first_column, "state 0 has no transitions"));
                }
                (true, true)
            }
            Some((previous_src, previous_choice)) => {
                if src < previous_src {
                    return Err(wrong_format(
                        number,
                        first_column,
                        "transitions are not sorted by source state",
                    ));
                }
                if src > previous_src + 1 {
                    return Err(wrong_format(
                        number,
                        first_column,
                        format!("state {} has no transitions", previous_src + 1),
                    ));
                }
                if src == previous_src {
                    if choice < previous_choice {
                        return Err(wrong_format(
                            number,
                            choice_column,
                            format!("choices of state {src} are not sorted"),
                        ));
                    }
                    if choice > previous_choice + 1 {
                        return Err(wrong_format(
                            number,
                            choice_column,
                            format!("state {src} skips choice {}", previous_choice + 1),
                        ));
                    }
                    (false, choice != previous_choice)
                } else {
                    (true, true)
                }
            }
        };

        if new_state {
            if choice != 0 {
                return Err(wrong_format(
                    number,
                    choice_column,
                    format!("choices of state {src} must start at 0"),
                ));
            }
            exit_rates.push(0.0);
            markovian.push(false);
        }
        if new_row {
            if current.is_some() {
                row += 1;
            }
            if nondeterministic && new_state {
                builder
                    .new_row_group(row)
                    .map_err(|error| wrong_format(number, first_column, error.to_string()))?;
            }
            row_is_markovian = markovian_marker;
            if markovian_marker {
                if markovian[src] {
                    return Err(wrong_format(
                        number,
                        choice_column,
                        format!("state {src} has more than one Markovian choice"),
                    ));
                }
                markovian[src] = true;
            }
            last_dst = None;
        } else if markovian_marker != row_is_markovian {
            return Err(wrong_format(
                number,
                choice_column,
                "the Markovian marker must appear on every transition of a choice",
            ));
        }

        if let Some(previous_dst) = last_dst {
            if dst == previous_dst {
                return Err(wrong_format(
                    number,
                    dst_column,
                    format!("duplicate transition from state {src} to state {dst}"),
                ));
            }
            if dst < previous_dst {
                return Err(wrong_format(
                    number,
                    dst_column,
                    format!("transitions of state {src} are not sorted by destination"),
                ));
            }
        }
        last_dst = Some(dst);
        if highest_dst.map_or(true, |(previous, _, _)| dst > previous) {
            highest_dst = Some((dst, number, dst_column));
        }

        match model_type {
            ModelType::Ctmc => exit_rates[src] += value,
            ModelType::Ma if row_is_markovian => exit_rates[src] += value,
            _ => {}
        }

        builder
            .add_next_value(row, dst, value)
            .map_err(|error| wrong_format(number, dst_column, error.to_string()))?;
        entry_count += 1;
        current = Some((src, choice));
    }

    let Some((last_src, _)) = current else {
        return Err(wrong_format(
            header_line,
            header_column,
            "the transitions file declares no transitions",
        ));
    };
    let states = last_src + 1;
    if let Some((dst, number, column)) = highest_dst {
        if dst >= states {
            return Err(wrong_format(
                number,
                column,
                format!("state {dst} has no transitions"),
            ));
        }
    }
    if let Some((number, column, count)) = state_hint {
        if count != states {
            return Err(wrong_format(
                number,
                column,
                format!("the file declares {count} states but {states} are present"),
            ));
        }
    }
    if let Some((number, column, count)) = transition_hint {
        if count != entry_count {
            return Err(wrong_format(
                number,
                column,
                format!("the file declares {count} transitions but {entry_count} are present"),
            ));
        }
    }
    let matrix = builder
        .build(None, Some(states))
        .map_err(|error| wrong_format(header_line, header_column, error.to_string()))?;
    let (exit_rates, markovian_states) = match model_type {
        ModelType::Ctmc => (Some(exit_rates), None),
        ModelType::Ma => (Some(exit_rates), Some(markovian.into_iter().collect())),
        _ => (None, None),
    };
    Ok(ParsedTransitions {
        model_type,
        matrix,
        exit_rates,
        markovian_states,
    })
}

/// Read the `#DECLARATION lab1 lab2 … #END` block opening a labeling file.
/// Returns the labeling with all labels declared and the index of the first
/// assignment line.
fn parse_label_declarations(
    lines: &[(usize, &str)],
    item_count: usize,
) -> Result<(Labeling, usize), FormatError> {
    let mut labeling = Labeling::new(item_count);
    if lines.is_empty() {
        return Err(wrong_format(1, 1, "the labeling file is empty"));
    }
    let mut declared = false;
    for (index, &(number, text)) in lines.iter().enumerate() {
        let tokens = tokens_with_columns(text);
        for (position, &(column, token)) in tokens.iter().enumerate() {
            if !declared {
                if token != "#DECLARATION" {
                    return Err(wrong_format(
                        number,
                        column,
                        format!("expected #DECLARATION, found {token:?}"),
                    ));
                }
                declared = true;
            } else if token == "#END" {
                if let Some(&(column, extra)) = tokens.get(position + 1) {
                    return Err(wrong_format(
                        number,
                        column,
                        format!("unexpected token {extra:?} after #END"),
                    ));
                }
                return Ok((labeling, index + 1));
            } else {
                labeling.add_label(token).map_err(|_| {
                    wrong_format(number, column, format!("label {token:?} is declared twice"))
                })?;
            }
        }
    }
    let (number, text) = lines[lines.len() - 1];
    Err(wrong_format(
        number,
        text.len().max(1),
        "the declaration is never closed with #END",
    ))
}

/// Read a state-labeling file: the declaration block, then `state lab…`
/// assignment lines.
pub fn parse_labeling(content: &str, state_count: usize) -> Result<Labeling, FormatError> {
    let lines = numbered_lines(content);
    let (mut labeling, first_assignment) = parse_label_declarations(&lines, state_count)?;
    for &(number, text) in &lines[first_assignment..] {
        let tokens = tokens_with_columns(text);
        let (column, token) = tokens[0];
        let state = parse_index(number, column, token, "a state index")?;
        if state >= state_count {
            return Err(wrong_format(
                number,
                column,
                format!("state {state} is out of range for {state_count} states"),
            ));
        }
        for &(column, name) in &tokens[1..] {
            if !labeling.has_label(name) {
                return Err(wrong_format(
                    number,
                    column,
                    format!("label {name:?} is not declared"),
                ));
            }
            labeling
                .assign(name, state)
                .map_err(|error| wrong_format(number, column, error.to_string()))?;
        }
    }
    Ok(labeling)
}

/// Read a state-rewards file of `state value` lines. States without a line
/// earn zero.
pub fn parse_state_rewards(content: &str, state_count: usize) -> Result<Vec<f64>, FormatError> {
    let mut rewards = vec![0.0; state_count];
    let mut seen: BitVec = BitVec::repeat(false, state_count);
    for (number, text) in numbered_lines(content) {
        let tokens = tokens_with_columns(text);
        let (column, token) = tokens[0];
        if tokens.len() < 2 {
            return Err(wrong_format(number, column, "expected a state index and a value"));
        }
        if let Some(&(column, token)) = tokens.get(2) {
            return Err(wrong_format(number, column, format!("unexpected token {token:?}")));
        }
        let state = parse_index(number, column, token, "a state index")?;
        if state >= state_count {
            return Err(wrong_format(
                number,
                column,
                format!("state {state} is out of range for {state_count} states"),
            ));
        }
        let (value_column, value_token) = tokens[1];
        let value = parse_float(number, value_column, value_token)?;
        if seen[state] {
            return Err(wrong_format(
                number,
                column,
                format!("state {state} already has a reward"),
            ));
        }
        seen.set(state, true);
        rewards[state] = value;
    }
    Ok(rewards)
}

/// Read a transition-rewards file. Entries use the same line shape and
/// sorting as the transitions file, without the header, and every entry must
/// name an existing transition. The result shares the transition matrix's
/// row grouping.
pub fn parse_transition_rewards(
    content: &str,
    transitions: &SparseMatrix,
    nondeterministic: bool,
) -> Result<SparseMatrix, FormatError> {
    let mut builder = SparseMatrixBuilder::new();
    if nondeterministic {
        for group in transitions.groups() {
            builder
                .new_row_group(group.start)
                .map_err(|error| wrong_format(1, 1, error.to_string()))?;
        }
    }
    let states = transitions.group_count();
    let mut last: Option<(usize, usize)> = None;
    for (number, text) in numbered_lines(content) {
        let tokens = tokens_with_columns(text);
        let (first_column, first_token) = tokens[0];
        let expected = if nondeterministic { 4 } else { 3 };
        if tokens.len() != expected {
            return Err(match tokens.get(expected) {
                Some(&(column, token)) => {
                    wrong_format(number, column, format!("unexpected token {token:?}"))
                }
                None => wrong_format(
                    number,
                    first_column,
                    format!("expected {expected} fields on a transition-reward line"),
                ),
            });
        }
        let src = parse_index(number, first_column, first_token, "a state index")?;
        if src >= states {
            return Err(wrong_format(
                number,
                first_column,
                format!("state {src} is out of range for {states} states"),
            ));
        }
        let row = if nondeterministic {
            let (column, token) = tokens[1];
            let choice = parse_index(number, column, token, "a choice index")?;
            let group = transitions.group(src);
            if choice >= group.len() {
                return Err(wrong_format(
                    number,
                    column,
                    format!("state {src} has no choice {choice}"),
                ));
            }
            group.start + choice
        } else {
            src
        };
        let (dst_column, dst_token) = tokens[expected - 2];
        let dst = parse_index(number, dst_column, dst_token, "a state index")?;
        if !transitions.row(row).iter().any(|&(column, _)| column == dst) {
            return Err(wrong_format(
                number,
                dst_column,
                format!("there is no transition from state {src} to state {dst}"),
            ));
        }
        let (value_column, value_token) = tokens[expected - 1];
        let value = parse_float(number, value_column, value_token)?;
        if let Some(previous) = last {
            if (row, dst) == previous {
                return Err(wrong_format(
                    number,
                    dst_column,
                    format!("the transition from state {src} to state {dst} already has a reward"),
                ));
            }
            if (row, dst) < previous {
                return Err(wrong_format(
                    number,
                    first_column,
                    "transition rewards are not sorted like the transitions",
                ));
            }
        }
        last = Some((row, dst));
        builder
            .add_next_value(row, dst, value)
            .map_err(|error| wrong_format(number, dst_column, error.to_string()))?;
    }
    builder
        .build(Some(transitions.row_count()), Some(transitions.column_count()))
        .map_err(|error| wrong_format(1, 1, error.to_string()))
}

/// Read a choice-labeling file: the declaration block, then `state choice
/// lab…` assignment lines for nondeterministic models and `state lab…` for
/// deterministic ones.
pub fn parse_choice_labeling(
    content: &str,
    transitions: &SparseMatrix,
    nondeterministic: bool,
) -> Result<Labeling, FormatError> {
    let lines = numbered_lines(content);
    let (mut labeling, first_assignment) =
        parse_label_declarations(&lines, transitions.row_count())?;
    let states = transitions.group_count();
    for &(number, text) in &lines[first_assignment..] {
        let tokens = tokens_with_columns(text);
        let (column, token) = tokens[0];
        let state = parse_index(number, column, token, "a state index")?;
        if state >= states {
            return Err(wrong_format(
                number,
                column,
                format!("state {state} is out of range for {states} states"),
            ));
        }
        let (row, labels_from) = if nondeterministic {
            let Some(&(choice_column, choice_token)) = tokens.get(1) else {
                return Err(wrong_format(number, column, "expected a choice index after the state"));
            };
            let choice = parse_index(number, choice_column, choice_token, "a choice index")?;
            let group = transitions.group(state);
            if choice >= group.len() {
                return Err(wrong_format(
                    number,
                    choice_column,
                    format!("state {state} has no choice {choice}"),
                ));
            }
            (group.start + choice, 2)
        } else {
            (state, 1)
        };
        for &(column, name) in &tokens[labels_from..] {
            if !labeling.has_label(name) {
                return Err(wrong_format(
                    number,
                    column,
                    format!("label {name:?} is not declared"),
                ));
            }
            labeling
                .assign(name, row)
                .map_err(|error| wrong_format(number, column, error.to_string()))?;
        }
    }
    Ok(labeling)
}

/// Assemble a model from its files. The labeling must mark at least one
/// state as `init`; reward files feed a single unnamed reward model.
pub fn parse_model(
    transitions: &str,
    labeling: &str,
    state_rewards: Option<&str>,
    transition_rewards: Option<&str>,
    choice_labeling: Option<&str>,
) -> Result<SparseModel, FormatError> {
    let parsed = parse_transitions(transitions)?;
    let nondeterministic = parsed.model_type.is_nondeterministic();
    let state_labeling = parse_labeling(labeling, parsed.matrix.group_count())?;
    let no_initial = match state_labeling.items_with("init") {
        Ok(set) => set.not_any(),
        Err(_) => true,
    };
    if no_initial {
        return Err(FormatError::NoInitialState);
    }

    let mut model = SparseModel::new(parsed.model_type, parsed.matrix, state_labeling)?;
    if let Some(rates) = parsed.exit_rates {
        model = model.with_exit_rates(rates)?;
    }
    if let Some(markovian) = parsed.markovian_states {
        model = model.with_markovian_states(markovian)?;
    }
    if state_rewards.is_some() || transition_rewards.is_some() {
        let mut rewards = RewardModel::new("");
        if let Some(content) = state_rewards {
            rewards = rewards.with_state_rewards(parse_state_rewards(content, model.state_count())?);
        }
        if let Some(content) = transition_rewards {
            let matrix = parse_transition_rewards(content, &model.transitions, nondeterministic)?;
            rewards = rewards.with_transition_rewards(matrix);
        }
        model.add_reward_model(rewards)?;
    }
    if let Some(content) = choice_labeling {
        let labels = parse_choice_labeling(content, &model.transitions, nondeterministic)?;
        model = model.with_choice_labeling(labels)?;
    }
    Ok(model)
}
