// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Driving the engines over parsed property lists.
//!
//! The pipeline gates each formula against the chosen engine's fragment,
//! prepares the check task, runs the engine, and condenses the per-state
//! values into verdicts at the initial states. A property that an engine
//! cannot handle is reported as rejected rather than failing the whole run.

use serde::Serialize;

use logic::syntax::Property;
use logic::task::CheckTask;
use models::SparseModel;
use numeric::MinMaxSettings;

use crate::error::CheckError;
use crate::sparse::QuantitativeResult;
use crate::{sparse, symbolic};

/// The engine a check runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Work directly on the explicit transition matrix
    #[default]
    Sparse,
    /// Symbolic qualitative analysis with explicit quantitative solves
    Symbolic,
}

/// Configuration of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    /// The engine to dispatch to.
    pub engine: Engine,
    /// Solver configuration shared by all equation solves.
    pub minmax: MinMaxSettings,
    /// Ask for an optimizing scheduler on nondeterministic models.
    pub produce_schedulers: bool,
}

/// The value and verdict of one initial state.
#[derive(Debug, Clone, Serialize)]
pub struct StateVerdict {
    /// The state index.
    pub state: usize,
    /// The computed probability or expected reward.
    pub value: f64,
    /// The comparison against the operator bound, when the property has one.
    pub holds: Option<bool>,
}

/// How checking one property ended.
#[derive(Debug, Clone, Serialize)]
pub enum PropertyStatus {
    /// The property was checked; the verdicts are valid.
    Checked,
    /// The solver did not converge within its iteration budget.
    Diverged {
        /// Number of iterations performed before giving up.
        iterations: usize,
    },
    /// The run was cancelled from the outside.
    Cancelled,
    /// The engine does not handle this property on this model.
    Rejected {
        /// Human-readable explanation.
        reason: String,
    },
    /// Checking failed with an error.
    Failed {
        /// Human-readable explanation.
        reason: String,
    },
}

/// The outcome of checking one property.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyReport {
    /// The property's name, if the source gave one.
    pub name: Option<String>,
    /// The property as written in the source.
    pub description: String,
    /// How the check ended.
    pub status: PropertyStatus,
    /// One verdict per initial state; empty unless the status is `Checked`.
    pub verdicts: Vec<StateVerdict>,
    /// The optimizing choice per state, when one was requested and computed.
    pub scheduler: Option<Vec<usize>>,
}

impl PropertyReport {
    fn aborted(property: &Property, status: PropertyStatus) -> PropertyReport {
        PropertyReport {
            name: property.name.clone(),
            description: property.description.clone(),
            status,
            verdicts: Vec::new(),
            scheduler: None,
        }
    }
}

/// Check one property against the model.
pub fn check_property(
    model: &SparseModel,
    property: &Property,
    settings: &CheckSettings,
) -> PropertyReport {
    let fragment = match settings.engine {
        Engine::Sparse => sparse::fragment(model.model_type),
        Engine::Symbolic => symbolic::fragment(),
    };
    if let Err(violation) = fragment.check(&property.formula) {
        return PropertyReport::aborted(
            property,
            PropertyStatus::Rejected {
                reason: violation.to_string(),
            },
        );
    }

    let task = CheckTask::new(property.formula.clone())
        .with_only_initial_states_relevant(true)
        .with_produce_schedulers(settings.produce_schedulers);

    let outcome = match settings.engine {
        Engine::Sparse => sparse::check(model, &task, &settings.minmax),
        Engine::Symbolic => symbolic::check(model, &task, &settings.minmax),
    };
    let result = match outcome {
        Ok(result) => result,
        Err(error) => return PropertyReport::aborted(property, status_of(error)),
    };

    PropertyReport {
        name: property.name.clone(),
        description: property.description.clone(),
        status: PropertyStatus::Checked,
        verdicts: verdicts(model, &task, &result),
        scheduler: result.scheduler,
    }
}

/// Check a list of properties, one report per property. Engine errors are
/// contained in the individual reports.
pub fn check_properties(
    model: &SparseModel,
    properties: &[Property],
    settings: &CheckSettings,
) -> Vec<PropertyReport> {
    properties
        .iter()
        .map(|property| check_property(model, property, settings))
        .collect()
}

fn status_of(error: CheckError) -> PropertyStatus {
    match error {
        CheckError::Diverged { iterations } => PropertyStatus::Diverged { iterations },
        CheckError::Cancelled => PropertyStatus::Cancelled,
        CheckError::Unsupported(reason) => PropertyStatus::Rejected { reason },
        other => PropertyStatus::Failed {
            reason: other.to_string(),
        },
    }
}

fn verdicts(
    model: &SparseModel,
    task: &CheckTask,
    result: &QuantitativeResult,
) -> Vec<StateVerdict> {
    let bound = task.bound().ok();
    model
        .initial_states()
        .into_iter()
        .map(|state| {
            let value = result.values[state];
            StateVerdict {
                state,
                value,
                holds: bound.map(|bound| bound.check(value)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use logic::parser::parse_properties;
    use models::{Labeling, ModelType};
    use numeric::SparseMatrixBuilder;

    fn coin_mdp() -> SparseModel {
        let mut builder = SparseMatrixBuilder::new();
        builder.new_row_group(0).unwrap();
        builder.add_next_value(0, 0, 0.9).unwrap();
        builder.add_next_value(0, 1, 0.099).unwrap();
        builder.add_next_value(0, 2, 0.001).unwrap();
        builder.add_next_value(1, 1, 0.5).unwrap();
        builder.add_next_value(1, 2, 0.5).unwrap();
        builder.new_row_group(2).unwrap();
        builder.add_next_value(2, 1, 1.0).unwrap();
        builder.new_row_group(3).unwrap();
        builder.add_next_value(3, 2, 1.0).unwrap();
        let matrix = builder.build(None, None).unwrap();
        let mut labeling = Labeling::new(3);
        labeling.add_label("init").unwrap();
        labeling.add_label("one").unwrap();
        labeling.assign("init", 0).unwrap();
        labeling.assign("one", 1).unwrap();
        SparseModel::new(ModelType::Mdp, matrix, labeling).unwrap()
    }

    #[test]
    fn test_reports_values_and_bounds() {
        let model = coin_mdp();
        let properties = parse_properties(
            "\"min\": Pmin=? [ F \"one\" ]\nPmax>=0.9 [ F \"one\" ]\n",
        )
        .unwrap();
        let reports = check_properties(&model, &properties, &CheckSettings::default());

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].status, PropertyStatus::Checked));
        assert_eq!(reports[0].name.as_deref(), Some("min"));
        assert!((reports[0].verdicts[0].value - 0.5).abs() < 1e-6);
        assert_eq!(reports[0].verdicts[0].holds, None);

        assert!((reports[1].verdicts[0].value - 0.99).abs() < 1e-6);
        assert_eq!(reports[1].verdicts[0].holds, Some(true));
    }

    #[test]
    fn test_rejects_outside_fragment() {
        let model = coin_mdp();
        let properties = parse_properties("LRAmax=? [ \"one\" ]\n").unwrap();
        let reports = check_properties(&model, &properties, &CheckSettings::default());
        assert!(matches!(
            reports[0].status,
            PropertyStatus::Rejected { .. }
        ));
    }

    #[test]
    fn test_symbolic_engine_gates_nondeterminism() {
        let model = coin_mdp();
        let properties = parse_properties("Pmax=? [ F \"one\" ]\n").unwrap();
        let settings = CheckSettings {
            engine: Engine::Symbolic,
            ..CheckSettings::default()
        };
        let reports = check_properties(&model, &properties, &settings);
        assert!(matches!(
            reports[0].status,
            PropertyStatus::Rejected { .. }
        ));
    }

    #[test]
    fn test_diverged_status() {
        let model = coin_mdp();
        let properties = parse_properties("Pmax=? [ F \"one\" ]\n").unwrap();
        let settings = CheckSettings {
            minmax: MinMaxSettings {
                max_iterations: 2,
                precision: 1e-12,
                ..MinMaxSettings::default()
            },
            ..CheckSettings::default()
        };
        let reports = check_properties(&model, &properties, &settings);
        assert!(matches!(
            reports[0].status,
            PropertyStatus::Diverged { iterations: 2 }
        ));
    }

    #[test]
    fn test_scheduler_in_report() {
        let model = coin_mdp();
        let properties = parse_properties("Pmin=? [ F \"one\" ]\n").unwrap();
        let settings = CheckSettings {
            produce_schedulers: true,
            ..CheckSettings::default()
        };
        let reports = check_properties(&model, &properties, &settings);
        let scheduler = reports[0].scheduler.as_ref().unwrap();
        assert_eq!(scheduler[0], 1);
    }
}
