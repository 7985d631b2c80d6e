// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The error type shared by every checking engine.

use thiserror::Error;

use dd::DdError;
use logic::fragment::FragmentViolation;
use logic::task::TaskError;
use models::{ModelError, UnfoldError};
use numeric::NumericError;

/// Everything that can go wrong while checking a property.
///
/// Divergence and cancellation get their own variants because the pipeline
/// reports them as a result status rather than a failure.
#[derive(Error, Debug)]
pub enum CheckError {
    /// The formula falls outside the engine's fragment.
    #[error("{0}")]
    Fragment(#[from] FragmentViolation),
    /// A task field an engine needed was never set.
    #[error("{0}")]
    Task(#[from] TaskError),
    /// The model rejected a query.
    #[error("{0}")]
    Model(#[from] ModelError),
    /// A decision diagram operation failed.
    #[error("{0}")]
    Diagram(#[from] DdError),
    /// The reward-bounded unfolding rejected the formula or the model.
    #[error("{0}")]
    Unfold(#[from] UnfoldError),
    /// An iterative solver exhausted its iteration budget.
    #[error("no convergence within {iterations} iterations")]
    Diverged {
        /// Number of iterations performed before giving up.
        iterations: usize,
    },
    /// The cancellation token was triggered.
    #[error("cancelled")]
    Cancelled,
    /// Any other numeric failure.
    #[error("{0}")]
    Numeric(NumericError),
    /// The formula passed the fragment gate but this engine cannot check it
    /// on this model.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<NumericError> for CheckError {
    fn from(error: NumericError) -> Self {
        match error {
            NumericError::Diverged { iterations } => CheckError::Diverged { iterations },
            NumericError::Cancelled => CheckError::Cancelled,
            other => CheckError::Numeric(other),
        }
    }
}

impl CheckError {
    /// Shorthand for [`CheckError::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        CheckError::Unsupported(message.into())
    }
}
