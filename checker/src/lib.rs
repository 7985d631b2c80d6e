// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The model-checking engines and the pipeline that drives them.
//!
//! Checking a property runs in three stages: the pipeline gates the formula
//! against the chosen engine's fragment, the engine computes a value per
//! state, and the pipeline evaluates the operator bound at the initial
//! states. Two engines exist: a sparse engine working directly on the
//! explicit transition matrix, and a symbolic engine that runs its
//! qualitative analyses on decision diagrams and drops to the explicit
//! solvers for the quantitative remainder.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod lra;
pub mod pipeline;
pub mod prob01;
pub mod sparse;
pub mod symbolic;
pub mod timing;

pub use error::CheckError;
pub use pipeline::{
    check_properties, check_property, CheckSettings, Engine, PropertyReport, PropertyStatus,
};
pub use sparse::QuantitativeResult;
