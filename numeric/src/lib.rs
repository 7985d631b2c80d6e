// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Sparse row-grouped matrices and the iterative solvers built on them.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cancel;
pub mod linear;
pub mod lp;
pub mod minmax;
pub mod sparse;

pub use cancel::CancelToken;
pub use linear::ConvergenceCriterion;
pub use minmax::{MinMaxSettings, MinMaxSolution, MinMaxSolver, SolutionMethod};
pub use sparse::{NumericError, OptimizationDirection, SparseMatrix, SparseMatrixBuilder};
