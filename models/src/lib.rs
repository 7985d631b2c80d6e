// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Explicit-state probabilistic models, the text format they are read from,
//! and the reward-bounded unfolding of partially observable models.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod io;
pub mod model;
pub mod rewards;
pub mod unfold;

pub use io::{parse_model, parse_transitions, FormatError};
pub use model::{Labeling, ModelError, ModelType, SparseModel};
pub use rewards::RewardModel;
pub use unfold::{unfold, ObservationMode, UnfoldError, UnfoldedPomdp};
