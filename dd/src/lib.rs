// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A decision-diagram engine with complement-edged binary decision diagrams
//! and multi-terminal diagrams over interned constant leaves.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]

pub mod boolean;
pub mod manager;
pub mod mtbdd;
pub mod odd;
pub mod reference;
pub mod reorder;
pub mod table;
pub mod value;

pub use manager::{DdError, DdManager, Metavariable, Variable, VariablePair};
pub use reference::Ref;
pub use value::{Value, ValueKind};
