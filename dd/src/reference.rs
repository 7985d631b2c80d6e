// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Signed node handles with complement edges.

use std::fmt::{Debug, Display, Formatter};
use std::ops::Neg;

use crate::table::HashKey;

/// A handle to a node held by a [`DdManager`](crate::manager::DdManager).
///
/// The handle is a non-zero integer whose magnitude is the index of a node in
/// the manager's storage. A negative handle denotes the complement of the
/// function rooted at that node; the two share all nodes. Complements are only
/// produced for Boolean diagrams. Handles from different managers must not be
/// mixed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref(i32);

impl Ref {
    pub(crate) const fn new(value: i32) -> Self {
        debug_assert!(value != 0);
        Ref(value)
    }

    pub(crate) fn positive(index: usize) -> Self {
        debug_assert!(index > 0);
        Ref(index as i32)
    }

    /// The storage index of the referenced node, ignoring the complement bit.
    pub fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// Whether this handle carries the complement bit.
    pub fn is_negated(self) -> bool {
        self.0 < 0
    }

    /// The same node without the complement bit.
    pub fn regular(self) -> Ref {
        Ref(self.0.abs())
    }

    pub(crate) fn inner(self) -> i32 {
        self.0
    }
}

impl Neg for Ref {
    type Output = Ref;

    fn neg(self) -> Self::Output {
        Ref(-self.0)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_negated() {
            write!(f, "~@{}", self.index())
        } else {
            write!(f, "@{}", self.index())
        }
    }
}

impl Debug for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl HashKey for Ref {
    fn hash_key(&self) -> u64 {
        let x = self.0 as i64;
        // fold the sign into the low bit to keep small handles dense
        ((x << 1) ^ (x >> 63)) as u64
    }
}
