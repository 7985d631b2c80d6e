// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Boolean kernels: if-then-else, quantification, relational products, and
//! structural queries.
//!
//! All recursion bottoms out through the operation cache and the canonical
//! node constructor, so equal subproblems are solved once. Complement edges
//! make negation free; the if-then-else kernel normalizes its triple so that
//! complements and argument order never hide a cache hit.

use fxhash::FxHashMap;
use itertools::Itertools;

use crate::manager::{opcode, DdError, DdManager, OpKey, Variable, VariablePair};
use crate::reference::Ref;

/// Which side of a relational product is quantified away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantified {
    Rows,
    Columns,
}

impl DdManager {
    // ---------------------------------------------------------------------
    // if-then-else and its instances

    /// `if f then g else h`, the universal Boolean connective.
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        self.collect_if_needed(&[f, g, h]);
        self.ite_rec(f, g, h)
    }

    pub(crate) fn ite_rec(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // terminal conditions
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        let (mut f, mut g, mut h) = (f, g, h);
        // branches that repeat the condition collapse to constants
        if f == g {
            g = self.one;
        } else if f == -g {
            g = self.zero;
        }
        if f == h {
            h = self.zero;
        } else if f == -h {
            h = self.one;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        // commutative instances pick the operand with the top variable as
        // the condition, so equivalent calls share one cache entry
        if self.is_one(g) && self.level(h) < self.level(f) {
            std::mem::swap(&mut f, &mut h);
        } else if self.is_zero(h) && self.level(g) < self.level(f) {
            std::mem::swap(&mut f, &mut g);
        } else if self.is_one(h) && self.level(g) < self.level(f) {
            let (nf, ng) = (-g, -f);
            f = nf;
            g = ng;
        } else if self.is_zero(g) && self.level(h) < self.level(f) {
            let (nf, nh) = (-h, -f);
            f = nf;
            h = nh;
        }
        // keep the condition regular
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        // keep the then-branch regular, flipping the result
        let negate_result = g.is_negated();
        if negate_result {
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(result) = self.cache.borrow().get(&key) {
            return if negate_result { -result } else { result };
        }

        let level = self.level(f).min(self.level(g)).min(self.level(h));
        let (f0, f1) = self.cofactor_at(f, level);
        let (g0, g1) = self.cofactor_at(g, level);
        let (h0, h1) = self.cofactor_at(h, level);
        let low = self.ite_rec(f0, g0, h0);
        let high = self.ite_rec(f1, g1, h1);
        let result = self.mk_bool_node(level, low, high);

        self.cache.borrow_mut().insert(key, result);
        if negate_result {
            -result
        } else {
            result
        }
    }

    pub(crate) fn cofactor_at(&self, f: Ref, level: u32) -> (Ref, Ref) {
        if self.level(f) == level {
            self.cofactors(f)
        } else {
            (f, f)
        }
    }

    /// Conjunction.
    pub fn apply_and(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, g, self.zero)
    }

    /// Disjunction.
    pub fn apply_or(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, self.one, g)
    }

    /// Exclusive or.
    pub fn apply_xor(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, -g, g)
    }

    /// Equivalence.
    pub fn apply_iff(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, g, -g)
    }

    /// Implication.
    pub fn apply_imply(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, g, self.one)
    }

    // ---------------------------------------------------------------------
    // quantification

    /// Existential quantification of the variables in the positive cube
    /// `cube`.
    pub fn exists(&self, f: Ref, cube: Ref) -> Ref {
        self.collect_if_needed(&[f, cube]);
        self.exists_rec(f, cube)
    }

    /// Universal quantification of the variables in `cube`.
    pub fn forall(&self, f: Ref, cube: Ref) -> Ref {
        -self.exists(-f, cube)
    }

    fn exists_rec(&self, f: Ref, cube: Ref) -> Ref {
        if self.is_terminal(f) || self.is_one(cube) {
            return f;
        }
        let level = self.level(f);
        // drop quantified variables above the top of f
        let mut cube = cube;
        while !self.is_one(cube) && self.level(cube) < level {
            cube = self.cofactors(cube).1;
        }
        if self.is_one(cube) {
            return f;
        }

        let key = OpKey::Abstract(opcode::EXISTS, f, cube);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result;
        }

        let (f0, f1) = self.cofactors(f);
        let result = if self.level(cube) == level {
            let rest = self.cofactors(cube).1;
            let low = self.exists_rec(f0, rest);
            let high = self.exists_rec(f1, rest);
            self.ite_rec(low, self.one, high)
        } else {
            let low = self.exists_rec(f0, cube);
            let high = self.exists_rec(f1, cube);
            self.mk_bool_node(level, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// `exists cube. f and g`, without building the conjunction first.
    pub fn and_exists(&self, f: Ref, g: Ref, cube: Ref) -> Ref {
        self.collect_if_needed(&[f, g, cube]);
        self.and_exists_rec(f, g, cube)
    }

    fn and_exists_rec(&self, f: Ref, g: Ref, cube: Ref) -> Ref {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return self.zero;
        }
        if self.is_one(f) && self.is_one(g) {
            return self.one;
        }
        if self.is_one(cube) {
            return self.ite_rec(f, g, self.zero);
        }
        if self.is_one(f) || f == g {
            return self.exists_rec(g, cube);
        }
        if self.is_one(g) {
            return self.exists_rec(f, cube);
        }
        let level = self.level(f).min(self.level(g));
        let mut cube = cube;
        while !self.is_one(cube) && self.level(cube) < level {
            cube = self.cofactors(cube).1;
        }
        if self.is_one(cube) {
            return self.ite_rec(f, g, self.zero);
        }

        // the conjunction is commutative
        let (f, g) = if f.inner() <= g.inner() { (f, g) } else { (g, f) };
        let key = OpKey::AndExists(f, g, cube);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result;
        }

        let (f0, f1) = self.cofactor_at(f, level);
        let (g0, g1) = self.cofactor_at(g, level);
        let result = if self.level(cube) == level {
            let rest = self.cofactors(cube).1;
            let low = self.and_exists_rec(f0, g0, rest);
            let high = self.and_exists_rec(f1, g1, rest);
            self.ite_rec(low, self.one, high)
        } else {
            let low = self.and_exists_rec(f0, g0, cube);
            let high = self.and_exists_rec(f1, g1, cube);
            self.mk_bool_node(level, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    // ---------------------------------------------------------------------
    // relational products

    fn pair_cube(&self, pairs: &[VariablePair], quantified: Quantified) -> Ref {
        let literals: Vec<(Variable, bool)> = pairs
            .iter()
            .map(|p| match quantified {
                Quantified::Rows => (p.row, true),
                Quantified::Columns => (p.column, true),
            })
            .collect();
        self.cube(&literals)
    }

    /// Renames every variable of `f` to its counterpart in `pairs`, in both
    /// directions: rows become columns and columns become rows.
    pub fn swap_variables(&self, f: Ref, pairs: &[VariablePair]) -> Ref {
        self.collect_if_needed(&[f]);
        let mut level_map: FxHashMap<u32, u32> = FxHashMap::default();
        for pair in pairs {
            let row = self.level_of(pair.row);
            let column = self.level_of(pair.column);
            level_map.insert(row, column);
            level_map.insert(column, row);
        }
        let mut cache: FxHashMap<Ref, Ref> = FxHashMap::default();
        self.swap_rec(f, &level_map, &mut cache)
    }

    fn swap_rec(
        &self,
        f: Ref,
        level_map: &FxHashMap<u32, u32>,
        cache: &mut FxHashMap<Ref, Ref>,
    ) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.swap_rec(-f, level_map, cache);
        }
        if let Some(&result) = cache.get(&f) {
            return result;
        }
        let level = self.level(f);
        let (f0, f1) = self.cofactors(f);
        let low = self.swap_rec(f0, level_map, cache);
        let high = self.swap_rec(f1, level_map, cache);
        let target = level_map.get(&level).copied().unwrap_or(level);
        // renaming can break the level order, so rebuild through ite
        let literal = self.mk_bool_node(target, self.zero, self.one);
        let result = self.ite_rec(literal, high, low);
        cache.insert(f, result);
        result
    }

    /// Successor states of `states` under `transitions`, expressed over row
    /// variables again.
    pub fn relational_image(
        &self,
        states: Ref,
        transitions: Ref,
        pairs: &[VariablePair],
    ) -> Ref {
        let row_cube = self.pair_cube(pairs, Quantified::Rows);
        let image_over_columns = self.and_exists(states, transitions, row_cube);
        self.swap_variables(image_over_columns, pairs)
    }

    /// Predecessor states of `states` under `transitions`.
    pub fn relational_preimage(
        &self,
        states: Ref,
        transitions: Ref,
        pairs: &[VariablePair],
    ) -> Ref {
        let states_over_columns = self.swap_variables(states, pairs);
        let column_cube = self.pair_cube(pairs, Quantified::Columns);
        self.and_exists(transitions, states_over_columns, column_cube)
    }

    // ---------------------------------------------------------------------
    // restriction

    /// Substitutes constants for variables.
    pub fn restrict(&self, f: Ref, assignments: &[(Variable, bool)]) -> Ref {
        self.collect_if_needed(&[f]);
        let level_map: FxHashMap<u32, bool> = assignments
            .iter()
            .map(|&(v, b)| (self.level_of(v), b))
            .collect();
        let mut cache: FxHashMap<Ref, Ref> = FxHashMap::default();
        self.restrict_rec(f, &level_map, &mut cache)
    }

    fn restrict_rec(
        &self,
        f: Ref,
        level_map: &FxHashMap<u32, bool>,
        cache: &mut FxHashMap<Ref, Ref>,
    ) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.restrict_rec(-f, level_map, cache);
        }
        if let Some(&result) = cache.get(&f) {
            return result;
        }
        let level = self.level(f);
        let (f0, f1) = self.cofactors(f);
        let result = match level_map.get(&level) {
            Some(true) => self.restrict_rec(f1, level_map, cache),
            Some(false) => self.restrict_rec(f0, level_map, cache),
            None => {
                let low = self.restrict_rec(f0, level_map, cache);
                let high = self.restrict_rec(f1, level_map, cache);
                self.mk_bool_node(level, low, high)
            }
        };
        cache.insert(f, result);
        result
    }

    /// The generalized cofactor of `f` with respect to the care set `care`:
    /// a diagram that agrees with `f` wherever `care` holds and is free to
    /// simplify elsewhere.
    pub fn constrain(&self, f: Ref, care: Ref) -> Result<Ref, DdError> {
        if self.is_zero(care) {
            return Err(DdError::InvalidArgument(
                "constrain with an unsatisfiable care set".to_string(),
            ));
        }
        self.collect_if_needed(&[f, care]);
        Ok(self.constrain_rec(f, care))
    }

    fn constrain_rec(&self, f: Ref, care: Ref) -> Ref {
        if self.is_one(care) || self.is_terminal(f) {
            return f;
        }
        if f == care {
            return self.one;
        }
        if f == -care {
            return self.zero;
        }

        let key = OpKey::Apply(opcode::CONSTRAIN, f, care);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result;
        }

        let level = self.level(f).min(self.level(care));
        let (f0, f1) = self.cofactor_at(f, level);
        let (c0, c1) = self.cofactor_at(care, level);
        let result = if self.is_zero(c1) {
            self.constrain_rec(f0, c0)
        } else if self.is_zero(c0) {
            self.constrain_rec(f1, c1)
        } else {
            let low = self.constrain_rec(f0, c0);
            let high = self.constrain_rec(f1, c1);
            self.mk_bool_node(level, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    // ---------------------------------------------------------------------
    // structural queries

    /// The variables `f` depends on, ordered by level.
    pub fn support(&self, f: Ref) -> Vec<Variable> {
        self.descendants([f])
            .into_iter()
            .map(|index| self.level(Ref::positive(index)))
            .filter(|&level| level != crate::manager::TERMINAL_LEVEL)
            .sorted()
            .dedup()
            .map(|level| self.variable_at_level(level))
            .collect()
    }

    /// Evaluates `f` under the given assignment; unassigned variables
    /// default to false.
    pub fn evaluate(&self, f: Ref, assignment: &[(Variable, bool)]) -> bool {
        let level_map: FxHashMap<u32, bool> = assignment
            .iter()
            .map(|&(v, b)| (self.level_of(v), b))
            .collect();
        let mut current = f;
        let mut parity = false;
        while !self.is_terminal(current) {
            if current.is_negated() {
                parity = !parity;
                current = -current;
            }
            let level = self.level(current);
            let (low, high) = self.cofactors(current);
            let bit = level_map.get(&level).copied().unwrap_or(false);
            current = if bit { high } else { low };
        }
        if current.is_negated() {
            parity = !parity;
        }
        // the regular terminal is true
        !parity
    }

    /// Number of satisfying assignments over `variables` variables, as a
    /// double.
    pub fn count_satisfying(&self, f: Ref, variables: usize) -> f64 {
        let mut cache: FxHashMap<Ref, f64> = FxHashMap::default();
        let fraction = self.satisfying_fraction(f, &mut cache);
        fraction * (variables as f64).exp2()
    }

    fn satisfying_fraction(&self, f: Ref, cache: &mut FxHashMap<Ref, f64>) -> f64 {
        if self.is_one(f) {
            return 1.0;
        }
        if self.is_zero(f) {
            return 0.0;
        }
        if f.is_negated() {
            return 1.0 - self.satisfying_fraction(-f, cache);
        }
        if let Some(&fraction) = cache.get(&f) {
            return fraction;
        }
        let (f0, f1) = self.cofactors(f);
        let fraction =
            0.5 * self.satisfying_fraction(f0, cache) + 0.5 * self.satisfying_fraction(f1, cache);
        cache.insert(f, fraction);
        fraction
    }
}
