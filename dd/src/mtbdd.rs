// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Kernels over value diagrams: pointwise arithmetic, abstraction over
//! cubes, optimal-assignment extraction, and conversions to and from
//! Boolean diagrams.
//!
//! Value diagrams never carry complement edges, so every handle passed to
//! these kernels is regular. Leaf computations can fail (mismatched kinds,
//! division by zero), and the failure surfaces from the kernel that first
//! touches the offending pair of leaves.

use fxhash::FxHashMap;

use crate::manager::{opcode, DdError, DdManager, OpKey, Variable, TERMINAL_LEVEL};
use crate::reference::Ref;
use crate::value::{Value, ValueKind};

/// Pointwise binary operations on value diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    /// Addition.
    Plus,
    /// Subtraction.
    Minus,
    /// Multiplication.
    Times,
    /// Division.
    Divide,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Equality test, producing Boolean leaves.
    Equals,
    /// Strict order test, producing Boolean leaves.
    Less,
    /// Non-strict order test, producing Boolean leaves.
    LessOrEqual,
    /// Exponentiation.
    Pow,
    /// Remainder.
    Modulo,
    /// Logarithm of the left operand in the base given by the right.
    Logarithm,
}

impl ValueOp {
    pub(crate) fn code(self) -> u8 {
        match self {
            ValueOp::Plus => 1,
            ValueOp::Minus => 2,
            ValueOp::Times => 3,
            ValueOp::Divide => 4,
            ValueOp::Min => 5,
            ValueOp::Max => 6,
            ValueOp::Equals => 7,
            ValueOp::Less => 8,
            ValueOp::LessOrEqual => 9,
            ValueOp::Pow => 10,
            ValueOp::Modulo => 11,
            ValueOp::Logarithm => 12,
        }
    }

    fn is_commutative(self) -> bool {
        matches!(
            self,
            ValueOp::Plus | ValueOp::Times | ValueOp::Min | ValueOp::Max | ValueOp::Equals
        )
    }

    fn apply_leaves(self, a: &Value, b: &Value) -> Result<Value, DdError> {
        match self {
            ValueOp::Plus => a.add(b),
            ValueOp::Minus => a.sub(b),
            ValueOp::Times => a.mul(b),
            ValueOp::Divide => a.div(b),
            ValueOp::Min => a.minimum(b),
            ValueOp::Max => a.maximum(b),
            ValueOp::Equals => a.equals(b),
            ValueOp::Less => a.less(b),
            ValueOp::LessOrEqual => a.less_or_equal(b),
            ValueOp::Pow => a.pow(b),
            ValueOp::Modulo => a.modulo(b),
            ValueOp::Logarithm => a.logarithm(b),
        }
    }
}

/// Pointwise unary operations on value diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Round every leaf down.
    Floor,
    /// Round every leaf up.
    Ceil,
    /// Map zero leaves to one and every other leaf to zero.
    Complement,
}

impl UnaryOp {
    fn code(self) -> u8 {
        match self {
            UnaryOp::Floor => 32,
            UnaryOp::Ceil => 33,
            UnaryOp::Complement => 34,
        }
    }

    fn apply_leaf(self, a: &Value) -> Result<Value, DdError> {
        match self {
            UnaryOp::Floor => a.floor(),
            UnaryOp::Ceil => a.ceil(),
            UnaryOp::Complement => Ok(a.complement()),
        }
    }
}

/// Comparisons against a constant, for carving Boolean diagrams out of value
/// diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    /// Leaves strictly above the constant.
    Greater,
    /// Leaves at or above the constant.
    GreaterEqual,
    /// Leaves strictly below the constant.
    Less,
    /// Leaves at or below the constant.
    LessEqual,
    /// Leaves equal to the constant.
    Equal,
}

const NOT_ZERO_CODE: u8 = 35;

/// Which optimum a representative extraction tracks.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Optimum {
    Min,
    Max,
}

/// Abstraction operators over a cube of variables.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AbstractOp {
    Sum,
    Min,
    Max,
}

impl AbstractOp {
    fn code(self) -> u8 {
        match self {
            AbstractOp::Sum => opcode::SUM,
            AbstractOp::Min => opcode::MIN,
            AbstractOp::Max => opcode::MAX,
        }
    }

    fn combine(self) -> ValueOp {
        match self {
            AbstractOp::Sum => ValueOp::Plus,
            AbstractOp::Min => ValueOp::Min,
            AbstractOp::Max => ValueOp::Max,
        }
    }
}

impl DdManager {
    // ---------------------------------------------------------------------
    // pointwise apply

    /// Applies `op` pointwise to two value diagrams.
    pub fn apply(&self, op: ValueOp, f: Ref, g: Ref) -> Result<Ref, DdError> {
        debug_assert!(!f.is_negated() && !g.is_negated());
        self.collect_if_needed(&[f, g]);
        self.apply_rec(op, f, g)
    }

    fn apply_rec(&self, op: ValueOp, f: Ref, g: Ref) -> Result<Ref, DdError> {
        // same-diagram shortcuts are kind-safe
        if f == g {
            match op {
                ValueOp::Min | ValueOp::Max => return Ok(f),
                ValueOp::Equals | ValueOp::LessOrEqual => {
                    return Ok(self.leaf(Value::Bool(true)))
                }
                ValueOp::Less => return Ok(self.leaf(Value::Bool(false))),
                _ => {}
            }
        }
        if self.is_leaf(f) && self.is_leaf(g) {
            let value = op.apply_leaves(&self.leaf_value(f), &self.leaf_value(g))?;
            return Ok(self.leaf(value));
        }

        let (f, g) = if op.is_commutative() && f.inner() > g.inner() {
            (g, f)
        } else {
            (f, g)
        };
        let key = OpKey::Apply(op.code(), f, g);
        if let Some(result) = self.cache.borrow().get(&key) {
            return Ok(result);
        }

        let level = self.level(f).min(self.level(g));
        let (f0, f1) = self.cofactor_at(f, level);
        let (g0, g1) = self.cofactor_at(g, level);
        let low = self.apply_rec(op, f0, g0)?;
        let high = self.apply_rec(op, f1, g1)?;
        let result = self.mk_value_node(level, low, high);

        self.cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    /// `if condition then t else e` with a Boolean condition over value
    /// branches. The branches must hold leaves of one kind; no leaf
    /// computation takes place, so no mismatch is detected here.
    pub fn apply_value_ite(&self, condition: Ref, t: Ref, e: Ref) -> Ref {
        debug_assert!(!t.is_negated() && !e.is_negated());
        self.collect_if_needed(&[condition, t, e]);
        self.value_ite_rec(condition, t, e)
    }

    pub(crate) fn value_ite_rec(&self, condition: Ref, t: Ref, e: Ref) -> Ref {
        if self.is_one(condition) || t == e {
            return t;
        }
        if self.is_zero(condition) {
            return e;
        }
        let key = OpKey::Ite(condition, t, e);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result;
        }
        let level = self
            .level(condition)
            .min(self.level(t))
            .min(self.level(e));
        let (c0, c1) = self.cofactor_at(condition, level);
        let (t0, t1) = self.cofactor_at(t, level);
        let (e0, e1) = self.cofactor_at(e, level);
        let low = self.value_ite_rec(c0, t0, e0);
        let high = self.value_ite_rec(c1, t1, e1);
        let result = self.mk_value_node(level, low, high);
        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Applies `op` pointwise to every leaf of a value diagram.
    pub fn apply_unary(&self, op: UnaryOp, f: Ref) -> Result<Ref, DdError> {
        debug_assert!(!f.is_negated());
        self.collect_if_needed(&[f]);
        self.apply_unary_rec(op, f)
    }

    fn apply_unary_rec(&self, op: UnaryOp, f: Ref) -> Result<Ref, DdError> {
        if self.is_leaf(f) {
            let value = op.apply_leaf(&self.leaf_value(f))?;
            return Ok(self.leaf(value));
        }
        let key = OpKey::ApplyUnary(op.code(), f);
        if let Some(result) = self.cache.borrow().get(&key) {
            return Ok(result);
        }
        let (f0, f1) = self.cofactors(f);
        let low = self.apply_unary_rec(op, f0)?;
        let high = self.apply_unary_rec(op, f1)?;
        let result = self.mk_value_node(self.level(f), low, high);
        self.cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // conversions

    /// The Boolean diagram of the leaves that are not zero.
    pub fn not_zero(&self, f: Ref) -> Ref {
        debug_assert!(!f.is_negated());
        self.collect_if_needed(&[f]);
        self.not_zero_rec(f)
    }

    fn not_zero_rec(&self, f: Ref) -> Ref {
        if self.is_leaf(f) {
            return if self.leaf_value(f).is_zero() {
                self.zero
            } else {
                self.one
            };
        }
        let key = OpKey::ApplyUnary(NOT_ZERO_CODE, f);
        if let Some(result) = self.cache.borrow().get(&key) {
            return result;
        }
        let (f0, f1) = self.cofactors(f);
        let low = self.not_zero_rec(f0);
        let high = self.not_zero_rec(f1);
        let result = self.mk_bool_node(self.level(f), low, high);
        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// The 0/1 value diagram of a Boolean diagram, with leaves of `kind`.
    pub fn from_bdd(&self, f: Ref, kind: ValueKind) -> Ref {
        self.collect_if_needed(&[f]);
        let mut cache: FxHashMap<Ref, Ref> = FxHashMap::default();
        self.from_bdd_rec(f, kind, &mut cache)
    }

    fn from_bdd_rec(&self, f: Ref, kind: ValueKind, cache: &mut FxHashMap<Ref, Ref>) -> Ref {
        if self.is_one(f) {
            return self.one_leaf(kind);
        }
        if self.is_zero(f) {
            return self.zero_leaf(kind);
        }
        if let Some(&result) = cache.get(&f) {
            return result;
        }
        let (f0, f1) = self.cofactors(f);
        let low = self.from_bdd_rec(f0, kind, cache);
        let high = self.from_bdd_rec(f1, kind, cache);
        let result = self.mk_value_node(self.level(f), low, high);
        cache.insert(f, result);
        result
    }

    /// The Boolean diagram of the leaves satisfying `op` against `constant`.
    pub fn threshold(&self, f: Ref, op: ThresholdOp, constant: &Value) -> Result<Ref, DdError> {
        debug_assert!(!f.is_negated());
        self.collect_if_needed(&[f]);
        let mut cache: FxHashMap<Ref, Ref> = FxHashMap::default();
        self.threshold_rec(f, op, constant, &mut cache)
    }

    fn threshold_rec(
        &self,
        f: Ref,
        op: ThresholdOp,
        constant: &Value,
        cache: &mut FxHashMap<Ref, Ref>,
    ) -> Result<Ref, DdError> {
        if self.is_leaf(f) {
            let ordering = self.leaf_value(f).compare(constant, "threshold")?;
            let keep = match op {
                ThresholdOp::Greater => ordering == std::cmp::Ordering::Greater,
                ThresholdOp::GreaterEqual => ordering != std::cmp::Ordering::Less,
                ThresholdOp::Less => ordering == std::cmp::Ordering::Less,
                ThresholdOp::LessEqual => ordering != std::cmp::Ordering::Greater,
                ThresholdOp::Equal => ordering == std::cmp::Ordering::Equal,
            };
            return Ok(if keep { self.one } else { self.zero });
        }
        if let Some(&result) = cache.get(&f) {
            return Ok(result);
        }
        let (f0, f1) = self.cofactors(f);
        let low = self.threshold_rec(f0, op, constant, cache)?;
        let high = self.threshold_rec(f1, op, constant, cache)?;
        let result = self.mk_bool_node(self.level(f), low, high);
        cache.insert(f, result);
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // abstraction

    /// Sums out the variables of the positive cube `cube`.
    pub fn abstract_sum(&self, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        self.collect_if_needed(&[f, cube]);
        self.abstract_rec(AbstractOp::Sum, f, cube)
    }

    /// Minimizes over the variables of `cube`.
    pub fn abstract_min(&self, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        self.collect_if_needed(&[f, cube]);
        self.abstract_rec(AbstractOp::Min, f, cube)
    }

    /// Maximizes over the variables of `cube`.
    pub fn abstract_max(&self, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        self.collect_if_needed(&[f, cube]);
        self.abstract_rec(AbstractOp::Max, f, cube)
    }

    fn abstract_rec(&self, op: AbstractOp, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        if self.is_one(cube) {
            return Ok(f);
        }
        if self.is_leaf(f) {
            // every remaining cube variable doubles a sum and is neutral for
            // the extrema
            if op != AbstractOp::Sum {
                return Ok(f);
            }
            let mut result = f;
            let mut cube = cube;
            while !self.is_one(cube) {
                result = self.apply_rec(ValueOp::Plus, result, result)?;
                cube = self.cofactors(cube).1;
            }
            return Ok(result);
        }
        let level = self.level(f);
        let cube_level = self.level(cube);
        if cube_level < level {
            let rest = self.cofactors(cube).1;
            let inner = self.abstract_rec(op, f, rest)?;
            return if op == AbstractOp::Sum {
                self.apply_rec(ValueOp::Plus, inner, inner)
            } else {
                Ok(inner)
            };
        }

        let key = OpKey::Abstract(op.code(), f, cube);
        if let Some(result) = self.cache.borrow().get(&key) {
            return Ok(result);
        }

        let (f0, f1) = self.cofactors(f);
        let result = if cube_level == level {
            let rest = self.cofactors(cube).1;
            let low = self.abstract_rec(op, f0, rest)?;
            let high = self.abstract_rec(op, f1, rest)?;
            self.apply_rec(op.combine(), low, high)?
        } else {
            let low = self.abstract_rec(op, f0, cube)?;
            let high = self.abstract_rec(op, f1, cube)?;
            self.mk_value_node(level, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // representatives

    /// A Boolean diagram that, for every assignment of the variables outside
    /// `cube`, selects exactly one minimizing assignment of the variables in
    /// `cube`. Ties fall to the else branch, so the selected assignment is
    /// the lexicographically smallest in variable order.
    pub fn min_exists_representative(&self, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        self.collect_if_needed(&[f, cube]);
        let mut cache = FxHashMap::default();
        self.representative_rec(Optimum::Min, f, cube, &mut cache)
    }

    /// Like [`DdManager::min_exists_representative`], selecting a maximizing
    /// assignment.
    pub fn max_exists_representative(&self, f: Ref, cube: Ref) -> Result<Ref, DdError> {
        self.collect_if_needed(&[f, cube]);
        let mut cache = FxHashMap::default();
        self.representative_rec(Optimum::Max, f, cube, &mut cache)
    }

    /// The all-negative cube over the variables of `cube`.
    fn negative_cube(&self, cube: Ref) -> Ref {
        let mut levels = Vec::new();
        let mut current = cube;
        while !self.is_one(current) {
            levels.push(self.level(current));
            current = self.cofactors(current).1;
        }
        let mut result = self.one;
        for level in levels.into_iter().rev() {
            result = self.mk_bool_node(level, result, self.zero);
        }
        result
    }

    fn representative_rec(
        &self,
        optimum: Optimum,
        f: Ref,
        cube: Ref,
        cache: &mut FxHashMap<(Ref, Ref), Ref>,
    ) -> Result<Ref, DdError> {
        if self.is_one(cube) {
            return Ok(self.one);
        }
        if self.is_leaf(f) {
            // constant under the remaining choices: all ties, pick all-else
            return Ok(self.negative_cube(cube));
        }
        if let Some(&result) = cache.get(&(f, cube)) {
            return Ok(result);
        }
        let level = self.level(f);
        let cube_level = self.level(cube);
        let result = if cube_level < level {
            // the choice variable does not influence f here: a tie
            let rest = self.cofactors(cube).1;
            let inner = self.representative_rec(optimum, f, rest, cache)?;
            self.mk_bool_node(cube_level, inner, self.zero)
        } else if cube_level > level {
            let (f0, f1) = self.cofactors(f);
            let low = self.representative_rec(optimum, f0, cube, cache)?;
            let high = self.representative_rec(optimum, f1, cube, cache)?;
            self.mk_bool_node(level, low, high)
        } else {
            let rest = self.cofactors(cube).1;
            let (f0, f1) = self.cofactors(f);
            let low = self.representative_rec(optimum, f0, rest, cache)?;
            let high = self.representative_rec(optimum, f1, rest, cache)?;
            let abstract_op = match optimum {
                Optimum::Min => AbstractOp::Min,
                Optimum::Max => AbstractOp::Max,
            };
            let best0 = self.abstract_rec(abstract_op, f0, rest)?;
            let best1 = self.abstract_rec(abstract_op, f1, rest)?;
            // whether the else branch is at least as good as the then branch
            let keep_else = match optimum {
                Optimum::Min => self.not_zero_rec(self.apply_rec(ValueOp::LessOrEqual, best0, best1)?),
                Optimum::Max => self.not_zero_rec(self.apply_rec(ValueOp::LessOrEqual, best1, best0)?),
            };
            let else_part = self.apply_and(keep_else, self.mk_bool_node(level, low, self.zero));
            let then_part = self.apply_and(-keep_else, self.mk_bool_node(level, self.zero, high));
            self.apply_or(else_part, then_part)
        };
        cache.insert((f, cube), result);
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // queries

    /// The value of `f` under the given assignment; unassigned variables
    /// default to false.
    ///
    /// # Panics
    /// Panics if `f` is not a value diagram.
    pub fn evaluate_value(&self, f: Ref, assignment: &[(Variable, bool)]) -> Value {
        let level_map: FxHashMap<u32, bool> = assignment
            .iter()
            .map(|&(v, b)| (self.level_of(v), b))
            .collect();
        let mut current = f;
        while !self.is_terminal(current) {
            let level = self.level(current);
            let (low, high) = self.cofactors(current);
            let bit = level_map.get(&level).copied().unwrap_or(false);
            current = if bit { high } else { low };
        }
        self.leaf_value(current)
    }

    /// The leaf kind of a value diagram, found by walking one path.
    pub fn diagram_kind(&self, f: Ref) -> Option<ValueKind> {
        let mut current = f.regular();
        while self.level(current) != TERMINAL_LEVEL {
            current = self.node(current).low;
        }
        if self.is_leaf(current) {
            Some(self.leaf_value(current).kind())
        } else {
            None
        }
    }

    /// The constant value of `f`, if it is a single leaf.
    pub fn constant_value(&self, f: Ref) -> Option<Value> {
        if self.is_leaf(f) {
            Some(self.leaf_value(f))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(manager: &DdManager, v: f64) -> Ref {
        manager.leaf(Value::Double(v))
    }

    #[test]
    fn test_apply_on_leaves() {
        let manager = DdManager::new();
        let a = double(&manager, 0.25);
        let b = double(&manager, 0.5);
        assert_eq!(
            manager.apply(ValueOp::Plus, a, b).unwrap(),
            double(&manager, 0.75)
        );
        assert_eq!(
            manager.apply(ValueOp::Max, a, b).unwrap(),
            double(&manager, 0.5)
        );
        let err = manager
            .apply(ValueOp::Plus, a, manager.leaf(Value::Int(1)))
            .unwrap_err();
        assert!(matches!(err, DdError::DomainMismatch { op: "+", .. }));
    }

    #[test]
    fn test_apply_recurses_through_nodes() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let f = manager.from_bdd(x, ValueKind::Double);
        let scaled = manager
            .apply(ValueOp::Times, f, double(&manager, 0.5))
            .unwrap();
        assert_eq!(
            manager.evaluate_value(scaled, &[(pair.row, true)]),
            Value::Double(0.5)
        );
        assert_eq!(
            manager.evaluate_value(scaled, &[(pair.row, false)]),
            Value::Double(0.0)
        );
        let doubled = manager.apply(ValueOp::Plus, f, f).unwrap();
        assert_eq!(
            manager.evaluate_value(doubled, &[(pair.row, true)]),
            Value::Double(2.0)
        );
    }

    #[test]
    fn test_from_bdd_handles_complements() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let f = manager.from_bdd(-x, ValueKind::Integer);
        assert_eq!(
            manager.evaluate_value(f, &[(pair.row, false)]),
            Value::Int(1)
        );
        assert_eq!(manager.evaluate_value(f, &[(pair.row, true)]), Value::Int(0));
    }

    #[test]
    fn test_not_zero_round_trip() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let f = manager.from_bdd(x, ValueKind::Double);
        assert_eq!(manager.not_zero(f), x);
        let zero = manager.zero_leaf(ValueKind::Double);
        assert_eq!(manager.not_zero(zero), manager.zero);
    }

    #[test]
    fn test_threshold() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let f = manager.from_bdd(x, ValueKind::Double);
        let above = manager
            .threshold(f, ThresholdOp::Greater, &Value::Double(0.5))
            .unwrap();
        assert_eq!(above, x);
        let at_least_zero = manager
            .threshold(f, ThresholdOp::GreaterEqual, &Value::Double(0.0))
            .unwrap();
        assert_eq!(at_least_zero, manager.one);
        assert!(manager
            .threshold(f, ThresholdOp::Greater, &Value::Int(0))
            .is_err());
    }

    #[test]
    fn test_unary_operations() {
        let manager = DdManager::new();
        let f = double(&manager, 1.7);
        assert_eq!(
            manager.apply_unary(UnaryOp::Floor, f).unwrap(),
            double(&manager, 1.0)
        );
        assert_eq!(
            manager.apply_unary(UnaryOp::Ceil, f).unwrap(),
            double(&manager, 2.0)
        );
        assert_eq!(
            manager.apply_unary(UnaryOp::Complement, f).unwrap(),
            double(&manager, 0.0)
        );
        let zero = manager.zero_leaf(ValueKind::Double);
        assert_eq!(
            manager.apply_unary(UnaryOp::Complement, zero).unwrap(),
            double(&manager, 1.0)
        );
    }

    #[test]
    fn test_abstract_sum_counts_assignments() {
        let manager = DdManager::new();
        let a = manager.new_variable_pair();
        let b = manager.new_variable_pair();
        let x = manager.literal(a.row);
        let f = manager.from_bdd(x, ValueKind::Double);
        let cube_x = manager.cube(&[(a.row, true)]);
        // sum over x of (x ? 1 : 0)
        assert_eq!(
            manager.abstract_sum(f, cube_x).unwrap(),
            double(&manager, 1.0)
        );
        // an absent variable doubles the sum
        let cube_xy = manager.cube(&[(a.row, true), (b.row, true)]);
        assert_eq!(
            manager.abstract_sum(f, cube_xy).unwrap(),
            double(&manager, 2.0)
        );
    }

    #[test]
    fn test_abstract_extrema() {
        let manager = DdManager::new();
        let a = manager.new_variable_pair();
        let x = manager.literal(a.row);
        let f = manager.from_bdd(x, ValueKind::Double);
        let cube = manager.cube(&[(a.row, true)]);
        assert_eq!(manager.abstract_min(f, cube).unwrap(), double(&manager, 0.0));
        assert_eq!(manager.abstract_max(f, cube).unwrap(), double(&manager, 1.0));
    }

    #[test]
    fn test_min_representative_selects_the_best_choice() {
        let manager = DdManager::new();
        let state = manager.new_variable_pair();
        let choice = manager.new_variable_pair();
        let s = manager.literal(state.row);
        let c = manager.literal(choice.row);
        // s ? (c ? 5 : 3) : (c ? 2 : 8)
        let high = manager.apply_ite(c, manager.zero, manager.one);
        let f_high = manager.from_bdd(high, ValueKind::Double); // c ? 0 : 1
        let three = double(&manager, 3.0);
        let five = double(&manager, 5.0);
        let two = double(&manager, 2.0);
        let eight = double(&manager, 8.0);
        let branch_s = {
            let on_c = manager.apply(ValueOp::Times, manager.from_bdd(c, ValueKind::Double), five);
            let off_c = manager.apply(ValueOp::Times, f_high, three);
            manager
                .apply(ValueOp::Plus, on_c.unwrap(), off_c.unwrap())
                .unwrap()
        };
        let branch_not_s = {
            let on_c = manager.apply(ValueOp::Times, manager.from_bdd(c, ValueKind::Double), two);
            let off_c = manager.apply(ValueOp::Times, f_high, eight);
            manager
                .apply(ValueOp::Plus, on_c.unwrap(), off_c.unwrap())
                .unwrap()
        };
        let s_value = manager.from_bdd(s, ValueKind::Double);
        let not_s_value = manager.from_bdd(-s, ValueKind::Double);
        let f = {
            let lhs = manager.apply(ValueOp::Times, s_value, branch_s).unwrap();
            let rhs = manager
                .apply(ValueOp::Times, not_s_value, branch_not_s)
                .unwrap();
            manager.apply(ValueOp::Plus, lhs, rhs).unwrap()
        };

        let cube = manager.cube(&[(choice.row, true)]);
        let representative = manager.min_exists_representative(f, cube).unwrap();
        // for s the minimum 3 is at c = false, for not-s the minimum 2 is at
        // c = true
        let expected = manager.apply_ite(s, -c, c);
        assert_eq!(representative, expected);

        let max_representative = manager.max_exists_representative(f, cube).unwrap();
        let expected_max = manager.apply_ite(s, c, -c);
        assert_eq!(max_representative, expected_max);
    }

    #[test]
    fn test_representative_breaks_ties_toward_else() {
        let manager = DdManager::new();
        let c = manager.new_variable_pair();
        let d = manager.new_variable_pair();
        let vc = manager.literal(c.row);
        let vd = manager.literal(d.row);
        // c ? (d ? 3 : 5) : (d ? 5 : 3): the minimum 3 is reached at both
        // (c, d) and (not-c, not-d)
        let agree = manager.apply_iff(vc, vd);
        let f = {
            let three = manager
                .apply(
                    ValueOp::Times,
                    manager.from_bdd(agree, ValueKind::Double),
                    double(&manager, 3.0),
                )
                .unwrap();
            let five = manager
                .apply(
                    ValueOp::Times,
                    manager.from_bdd(-agree, ValueKind::Double),
                    double(&manager, 5.0),
                )
                .unwrap();
            manager.apply(ValueOp::Plus, three, five).unwrap()
        };
        let cube = manager.cube(&[(c.row, true), (d.row, true)]);
        let representative = manager.min_exists_representative(f, cube).unwrap();
        let expected = manager.cube(&[(c.row, false), (d.row, false)]);
        assert_eq!(representative, expected);
    }

    #[test]
    fn test_diagram_kind() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let f = manager.from_bdd(x, ValueKind::Rational);
        assert_eq!(manager.diagram_kind(f), Some(ValueKind::Rational));
        assert_eq!(manager.diagram_kind(x), None);
        assert_eq!(manager.constant_value(f), None);
        assert_eq!(
            manager.constant_value(manager.one_leaf(ValueKind::Integer)),
            Some(Value::Int(1))
        );
    }
}
