// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The diagram manager: node storage, variable order, terminals, and garbage
//! collection.
//!
//! One [`DdManager`] owns every node of every diagram built through it.
//! Boolean diagrams share a single `one` terminal and use complement edges;
//! value diagrams bottom out in interned constant leaves and never carry
//! complements. Inner nodes of both families live in the same unique table,
//! so structurally equal subdiagrams are shared across families.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use fxhash::{FxHashMap, FxHashSet};
use log::debug;
use thiserror::Error;

use crate::reference::Ref;
use crate::table::{pair2, pair3, Cache, HashKey, Table};
use crate::value::{Value, ValueKind};

/// Errors reported by diagram operations.
#[derive(Error, Debug, PartialEq)]
pub enum DdError {
    /// A pointwise operation was applied to leaves of incompatible kinds.
    #[error("cannot apply `{op}` to {lhs} and {rhs} operands")]
    DomainMismatch {
        /// The operation that failed.
        op: &'static str,
        /// Kind of the left operand.
        lhs: ValueKind,
        /// Kind of the right operand.
        rhs: ValueKind,
    },
    /// A leaf computation failed (division by zero, NaN, overflow).
    #[error("arithmetic failure: {0}")]
    Arithmetic(String),
    /// The operation is not meaningful in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// An argument violates the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Level reserved for terminal nodes, below every real variable.
pub(crate) const TERMINAL_LEVEL: u32 = u32::MAX;

/// An inner node: a variable level and two children. Terminals reuse the
/// layout with [`TERMINAL_LEVEL`]; value leaves keep their leaf id (plus one)
/// in the `low` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) level: u32,
    pub(crate) low: Ref,
    pub(crate) high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            level: 0,
            low: Ref::new(1),
            high: Ref::new(1),
        }
    }
}

impl HashKey for Node {
    fn hash_key(&self) -> u64 {
        pair3(
            self.level.hash_key(),
            self.low.hash_key(),
            self.high.hash_key(),
        )
    }
}

/// Operation codes distinguishing memoized kernels that share an [`OpKey`]
/// shape. Binary value operations use their [`ValueOp`](crate::mtbdd::ValueOp)
/// code, unary ones their [`UnaryOp`](crate::mtbdd::UnaryOp) code; the
/// remaining kernels draw from the ranges here.
pub(crate) mod opcode {
    pub const EXISTS: u8 = 64;
    pub const CONSTRAIN: u8 = 65;
    pub const SUM: u8 = 80;
    pub const MIN: u8 = 81;
    pub const MAX: u8 = 82;
}

/// Cache keys of the memoized kernels. Operand order is already normalized
/// by the kernel for commutative operations.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKey {
    Ite(Ref, Ref, Ref),
    Apply(u8, Ref, Ref),
    ApplyUnary(u8, Ref),
    Abstract(u8, Ref, Ref),
    AndExists(Ref, Ref, Ref),
}

impl HashKey for OpKey {
    fn hash_key(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => pair2(
                1,
                pair3(f.hash_key(), g.hash_key(), h.hash_key()),
            ),
            OpKey::Apply(op, f, g) => pair2(
                2,
                pair3(*op as u64, f.hash_key(), g.hash_key()),
            ),
            OpKey::ApplyUnary(op, f) => pair2(3, pair2(*op as u64, f.hash_key())),
            OpKey::Abstract(op, f, cube) => pair2(
                4,
                pair3(*op as u64, f.hash_key(), cube.hash_key()),
            ),
            OpKey::AndExists(f, g, cube) => pair2(
                5,
                pair3(f.hash_key(), g.hash_key(), cube.hash_key()),
            ),
        }
    }
}

/// A diagram variable. Variables keep their identity across reordering; only
/// their level in the order changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub(crate) u32);

impl Variable {
    /// The creation index of this variable.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A row/column variable pair. Rows encode source states, columns encode
/// successor states of transition relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariablePair {
    /// The unprimed (source) variable.
    pub row: Variable,
    /// The primed (successor) variable.
    pub column: Variable,
}

/// A named group of variable pairs encoding one integer, most significant
/// bit first.
#[derive(Debug, Clone)]
pub struct Metavariable {
    name: String,
    pairs: Vec<VariablePair>,
}

impl Metavariable {
    /// The name of the encoded integer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bit pairs, most significant first.
    pub fn pairs(&self) -> &[VariablePair] {
        &self.pairs
    }

    /// Number of bits.
    pub fn bit_count(&self) -> usize {
        self.pairs.len()
    }

    /// The row variables, most significant first.
    pub fn row_variables(&self) -> Vec<Variable> {
        self.pairs.iter().map(|p| p.row).collect()
    }

    /// The column variables, most significant first.
    pub fn column_variables(&self) -> Vec<Variable> {
        self.pairs.iter().map(|p| p.column).collect()
    }
}

/// Which side of the variable pairs an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
    /// The unprimed variables.
    Rows,
    /// The primed variables.
    Columns,
}

const INITIAL_TABLE_BUCKETS: usize = 1 << 16;
const INITIAL_CACHE_BUCKETS: usize = 1 << 16;
const MIN_GC_THRESHOLD: usize = 1 << 14;

/// The manager. All kernels take `&self`; the interior is single-threaded
/// mutable state behind `RefCell`. Reordering takes `&mut self`, which makes
/// in-flight operations impossible by construction.
pub struct DdManager {
    pub(crate) storage: RefCell<Table<Node>>,
    pub(crate) cache: RefCell<Cache<OpKey, Ref>>,
    leaves: RefCell<Vec<Value>>,
    leaf_index: RefCell<FxHashMap<Value, Ref>>,
    var_to_level: RefCell<Vec<u32>>,
    level_to_var: RefCell<Vec<u32>>,
    /// Partner variable of each variable, if it belongs to a pair.
    partner: RefCell<Vec<Option<u32>>>,
    /// Whether the variable is the column of its pair.
    is_column: RefCell<Vec<bool>>,
    /// External reference counts by node index.
    refs: RefCell<FxHashMap<usize, usize>>,
    next_gc: Cell<usize>,
    auto_gc: Cell<bool>,
    /// The Boolean constant true.
    pub one: Ref,
    /// The Boolean constant false.
    pub zero: Ref,
}

impl Default for DdManager {
    fn default() -> Self {
        DdManager::new()
    }
}

impl DdManager {
    /// Creates a manager with default table sizes.
    pub fn new() -> Self {
        let mut storage = Table::new(INITIAL_TABLE_BUCKETS);
        let one_index = storage.add(Node {
            level: TERMINAL_LEVEL,
            low: Ref::new(1),
            high: Ref::new(1),
        });
        debug_assert_eq!(one_index, 1);
        let one = Ref::positive(one_index);
        DdManager {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(INITIAL_CACHE_BUCKETS)),
            leaves: RefCell::new(Vec::new()),
            leaf_index: RefCell::new(FxHashMap::default()),
            var_to_level: RefCell::new(Vec::new()),
            level_to_var: RefCell::new(Vec::new()),
            partner: RefCell::new(Vec::new()),
            is_column: RefCell::new(Vec::new()),
            refs: RefCell::new(FxHashMap::default()),
            next_gc: Cell::new(MIN_GC_THRESHOLD),
            auto_gc: Cell::new(false),
            one,
            zero: -one,
        }
    }

    // ---------------------------------------------------------------------
    // terminals and leaves

    /// Whether `f` is the Boolean constant true.
    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one
    }

    /// Whether `f` is the Boolean constant false.
    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero
    }

    pub(crate) fn is_terminal(&self, f: Ref) -> bool {
        self.level(f) == TERMINAL_LEVEL
    }

    /// Whether `f` is a constant leaf of a value diagram.
    pub fn is_leaf(&self, f: Ref) -> bool {
        self.is_terminal(f) && f.index() != 1
    }

    /// Interns `value` and returns its leaf.
    pub fn leaf(&self, value: Value) -> Ref {
        if let Some(&leaf) = self.leaf_index.borrow().get(&value) {
            return leaf;
        }
        let mut leaves = self.leaves.borrow_mut();
        let id = leaves.len();
        leaves.push(value.clone());
        let index = self.storage.borrow_mut().add(Node {
            level: TERMINAL_LEVEL,
            // leaf id plus one, ids start at zero
            low: Ref::new(id as i32 + 1),
            high: Ref::new(1),
        });
        let leaf = Ref::positive(index);
        self.leaf_index.borrow_mut().insert(value, leaf);
        leaf
    }

    /// The constant leaf holding the zero of `kind`.
    pub fn zero_leaf(&self, kind: ValueKind) -> Ref {
        self.leaf(Value::zero_of(kind))
    }

    /// The constant leaf holding the one of `kind`.
    pub fn one_leaf(&self, kind: ValueKind) -> Ref {
        self.leaf(Value::one_of(kind))
    }

    /// The value stored at leaf `f`.
    ///
    /// # Panics
    /// Panics if `f` is not a value leaf.
    pub fn leaf_value(&self, f: Ref) -> Value {
        assert!(self.is_leaf(f), "{f} is not a value leaf");
        let id = (self.storage.borrow().value(f.index()).low.inner() - 1) as usize;
        self.leaves.borrow()[id].clone()
    }

    // ---------------------------------------------------------------------
    // node access

    pub(crate) fn level(&self, f: Ref) -> u32 {
        self.storage.borrow().value(f.index()).level
    }

    pub(crate) fn node(&self, f: Ref) -> Node {
        self.storage.borrow().value(f.index()).clone()
    }

    /// The children of `f` with the complement bit pushed into the edges, so
    /// that the pair denotes the cofactors of the function at `f`.
    pub(crate) fn cofactors(&self, f: Ref) -> (Ref, Ref) {
        let node = self.node(f);
        if f.is_negated() {
            (-node.low, -node.high)
        } else {
            (node.low, node.high)
        }
    }

    /// Interns a Boolean node, restoring the canonical form: equal children
    /// collapse, and a complemented high child moves the complement to the
    /// returned handle.
    pub(crate) fn mk_bool_node(&self, level: u32, low: Ref, high: Ref) -> Ref {
        debug_assert!(level != TERMINAL_LEVEL);
        if low == high {
            return low;
        }
        if high.is_negated() {
            return -self.mk_bool_node(level, -low, -high);
        }
        let index = self.storage.borrow_mut().put(Node { level, low, high });
        Ref::positive(index)
    }

    /// Interns a value-diagram node. Children of value diagrams are always
    /// regular handles.
    pub(crate) fn mk_value_node(&self, level: u32, low: Ref, high: Ref) -> Ref {
        debug_assert!(level != TERMINAL_LEVEL);
        debug_assert!(!low.is_negated() && !high.is_negated());
        if low == high {
            return low;
        }
        let index = self.storage.borrow_mut().put(Node { level, low, high });
        Ref::positive(index)
    }

    // ---------------------------------------------------------------------
    // variables

    /// Number of variables created so far.
    pub fn variable_count(&self) -> usize {
        self.var_to_level.borrow().len()
    }

    fn push_variable(&self, partner: Option<u32>, is_column: bool) -> Variable {
        let mut var_to_level = self.var_to_level.borrow_mut();
        let mut level_to_var = self.level_to_var.borrow_mut();
        let id = var_to_level.len() as u32;
        let level = level_to_var.len() as u32;
        var_to_level.push(level);
        level_to_var.push(id);
        self.partner.borrow_mut().push(partner);
        self.is_column.borrow_mut().push(is_column);
        Variable(id)
    }

    /// Creates a fresh unpaired variable at the bottom of the order.
    pub fn new_variable(&self) -> Variable {
        self.push_variable(None, false)
    }

    /// Creates a fresh row/column pair at the bottom of the order, with the
    /// column directly below the row.
    pub fn new_variable_pair(&self) -> VariablePair {
        let row = self.push_variable(None, false);
        let column = self.push_variable(Some(row.0), true);
        self.partner.borrow_mut()[row.index()] = Some(column.0);
        VariablePair { row, column }
    }

    /// Creates `bits` interleaved pairs encoding one integer, most
    /// significant bit first.
    pub fn new_metavariable(&self, name: &str, bits: usize) -> Metavariable {
        let pairs = (0..bits).map(|_| self.new_variable_pair()).collect();
        Metavariable {
            name: name.to_string(),
            pairs,
        }
    }

    /// The current level of `variable`.
    pub fn level_of(&self, variable: Variable) -> u32 {
        self.var_to_level.borrow()[variable.index()]
    }

    pub(crate) fn variable_at_level(&self, level: u32) -> Variable {
        Variable(self.level_to_var.borrow()[level as usize])
    }

    /// The pair partner of `variable`, if it has one.
    pub fn partner_of(&self, variable: Variable) -> Option<Variable> {
        self.partner.borrow()[variable.index()].map(Variable)
    }

    pub(crate) fn set_order(&self, order: &[Variable]) {
        let mut var_to_level = self.var_to_level.borrow_mut();
        let mut level_to_var = self.level_to_var.borrow_mut();
        debug_assert_eq!(order.len(), level_to_var.len());
        for (level, variable) in order.iter().enumerate() {
            var_to_level[variable.index()] = level as u32;
            level_to_var[level] = variable.0;
        }
    }

    /// The current order, top level first.
    pub fn variable_order(&self) -> Vec<Variable> {
        self.level_to_var.borrow().iter().map(|&v| Variable(v)).collect()
    }

    /// The diagram of a single positive literal.
    pub fn literal(&self, variable: Variable) -> Ref {
        self.mk_bool_node(self.level_of(variable), self.zero, self.one)
    }

    /// The conjunction of the given literals.
    ///
    /// # Panics
    /// Panics if a variable occurs twice.
    pub fn cube(&self, literals: &[(Variable, bool)]) -> Ref {
        let mut sorted: Vec<(u32, bool)> = literals
            .iter()
            .map(|&(v, positive)| (self.level_of(v), positive))
            .collect();
        sorted.sort_unstable();
        for window in sorted.windows(2) {
            assert!(window[0].0 != window[1].0, "duplicate variable in cube");
        }
        let mut result = self.one;
        for &(level, positive) in sorted.iter().rev() {
            result = if positive {
                self.mk_bool_node(level, self.zero, result)
            } else {
                self.mk_bool_node(level, result, self.zero)
            };
        }
        result
    }

    /// The positive cube over all variables on `side` of `metavariable`.
    pub fn metavariable_cube(&self, metavariable: &Metavariable, side: PairSide) -> Ref {
        let literals: Vec<(Variable, bool)> = metavariable
            .pairs()
            .iter()
            .map(|p| match side {
                PairSide::Rows => (p.row, true),
                PairSide::Columns => (p.column, true),
            })
            .collect();
        self.cube(&literals)
    }

    /// The cube asserting that `metavariable` (on the given side) equals
    /// `value`, most significant bit first.
    ///
    /// # Panics
    /// Panics if `value` does not fit the metavariable's bits.
    pub fn encode(&self, metavariable: &Metavariable, side: PairSide, value: u64) -> Ref {
        let bits = metavariable.bit_count();
        assert!(
            bits >= 64 || value < (1u64 << bits),
            "{value} does not fit {bits} bits of `{}`",
            metavariable.name()
        );
        let literals: Vec<(Variable, bool)> = metavariable
            .pairs()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let bit = (value >> (bits - 1 - i)) & 1 == 1;
                match side {
                    PairSide::Rows => (p.row, bit),
                    PairSide::Columns => (p.column, bit),
                }
            })
            .collect();
        self.cube(&literals)
    }

    // ---------------------------------------------------------------------
    // reference counting and garbage collection

    /// Registers an external reference to `f`, protecting it from collection.
    pub fn add_ref(&self, f: Ref) {
        *self.refs.borrow_mut().entry(f.index()).or_insert(0) += 1;
    }

    /// Releases one external reference to `f`.
    pub fn release(&self, f: Ref) {
        let mut refs = self.refs.borrow_mut();
        if let Some(count) = refs.get_mut(&f.index()) {
            *count -= 1;
            if *count == 0 {
                refs.remove(&f.index());
            }
        }
    }

    /// Enables or disables collection triggered by table growth. Off by
    /// default: with it enabled, every handle held across kernel calls must
    /// be registered through [`DdManager::add_ref`], since a kernel entry may
    /// sweep anything unregistered.
    pub fn set_auto_gc(&self, enabled: bool) {
        self.auto_gc.set(enabled);
    }

    /// All node indices reachable from `roots`, terminals included.
    pub(crate) fn descendants(&self, roots: impl IntoIterator<Item = Ref>) -> FxHashSet<usize> {
        let mut visited = FxHashSet::default();
        visited.insert(1);
        let mut queue: VecDeque<usize> = VecDeque::new();
        for root in roots {
            if visited.insert(root.index()) {
                queue.push_back(root.index());
            }
        }
        while let Some(index) = queue.pop_front() {
            let node = self.storage.borrow().value(index).clone();
            if node.level == TERMINAL_LEVEL {
                continue;
            }
            for child in [node.low, node.high] {
                if visited.insert(child.index()) {
                    queue.push_back(child.index());
                }
            }
        }
        visited
    }

    /// Number of nodes reachable from `roots`, terminals included.
    pub fn node_count(&self, roots: &[Ref]) -> usize {
        self.descendants(roots.iter().copied()).len()
    }

    /// Drops every node not reachable from `roots` or an externally
    /// referenced node, and clears the operation cache.
    pub fn collect_garbage(&self, roots: &[Ref]) {
        let external: Vec<Ref> = self
            .refs
            .borrow()
            .keys()
            .map(|&index| Ref::positive(index))
            .collect();
        let leaf_refs: Vec<Ref> = self.leaf_index.borrow().values().copied().collect();
        let alive = self.descendants(
            roots
                .iter()
                .copied()
                .chain(external)
                .chain(leaf_refs),
        );

        self.cache.borrow_mut().clear();

        let mut storage = self.storage.borrow_mut();
        let before = storage.len();
        for bucket in 0..storage.capacity() {
            // unlink dead entries from the head of the chain
            let mut head = storage.bucket_at(bucket);
            while head != 0 && !alive.contains(&head) {
                let next = storage.next(head);
                storage.drop_slot(head);
                head = next;
            }
            storage.set_bucket_at(bucket, head);
            // then from the middle
            let mut current = head;
            while current != 0 {
                let next = storage.next(current);
                if next != 0 && !alive.contains(&next) {
                    let after = storage.next(next);
                    storage.set_next(current, after);
                    storage.drop_slot(next);
                } else {
                    current = next;
                }
            }
        }
        debug!(
            "garbage collection dropped {} of {} nodes",
            before - storage.len(),
            before
        );
    }

    /// Collects if the table has grown past the current threshold. Called by
    /// kernels on entry, when no intermediate results are at risk; `protect`
    /// names the operands of the impending operation.
    pub(crate) fn collect_if_needed(&self, protect: &[Ref]) {
        if !self.auto_gc.get() {
            return;
        }
        if self.storage.borrow().len() < self.next_gc.get() {
            return;
        }
        self.collect_garbage(protect);
        let threshold = (self.storage.borrow().len() * 2).max(MIN_GC_THRESHOLD);
        self.next_gc.set(threshold);
    }

    /// Drops all memoized operation results.
    pub fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
    }

    /// `(hits, misses)` of the operation cache since the last clear.
    pub fn cache_stats(&self) -> (usize, usize) {
        let cache = self.cache.borrow();
        (cache.hits(), cache.misses())
    }

    /// Number of live nodes in the unique table.
    pub fn table_size(&self) -> usize {
        self.storage.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        let manager = DdManager::new();
        assert!(manager.is_one(manager.one));
        assert!(manager.is_zero(manager.zero));
        assert_eq!(manager.zero, -manager.one);
        assert!(!manager.is_leaf(manager.one));
    }

    #[test]
    fn test_leaf_interning() {
        let manager = DdManager::new();
        let half = manager.leaf(Value::Double(0.5));
        assert_eq!(manager.leaf(Value::Double(0.5)), half);
        assert_ne!(manager.leaf(Value::Double(0.25)), half);
        // bitwise interning distinguishes signed zeros
        assert_ne!(manager.leaf(Value::Double(0.0)), manager.leaf(Value::Double(-0.0)));
        assert_eq!(manager.leaf_value(half), Value::Double(0.5));
        assert!(manager.is_leaf(half));
    }

    #[test]
    fn test_mk_bool_node_canonicity() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        // equal children collapse
        assert_eq!(manager.mk_bool_node(0, x, x), x);
        // negated high child moves the complement outward
        let level = manager.level_of(pair.column);
        let a = manager.mk_bool_node(level, manager.one, manager.zero);
        assert!(a.is_negated());
        assert_eq!(-a, manager.mk_bool_node(level, manager.zero, manager.one));
    }

    #[test]
    fn test_variable_pairs_interleave() {
        let manager = DdManager::new();
        let a = manager.new_variable_pair();
        let b = manager.new_variable_pair();
        assert_eq!(manager.level_of(a.row), 0);
        assert_eq!(manager.level_of(a.column), 1);
        assert_eq!(manager.level_of(b.row), 2);
        assert_eq!(manager.level_of(b.column), 3);
        assert_eq!(manager.partner_of(a.row), Some(a.column));
        assert_eq!(manager.partner_of(a.column), Some(a.row));
    }

    #[test]
    fn test_metavariable_encoding() {
        let manager = DdManager::new();
        let counter = manager.new_metavariable("counter", 3);
        assert_eq!(counter.bit_count(), 3);
        let five = manager.encode(&counter, PairSide::Rows, 5);
        // 5 = 101: the middle bit is negative in the cube
        let expected = manager.cube(&[
            (counter.pairs()[0].row, true),
            (counter.pairs()[1].row, false),
            (counter.pairs()[2].row, true),
        ]);
        assert_eq!(five, expected);
    }

    #[test]
    fn test_garbage_collection_keeps_roots_and_leaves() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let x = manager.literal(pair.row);
        let y = manager.literal(pair.column);
        let kept = manager.mk_bool_node(0, y, manager.one);
        let dropped = manager.mk_bool_node(0, -y, manager.one);
        let half = manager.leaf(Value::Double(0.5));
        let before = manager.table_size();

        manager.collect_garbage(&[kept]);
        assert!(manager.table_size() < before);
        assert_eq!(manager.leaf(Value::Double(0.5)), half);
        // interning the kept node again finds the same slot
        assert_eq!(manager.mk_bool_node(0, y, manager.one), kept);
        // the dropped node is rebuilt, possibly at a reused slot, with the
        // same canonical shape
        let rebuilt = manager.mk_bool_node(0, -y, manager.one);
        assert_eq!(manager.cofactors(rebuilt), (-y, manager.one));
        let _ = (x, dropped);
    }

    #[test]
    fn test_external_references_survive_collection() {
        let manager = DdManager::new();
        let pair = manager.new_variable_pair();
        let y = manager.literal(pair.column);
        let pinned = manager.mk_bool_node(0, -y, y);
        manager.add_ref(pinned);
        manager.collect_garbage(&[]);
        assert_eq!(manager.mk_bool_node(0, -y, y), pinned);
        manager.release(pinned);
    }
}
