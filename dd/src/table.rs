// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Hash-consing storage and the operation cache.
//!
//! [`Table`] keeps nodes in a flat arena with intrusive bucket chains so that
//! structurally equal nodes are stored once and can be addressed by a dense
//! index. [`Cache`] is a direct-mapped memoization table for the apply
//! kernels. Both are sized to powers of two so bucket selection is a mask.

use std::cell::Cell;

/// A cheap 64-bit hash for table and cache keys.
pub trait HashKey {
    /// The hash of the key. Equal keys must hash equally.
    fn hash_key(&self) -> u64;
}

/// Szudzik pairing, used to combine component hashes into one key.
fn pair(a: u64, b: u64) -> u64 {
    if a >= b {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    } else {
        a.wrapping_add(b.wrapping_mul(b))
    }
}

/// Combines two hashes into one.
pub fn pair2(a: u64, b: u64) -> u64 {
    pair(a, b)
}

/// Combines three hashes into one.
pub fn pair3(a: u64, b: u64, c: u64) -> u64 {
    pair(pair(a, b), c)
}

impl HashKey for u32 {
    fn hash_key(&self) -> u64 {
        *self as u64
    }
}

impl HashKey for u64 {
    fn hash_key(&self) -> u64 {
        *self
    }
}

impl<A: HashKey, B: HashKey> HashKey for (A, B) {
    fn hash_key(&self) -> u64 {
        pair2(self.0.hash_key(), self.1.hash_key())
    }
}

impl<A: HashKey, B: HashKey, C: HashKey> HashKey for (A, B, C) {
    fn hash_key(&self) -> u64 {
        pair3(self.0.hash_key(), self.1.hash_key(), self.2.hash_key())
    }
}

struct Slot<T> {
    value: T,
    /// Next index in this bucket's chain, or 0 at the end.
    next: usize,
    occupied: bool,
}

/// A unique table: an arena of values with hash buckets chained through the
/// entries themselves.
///
/// Index 0 is reserved so that indices fit signed handles; the first real
/// entry sits at index 1. Freed slots are reused by [`Table::alloc`] before
/// the arena grows.
pub struct Table<T> {
    slots: Vec<Slot<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
    /// Number of occupied slots.
    occupied: usize,
    /// Smallest index that might be free.
    min_free: usize,
    /// Largest index ever handed out.
    last_index: usize,
}

impl<T: Default> Table<T> {
    /// Creates a table with `capacity` buckets, rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Table {
            slots: Vec::new(),
            buckets: vec![0; capacity],
            bitmask: (capacity - 1) as u64,
            occupied: 0,
            min_free: 1,
            last_index: 0,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Largest index handed out so far; valid indices are `1..=last_index()`.
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn grow_to(&mut self, index: usize) {
        while self.slots.len() <= index {
            self.slots.push(Slot {
                value: T::default(),
                next: 0,
                occupied: false,
            });
        }
    }

    /// Claims a free slot and returns its index. The slot is marked occupied
    /// but keeps its previous (or default) value.
    pub fn alloc(&mut self) -> usize {
        let mut index = self.min_free;
        self.grow_to(index);
        while self.slots[index].occupied {
            index += 1;
            self.grow_to(index);
        }
        self.slots[index].occupied = true;
        self.slots[index].next = 0;
        self.min_free = index + 1;
        self.occupied += 1;
        self.last_index = self.last_index.max(index);
        index
    }

    /// Stores `value` in a fresh slot without linking it into any bucket.
    /// Entries added this way are invisible to [`Table::put`].
    pub fn add(&mut self, value: T) -> usize {
        let index = self.alloc();
        self.slots[index].value = value;
        index
    }

    /// Releases the slot at `index`. The caller must first unlink it from its
    /// bucket chain.
    pub fn drop_slot(&mut self, index: usize) {
        debug_assert!(self.slots[index].occupied);
        self.slots[index].occupied = false;
        self.occupied -= 1;
        self.min_free = self.min_free.min(index);
    }

    /// The value at `index`.
    pub fn value(&self, index: usize) -> &T {
        debug_assert!(self.slots[index].occupied, "slot {index} is vacant");
        &self.slots[index].value
    }

    /// The chain successor of the entry at `index`, or 0.
    pub fn next(&self, index: usize) -> usize {
        self.slots[index].next
    }

    pub(crate) fn set_next(&mut self, index: usize, next: usize) {
        self.slots[index].next = next;
    }

    /// Whether the slot at `index` holds a live entry.
    pub fn is_occupied(&self, index: usize) -> bool {
        index < self.slots.len() && self.slots[index].occupied
    }

    /// The head of the bucket that `hash` selects.
    pub fn bucket_head(&self, hash: u64) -> usize {
        self.buckets[(hash & self.bitmask) as usize]
    }

    pub(crate) fn set_bucket_head(&mut self, hash: u64, index: usize) {
        self.buckets[(hash & self.bitmask) as usize] = index;
    }

    /// The head of the bucket at position `bucket`, for sweeps that visit
    /// every chain.
    pub fn bucket_at(&self, bucket: usize) -> usize {
        self.buckets[bucket]
    }

    pub(crate) fn set_bucket_at(&mut self, bucket: usize, index: usize) {
        self.buckets[bucket] = index;
    }

    /// Iterates over `(index, value)` for every occupied slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(|(i, slot)| (i, &slot.value))
    }
}

impl<T: Default + Eq + HashKey> Table<T> {
    /// Interns `value`: returns the index of an equal existing entry, or
    /// stores `value` at the end of its bucket chain.
    pub fn put(&mut self, value: T) -> usize {
        let hash = value.hash_key();
        let head = self.bucket_head(hash);
        if head == 0 {
            let index = self.add(value);
            self.set_bucket_head(hash, index);
            return index;
        }
        let mut index = head;
        loop {
            if *self.value(index) == value {
                return index;
            }
            let next = self.next(index);
            if next == 0 {
                let new = self.add(value);
                self.set_next(index, new);
                return new;
            }
            index = next;
        }
    }
}

/// A direct-mapped operation cache.
///
/// Each bucket holds one entry; inserting into an occupied bucket evicts the
/// previous entry. Lookups compare the stored key, so a hit is always exact.
pub struct Cache<K, V> {
    data: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K: Eq + HashKey, V: Copy> Cache<K, V> {
    /// Creates a cache with `capacity` buckets, rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        let mut data = Vec::new();
        data.resize_with(capacity, || None);
        Cache {
            data,
            bitmask: (capacity - 1) as u64,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    fn index(&self, key: &K) -> usize {
        (key.hash_key() & self.bitmask) as usize
    }

    /// Looks up `key`, counting the hit or miss.
    pub fn get(&self, key: &K) -> Option<V> {
        match &self.data[self.index(key)] {
            Some((k, v)) if k == key => {
                self.hits.set(self.hits.get() + 1);
                Some(*v)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Stores `key -> value`, evicting whatever occupied the bucket.
    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(&key);
        self.data[index] = Some((key, value));
    }

    /// Drops all entries and resets the hit and miss counters.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|slot| *slot = None);
        self.hits.set(0);
        self.misses.set(0);
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    /// Number of lookups that missed.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Eq)]
    struct Pair(u32, u32);

    impl HashKey for Pair {
        fn hash_key(&self) -> u64 {
            pair2(self.0 as u64, self.1 as u64)
        }
    }

    #[test]
    fn test_put_deduplicates() {
        let mut table: Table<Pair> = Table::new(4);
        let a = table.put(Pair(1, 2));
        let b = table.put(Pair(3, 4));
        let c = table.put(Pair(1, 2));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(a), &Pair(1, 2));
    }

    #[test]
    fn test_put_walks_collision_chains() {
        // with a single bucket everything chains
        let mut table: Table<Pair> = Table::new(1);
        let indices: Vec<usize> = (0..10).map(|i| table.put(Pair(i, i))).collect();
        for (i, index) in indices.iter().enumerate() {
            assert_eq!(table.put(Pair(i as u32, i as u32)), *index);
        }
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_alloc_reuses_dropped_slots() {
        let mut table: Table<Pair> = Table::new(4);
        let a = table.add(Pair(1, 1));
        let b = table.add(Pair(2, 2));
        table.drop_slot(a);
        assert_eq!(table.len(), 1);
        let c = table.add(Pair(3, 3));
        assert_eq!(c, a);
        assert!(table.is_occupied(b));
        assert_eq!(table.last_index(), 2);
    }

    #[test]
    fn test_cache_exact_hits() {
        let mut cache: Cache<(u32, u32), u64> = Cache::new(8);
        cache.insert((1, 2), 42);
        assert_eq!(cache.get(&(1, 2)), Some(42));
        assert_eq!(cache.get(&(2, 1)), None);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        cache.clear();
        assert_eq!(cache.get(&(1, 2)), None);
    }
}
