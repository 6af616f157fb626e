//! The table data structure: a dense array part plus an open-addressing
//! hash part using Brent's variation.

#[cfg(test)]
mod table_test;

use crate::object::GcRef;
use crate::value::Value;

/// Resolves a string `GcRef` to its bytes, so the table can hash and
/// compare keys by content for long strings (never interned, so two
/// distinct `GcRef`s may hold equal content) while staying identity-based
/// for every other collectable type. Implemented by [`crate::gc::Gc`],
/// which alone can dereference arena handles.
pub trait KeyResolver {
    fn string_bytes(&self, r: GcRef) -> &[u8];
}

/// A slot in the hash part. `next` is the absolute index of the next node
/// in this slot's collision chain (not a byte offset as in the C source,
/// since our arena model makes absolute indices stable until the next
/// rehash, when every node is reinserted anyway).
#[derive(Debug, Clone)]
struct Node {
    key: Value,
    value: Value,
    next: Option<u32>,
}

impl Node {
    fn empty() -> Self {
        Self { key: Value::Nil, value: Value::Nil, next: None }
    }

    fn is_empty(&self) -> bool {
        self.key.is_nil()
    }
}

/// Bits in the per-table "missing metamethod" cache:
/// one bit per commonly-dispatched metamethod, set once a lookup into this
/// table's metatable has confirmed the field is absent. A write through
/// `set_metatable` clears the whole cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTagMethods(u8);

impl NoTagMethods {
    pub const INDEX: u8 = 1 << 0;
    pub const NEWINDEX: u8 = 1 << 1;
    pub const GC: u8 = 1 << 2;
    pub const MODE: u8 = 1 << 3;
    pub const LEN: u8 = 1 << 4;
    pub const EQ: u8 = 1 << 5;

    #[must_use]
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Weak-table mode decoded from a `__mode` metafield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeakMode {
    pub weak_keys: bool,
    pub weak_values: bool,
}

impl WeakMode {
    #[must_use]
    pub fn is_weak(self) -> bool {
        self.weak_keys || self.weak_values
    }

    #[must_use]
    pub fn is_ephemeron(self) -> bool {
        self.weak_keys && !self.weak_values
    }
}

#[derive(Debug)]
pub struct Table {
    array: Vec<Value>,
    node: Vec<Node>,
    /// Search cursor for the next free hash slot, scanned downward from
    /// `node.len()`, as the insertion algorithm below requires.
    last_free: usize,
    pub metatable: Option<GcRef>,
    no_tag_methods: NoTagMethods,
    pub weak_mode: WeakMode,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self {
            array: Vec::new(),
            node: Vec::new(),
            last_free: 0,
            metatable: None,
            no_tag_methods: NoTagMethods::default(),
            weak_mode: WeakMode::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(array_size: usize, hash_size: usize) -> Self {
        let mut t = Self::new();
        t.array.resize(array_size, Value::Nil);
        t.resize_hash(hash_size);
        t
    }

    #[must_use]
    pub fn no_tag_methods(&self) -> NoTagMethods {
        self.no_tag_methods
    }

    pub fn mark_no_tag_method(&mut self, bit: u8) {
        self.no_tag_methods.set(bit);
    }

    /// Invalidate the missing-metamethod cache; called on any write that
    /// could have just introduced a field the cache had marked absent.
    pub fn invalidate_tag_methods(&mut self) {
        self.no_tag_methods.clear();
    }

    fn resize_hash(&mut self, size: usize) {
        let size = size.next_power_of_two().max(1);
        self.node = (0..size).map(|_| Node::empty()).collect();
        self.last_free = size;
    }

    fn keys_equal(&self, a: &Value, b: &Value, resolver: &dyn KeyResolver) -> bool {
        match (a, b) {
            (Value::String(ra), Value::String(rb)) => {
                ra == rb || resolver.string_bytes(*ra) == resolver.string_bytes(*rb)
            }
            _ => a.raw_eq(b),
        }
    }

    /// The key's "main position": hash the key's bits/content modulo
    /// the hash-part size.
    fn main_position(&self, key: &Value, seed: u32, resolver: &dyn KeyResolver) -> Option<usize> {
        if self.node.is_empty() {
            return None;
        }
        let size = self.node.len() as u64;
        let h = hash_value(key, seed, resolver);
        Some((h % size) as usize)
    }

    /// Array-part fast path: integer keys `1..=array.len()` index directly.
    fn array_index(&self, key: &Value) -> Option<usize> {
        if let Value::Int(i) = key {
            if *i >= 1 && (*i as usize) <= self.array.len() {
                return Some(*i as usize - 1);
            }
        }
        None
    }

    #[must_use]
    pub fn get(&self, key: &Value, seed: u32, resolver: &dyn KeyResolver) -> Value {
        let key = key.clone().normalize_key();
        if let Some(idx) = self.array_index(&key) {
            return self.array[idx];
        }
        if self.node.is_empty() {
            return Value::Nil;
        }
        let mut cursor = self.main_position(&key, seed, resolver);
        while let Some(idx) = cursor {
            let node = &self.node[idx];
            if !node.is_empty() && self.keys_equal(&node.key, &key, resolver) {
                return node.value;
            }
            cursor = node.next.map(|n| n as usize);
        }
        Value::Nil
    }

    /// Insert or overwrite `key -> value`. `value == Nil` behaves as a
    /// removal that keeps the slot's key in place as a tombstone, so chain
    /// traversal through it stays correct.
    pub fn set(&mut self, key: Value, value: Value, seed: u32, resolver: &dyn KeyResolver) {
        let key = key.normalize_key();
        debug_assert!(key.is_valid_key(), "nil or NaN key");

        if let Some(idx) = self.array_index(&key) {
            self.array[idx] = value;
            return;
        }

        if let Some(idx) = self.find_node_index(&key, seed, resolver) {
            self.node[idx].value = value;
            return;
        }

        if value.is_nil() {
            return; // removing an absent key is a no-op
        }

        self.insert_new_key(key, value, seed, resolver);
    }

    fn find_node_index(&self, key: &Value, seed: u32, resolver: &dyn KeyResolver) -> Option<usize> {
        let mut cursor = self.main_position(key, seed, resolver);
        while let Some(idx) = cursor {
            let node = &self.node[idx];
            if !node.is_empty() && self.keys_equal(&node.key, key, resolver) {
                return Some(idx);
            }
            cursor = node.next.map(|n| n as usize);
        }
        None
    }

    /// Key insertion, Brent's variation. When the main
    /// position is occupied by a collider (an entry whose own main
    /// position differs from `mp`), displace the collider to a free slot
    /// and take `mp` for the new key — keeping the invariant that a key
    /// not at its main position always has a legitimate owner there.
    #[expect(
        clippy::expect_used,
        reason = "mp always resolves once node is non-empty, and every chain link we \
                  follow was placed by this same function, so a break would be a bug \
                  in the displacement logic itself, not a reachable runtime condition"
    )]
    fn insert_new_key(&mut self, key: Value, value: Value, seed: u32, resolver: &dyn KeyResolver) {
        if self.node.is_empty() {
            self.resize_hash(1);
        }
        loop {
            let mp = self.main_position(&key, seed, resolver).expect("non-empty hash part");
            if self.node[mp].is_empty() {
                self.node[mp] = Node { key, value, next: None };
                return;
            }

            let Some(free) = self.find_free_slot() else {
                self.rehash(seed, resolver);
                continue;
            };

            let other = self
                .main_position(&self.node[mp].key.clone(), seed, resolver)
                .expect("non-empty hash part");

            if other != mp {
                // The occupant at `mp` is itself displaced; relocate it to
                // `free` and splice `free` into `other`'s chain where `mp`
                // used to be, then take `mp` for the new key.
                let mut predecessor = other;
                while self.node[predecessor].next != Some(mp as u32) {
                    predecessor = self.node[predecessor].next.expect("chain must reach mp") as usize;
                }
                self.node[predecessor].next = Some(free as u32);
                self.node[free] = self.node[mp].clone();
                self.node[mp] = Node { key, value, next: None };
            } else {
                // The occupant legitimately owns `mp`; the new key goes to
                // `free` and is spliced into `mp`'s chain.
                let old_next = self.node[mp].next;
                self.node[free] = Node { key, value, next: old_next };
                self.node[mp].next = Some(free as u32);
            }
            return;
        }
    }

    /// Scan `last_free` downward for an empty slot. Stateful across calls
    /// within one insertion burst so we do not rescan slots already known
    /// occupied.
    fn find_free_slot(&mut self) -> Option<usize> {
        while self.last_free > 0 {
            self.last_free -= 1;
            if self.node[self.last_free].is_empty() {
                return Some(self.last_free);
            }
        }
        None
    }

    /// Rehash: bucket integer keys by `ceil(log2)`, pick the
    /// largest array size filling at least half its slots, move everything
    /// else to the hash part, and reinsert every live element.
    fn rehash(&mut self, seed: u32, resolver: &dyn KeyResolver) {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                entries.push((Value::Int(i as i64 + 1), *v));
            }
        }
        for node in &self.node {
            if !node.is_empty() && !node.value.is_nil() {
                entries.push((node.key, node.value));
            }
        }

        let new_array_size = Self::compute_array_size(entries.iter().map(|(k, _)| k));
        let hash_count = entries
            .iter()
            .filter(|(k, _)| self.array_index_for_size(k, new_array_size).is_none())
            .count();

        self.array = vec![Value::Nil; new_array_size];
        self.resize_hash(hash_count.max(1));

        for (k, v) in entries {
            if let Some(idx) = self.array_index_for_size(&k, new_array_size) {
                self.array[idx] = v;
            } else {
                self.insert_new_key(k, v, seed, resolver);
            }
        }
    }

    fn array_index_for_size(&self, key: &Value, size: usize) -> Option<usize> {
        if let Value::Int(i) = key {
            if *i >= 1 && (*i as usize) <= size {
                return Some(*i as usize - 1);
            }
        }
        None
    }

    /// Largest `N = 2^k` such that at least half of slots `1..=N` would be
    /// filled by the candidate integer keys, computed from a histogram
    /// bucketed by `ceil(log2)` of each key's value.
    fn compute_array_size<'a>(keys: impl Iterator<Item = &'a Value>) -> usize {
        const MAX_BITS: u32 = 30;
        let mut counts = [0u32; MAX_BITS as usize + 1];
        let mut total_ints = 0u32;
        for k in keys {
            if let Value::Int(i) = k {
                if *i >= 1 {
                    let bit = 64 - (*i as u64).leading_zeros();
                    let slot = bit.min(MAX_BITS) as usize;
                    counts[slot] += 1;
                    total_ints += 1;
                }
            }
        }
        if total_ints == 0 {
            return 0;
        }
        let mut acc = 0u32;
        let mut best_size = 0usize;
        for i in 0..=MAX_BITS {
            acc += counts[i as usize];
            let size = 1usize << i;
            if acc as usize > size / 2 {
                best_size = size;
            }
        }
        best_size
    }

    /// The length operator: returns *a* boundary, not *the* boundary.
    #[must_use]
    pub fn length(&self, seed: u32, resolver: &dyn KeyResolver) -> i64 {
        if let Some(n) = self.array.last() {
            if !n.is_nil() {
                if self.node.is_empty()
                    || self.get(&Value::Int(self.array.len() as i64 + 1), seed, resolver).is_nil()
                {
                    return self.array.len() as i64;
                }
                return self.hash_part_boundary(seed, resolver);
            }
        } else if self.node.is_empty() {
            return 0;
        } else {
            return self.hash_part_boundary(seed, resolver);
        }

        // Binary search the array part for a boundary: array[i] non-nil,
        // array[i+1] nil.
        let (mut lo, mut hi) = (0usize, self.array.len());
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.array[mid - 1].is_nil() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo as i64
    }

    fn hash_part_boundary(&self, seed: u32, resolver: &dyn KeyResolver) -> i64 {
        if self.get(&Value::Int(1), seed, resolver).is_nil() {
            return 0;
        }
        let mut i: i64 = 1;
        let mut j: i64 = 2;
        while !self.get(&Value::Int(j), seed, resolver).is_nil() {
            i = j;
            if j > i64::MAX / 2 {
                let mut n = 1;
                while !self.get(&Value::Int(n), seed, resolver).is_nil() {
                    n += 1;
                }
                return n - 1;
            }
            j *= 2;
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if self.get(&Value::Int(m), seed, resolver).is_nil() {
                j = m;
            } else {
                i = m;
            }
        }
        i
    }

    /// Ordinal traversal: array part first, then the hash part, in storage
    /// order. `key = Nil` means "start from the beginning".
    pub fn next(&self, key: &Value, seed: u32, resolver: &dyn KeyResolver) -> Option<(Value, Value)> {
        if key.is_nil() {
            return self.next_from_array(0).or_else(|| self.next_from_hash(0));
        }
        if let Some(idx) = self.array_index(key) {
            return self.next_from_array(idx + 1).or_else(|| self.next_from_hash(0));
        }
        let idx = self.find_node_index(&key.clone().normalize_key(), seed, resolver)?;
        self.next_from_hash(idx + 1)
    }

    fn next_from_array(&self, start: usize) -> Option<(Value, Value)> {
        for i in start..self.array.len() {
            if !self.array[i].is_nil() {
                return Some((Value::Int(i as i64 + 1), self.array[i]));
            }
        }
        None
    }

    fn next_from_hash(&self, start: usize) -> Option<(Value, Value)> {
        for i in start..self.node.len() {
            if !self.node[i].is_empty() && !self.node[i].value.is_nil() {
                return Some((self.node[i].key, self.node[i].value));
            }
        }
        None
    }

    #[must_use]
    pub fn array_len(&self) -> usize {
        self.array.len()
    }

    #[must_use]
    pub fn hash_capacity(&self) -> usize {
        self.node.len()
    }

    /// Iterate every live `(key, value)` pair, for GC tracing.
    pub fn iter_live(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (Value::Int(i as i64 + 1), *v))
            .chain(
                self.node
                    .iter()
                    .filter(|n| !n.is_empty() && !n.value.is_nil())
                    .map(|n| (n.key, n.value)),
            )
    }

    /// Drop entries whose weak side is no longer reachable, per the
    /// predicate supplied by the collector. The key itself is left in
    /// place as a tombstone so chain traversal through the slot stays
    /// correct; only the value is nilled, which is what `is_empty` ignores
    /// and what `iter_live`/`next` already treat as absent.
    pub(crate) fn sweep_weak(
        &mut self,
        key_dead: impl Fn(&Value) -> bool,
        value_dead: impl Fn(&Value) -> bool,
    ) {
        if self.weak_mode.weak_values {
            for (i, v) in self.array.iter_mut().enumerate() {
                if !v.is_nil() && value_dead(v) {
                    tracing::trace!(index = i, "weak table dropping array value");
                    *v = Value::Nil;
                }
            }
        }
        for node in &mut self.node {
            if node.is_empty() || node.value.is_nil() {
                continue;
            }
            let drop = (self.weak_mode.weak_keys && key_dead(&node.key))
                || (self.weak_mode.weak_values && value_dead(&node.value));
            if drop {
                node.value = Value::Nil;
            }
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a value for table key placement: by integer bits, normalized float
/// bits, string hash, pointer bits, or boolean. Strings hash by content via
/// `resolver`; every other collectable type
/// hashes by arena identity, which is exactly right since only strings
/// have a "same content, different object" case.
pub fn hash_value(key: &Value, seed: u32, resolver: &dyn KeyResolver) -> u64 {
    const MIX: u64 = 0x9E37_79B9_7F4A_7C15;
    match key {
        Value::Nil => 0,
        Value::Bool(b) => *b as u64,
        Value::Int(i) => *i as u64,
        Value::Float(f) => f.to_bits(),
        Value::String(r) => u64::from(crate::string_store::hash_bytes(resolver.string_bytes(*r), seed)),
        Value::Table(r) | Value::Closure(r) | Value::UserData(r) | Value::Thread(r) => {
            (r.index() as u64).wrapping_mul(MIX) ^ u64::from(seed)
        }
        Value::LightFn(f) => (*f as usize as u64).wrapping_mul(MIX),
    }
}
