//! The incremental tri-color garbage collector and the arena it collects:
//! every [`GcObject`] lives in one `Vec` slot addressed by a [`GcRef`]
//! index rather than a raw pointer, so the collector can move slots around
//! without chasing references through host-held pointers.

#[cfg(test)]
mod gc_test;

use tracing::trace;

use crate::closure::{Closure, Proto};
use crate::config::GcConfig;
use crate::object::{Color, GcObject, GcRef, ObjectHeader};
use crate::string_store::{hash_bytes, next_in_bucket, set_next_in_bucket, GcString, StringStore, SHORT_STRING_MAX};
use crate::table::{KeyResolver, Table};
use crate::value::Value;

/// The collector's states, advanced in order and then cycled back to
/// `Pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Pause,
    Propagate,
    Atomic,
    SweepAll,
    SweepFinobj,
    SweepToBeFnz,
    CallFinalizers,
}

struct Slot {
    header: ObjectHeader,
    object: GcObject,
}

/// Arena plus collector state. Owned by [`crate::state::GlobalState`] and
/// shared by every thread under one interpreter instance.
pub struct Gc {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    gray: Vec<GcRef>,
    /// Objects dirtied by a back-barrier store after turning black,
    /// re-queued for re-traversal at the next atomic step.
    gray_again: Vec<GcRef>,
    /// Tables with a `__mode` weak side, processed at the atomic step.
    weak_tables: Vec<GcRef>,
    /// Objects carrying an as-yet-unrun `__gc` metamethod.
    finobj: Vec<GcRef>,
    to_be_finalized: Vec<GcRef>,
    current_white: Color,
    pub state: GcState,
    sweep_cursor: usize,
    strings: StringStore,
    /// Fixed objects (reserved words, the preallocated OOM string) never
    /// enter `free` or get swept.
    fixed_count: usize,
    bytes_allocated: usize,
    /// Signed debt counter driving pacing: positive means "collect
    /// before allocating more".
    debt: i64,
    /// Live-bytes estimate as of the last cycle's end, used to compute the
    /// next pause threshold as `pause% * estimate`.
    last_cycle_bytes: usize,
    pub config: GcConfig,
    pub emergency: bool,
    /// `LUA_GCSTOP`/`LUA_GCRESTART`: when `false`,
    /// [`Self::checkpoint`] never starts a new cycle on its own (a
    /// `LUA_GCCOLLECT`-equivalent call still forces one explicitly).
    pub gc_running: bool,
}

const INITIAL_ARENA: usize = 256;

impl Gc {
    #[must_use]
    pub fn new(seed: u32, config: GcConfig) -> Self {
        Self {
            slots: Vec::with_capacity(INITIAL_ARENA),
            free: Vec::new(),
            gray: Vec::new(),
            gray_again: Vec::new(),
            weak_tables: Vec::new(),
            finobj: Vec::new(),
            to_be_finalized: Vec::new(),
            current_white: Color::White0,
            state: GcState::Pause,
            sweep_cursor: 0,
            strings: StringStore::new(seed),
            fixed_count: 0,
            bytes_allocated: 0,
            debt: 0,
            last_cycle_bytes: 0,
            config,
            emergency: false,
            gc_running: true,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u32 {
        self.strings.seed()
    }

    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    fn other_white(&self) -> Color {
        match self.current_white {
            Color::White0 => Color::White1,
            _ => Color::White0,
        }
    }

    fn alloc_raw(&mut self, object: GcObject, fixed: bool) -> GcRef {
        let header = if fixed { ObjectHeader::fixed(self.current_white) } else { ObjectHeader::new(self.current_white) };
        let size = object_size(&object);
        self.bytes_allocated += size;
        self.debt += size as i64;
        if fixed {
            self.fixed_count += 1;
        }
        let slot = Slot { header, object };
        let r = if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(slot);
            GcRef::from_index(idx as usize)
        } else {
            self.slots.push(Some(slot));
            GcRef::from_index(self.slots.len() - 1)
        };
        trace!(target: "ember_core::gc", ref_ = ?r, bytes = size, "allocated");
        r
    }

    pub fn alloc_table(&mut self, table: Table) -> GcRef {
        let r = self.alloc_raw(GcObject::Table(table), false);
        self.write_barrier_new_object(r);
        r
    }

    pub fn alloc_closure(&mut self, closure: Closure) -> GcRef {
        let r = self.alloc_raw(GcObject::Closure(closure), false);
        self.write_barrier_new_object(r);
        r
    }

    pub fn alloc_userdata(&mut self, userdata: crate::object::UserData) -> GcRef {
        let r = self.alloc_raw(GcObject::UserData(userdata), false);
        self.write_barrier_new_object(r);
        r
    }

    pub fn alloc_thread(&mut self, thread: crate::thread::ThreadState) -> GcRef {
        let r = self.alloc_raw(GcObject::Thread(thread), false);
        self.write_barrier_new_object(r);
        r
    }

    /// A freshly allocated object starts white like any other; if the
    /// collector is mid-propagate, it's created directly *black* instead
    /// ("birth black") so it isn't mistaken for garbage before anything
    /// has a chance to reference it — the standard incremental-GC trick,
    /// equivalent in effect to a forward barrier on the allocation itself.
    fn write_barrier_new_object(&mut self, r: GcRef) {
        if matches!(self.state, GcState::Propagate | GcState::Atomic) {
            if let Some(slot) = self.slot_mut(r) {
                slot.header.color.set(Color::Black);
            }
        }
    }

    fn slot(&self, r: GcRef) -> Option<&Slot> {
        self.slots.get(r.index())?.as_ref()
    }

    fn slot_mut(&mut self, r: GcRef) -> Option<&mut Slot> {
        self.slots.get_mut(r.index())?.as_mut()
    }

    #[must_use]
    pub fn get(&self, r: GcRef) -> Option<&GcObject> {
        self.slot(r).map(|s| &s.object)
    }

    pub fn get_mut(&mut self, r: GcRef) -> Option<&mut GcObject> {
        self.slot_mut(r).map(|s| &mut s.object)
    }

    #[must_use]
    pub fn is_alive(&self, r: GcRef) -> bool {
        self.slot(r).is_some()
    }

    /// Content equality between two arbitrary values, correctly handling
    /// long strings (never interned, so compared by bytes). Everything
    /// else delegates to [`Value::raw_eq`].
    #[must_use]
    pub fn value_eq(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::String(ra), Value::String(rb)) => {
                ra == rb || self.string_bytes(*ra) == self.string_bytes(*rb)
            }
            _ => a.raw_eq(b),
        }
    }

    // -- String interning -------------------------------------------------

    /// Intern-or-allocate: short strings are looked up in the bucket
    /// table; a byte-identical hit returns the existing `GcRef` (and
    /// resurrects it if the collector had marked it for death). Long
    /// strings always allocate fresh and are never bucketed.
    pub fn intern(&mut self, bytes: &[u8]) -> GcRef {
        if bytes.len() > SHORT_STRING_MAX {
            return self.alloc_raw(GcObject::Str(GcString::new_long(bytes.to_vec().into_boxed_slice())), false);
        }
        let hash = hash_bytes(bytes, self.strings.seed());
        let bucket = self.strings.bucket_index(hash);
        let mut cursor = self.strings.bucket_head(bucket);
        while let Some(candidate) = cursor {
            let matches = self
                .get(candidate)
                .and_then(GcObject::as_string)
                .is_some_and(|s| s.bytes.as_ref() == bytes);
            if matches {
                // Resurrect: a white short string still in its bucket
                // means sweep hasn't reclaimed it yet this cycle, so it's
                // safe to hand back out and mark it the current white.
                if let Some(slot) = self.slot_mut(candidate) {
                    if slot.header.is_white() {
                        slot.header.color.set(self.current_white);
                    }
                }
                return candidate;
            }
            cursor = self.get(candidate).and_then(GcObject::as_string).and_then(next_in_bucket);
        }

        let string = GcString::new_short(bytes.to_vec().into_boxed_slice(), hash);
        let r = self.alloc_raw(GcObject::Str(string), false);
        let head = self.strings.bucket_head(bucket);
        if let Some(s) = self.get(r).and_then(GcObject::as_string) {
            set_next_in_bucket(s, head);
        }
        self.strings.set_bucket_head(bucket, Some(r));
        self.strings.note_insert();
        if self.strings.should_grow() {
            self.rehash_strings(self.strings.bucket_count() * 2);
        }
        r
    }

    /// Intern a fixed (never-collected) short string: reserved keywords
    /// and the preallocated out-of-memory message.
    pub fn intern_fixed(&mut self, bytes: &[u8]) -> GcRef {
        let hash = hash_bytes(bytes, self.strings.seed());
        let string = GcString::new_short(bytes.to_vec().into_boxed_slice(), hash);
        let r = self.alloc_raw(GcObject::Str(string), true);
        let bucket = self.strings.bucket_index(hash);
        let head = self.strings.bucket_head(bucket);
        if let Some(s) = self.get(r).and_then(GcObject::as_string) {
            set_next_in_bucket(s, head);
        }
        self.strings.set_bucket_head(bucket, Some(r));
        self.strings.note_insert();
        r
    }

    fn rehash_strings(&mut self, new_size: usize) {
        let old_count = self.strings.bucket_count();
        let mut chains: Vec<Option<GcRef>> = vec![None; new_size];
        for i in 0..old_count {
            let mut cursor = self.strings.bucket_head(i);
            while let Some(r) = cursor {
                let next = self.get(r).and_then(GcObject::as_string).and_then(next_in_bucket);
                if let Some(s) = self.get(r).and_then(GcObject::as_string) {
                    let new_hash = s.hash(self.strings.seed());
                    let new_bucket = (new_hash as usize) & (new_size - 1);
                    set_next_in_bucket(s, chains[new_bucket]);
                    chains[new_bucket] = Some(r);
                }
                cursor = next;
            }
        }
        self.strings.replace_buckets(chains);
        trace!(target: "ember_core::gc", new_size, "string table resized");
    }

    // -- Roots and tracing ----------------------------------------------

    /// Mark an object (and, for a black container, trigger the forward
    /// write-barrier) as reachable.
    pub fn mark(&mut self, r: GcRef) {
        let Some(slot) = self.slot_mut(r) else { return };
        if !slot.header.is_white() {
            return;
        }
        if slot.header.fixed {
            slot.header.color.set(Color::Black);
            return;
        }
        slot.header.color.set(Color::Gray);
        self.gray.push(r);
    }

    pub fn mark_value(&mut self, v: &Value) {
        if let Some(r) = v.gc_ref() {
            self.mark(r);
        }
    }

    /// Back barrier: a black table just received a store, so re-queue it
    /// for re-traversal at the next atomic step instead of paying a full
    /// forward-barrier shade on every value inside it.
    pub fn barrier_back_table(&mut self, table: GcRef) {
        if let Some(slot) = self.slot_mut(table) {
            if slot.header.is_black() {
                slot.header.color.set(Color::Gray);
                self.gray_again.push(table);
            }
        }
    }

    /// Forward barrier: storing `value` into `container` when `container`
    /// is black and `value` is white.
    pub fn barrier_forward(&mut self, container: GcRef, value: &Value) {
        let container_black = self.slot(container).is_some_and(|s| s.header.is_black());
        if !container_black {
            return;
        }
        if let Some(r) = value.gc_ref() {
            let value_white = self.slot(r).is_some_and(|s| s.header.is_white());
            if value_white {
                if matches!(self.state, GcState::Propagate) {
                    self.mark(r);
                } else {
                    // Atomic/sweep: cheaper to dirty the container back.
                    if let Some(slot) = self.slot_mut(container) {
                        slot.header.color.set(Color::Gray);
                    }
                    self.gray_again.push(container);
                }
            }
        }
    }

    fn trace_proto(proto: &Proto, mark: &mut impl FnMut(&Value)) {
        for c in &proto.constants {
            mark(c);
        }
        for p in &proto.protos {
            Self::trace_proto(p, mark);
        }
    }

    /// Visit every reference one object holds, marking white ones gray
    /// and returning the traversal "cost": a bounded amount of work
    /// proportional to the object just visited.
    fn trace_object(&mut self, r: GcRef) -> usize {
        let Some(obj) = self.get(r) else { return 0 };
        let mut referenced: Vec<GcRef> = Vec::new();
        let mut cost = 1;
        match obj {
            GcObject::Str(_) => {}
            GcObject::Table(t) => {
                if let Some(mt) = t.metatable {
                    referenced.push(mt);
                }
                for (k, v) in t.iter_live() {
                    if let Some(r) = k.gc_ref() {
                        referenced.push(r);
                    }
                    if let Some(r) = v.gc_ref() {
                        referenced.push(r);
                    }
                    cost += 1;
                }
            }
            GcObject::Closure(c) => match c {
                Closure::Scripted { proto, upvalues } => {
                    Self::trace_proto(proto, &mut |v| {
                        if let Some(r) = v.gc_ref() {
                            referenced.push(r);
                        }
                    });
                    for uv in upvalues {
                        if let crate::upvalue::UpvalueState::Closed(v) = &*uv.borrow() {
                            if let Some(r) = v.gc_ref() {
                                referenced.push(r);
                            }
                        }
                    }
                    cost += proto.constants.len() + upvalues.len();
                }
                Closure::Native { captures, .. } => {
                    for v in captures {
                        if let Some(r) = v.gc_ref() {
                            referenced.push(r);
                        }
                    }
                    cost += captures.len();
                }
            },
            GcObject::UserData(u) => {
                if let Some(mt) = u.metatable {
                    referenced.push(mt);
                }
            }
            GcObject::Thread(t) => {
                for i in 0..t.stack.top() {
                    if let Some(r) = t.stack.get(i).gc_ref() {
                        referenced.push(r);
                    }
                }
                cost += t.stack.top();
            }
        }
        if let Some(slot) = self.slot_mut(r) {
            slot.header.color.set(Color::Black);
        }
        for ref_ in referenced {
            self.mark(ref_);
        }
        cost
    }

    /// Begin a collection cycle: mark every root gray. Roots are supplied
    /// by the caller (`crate::state::GlobalState`), which alone knows the
    /// registry, per-type default metatables, and the live thread set.
    pub fn begin_cycle(&mut self, roots: impl IntoIterator<Item = GcRef>) {
        self.state = GcState::Propagate;
        self.gray.clear();
        self.gray_again.clear();
        for r in roots {
            self.mark(r);
        }
    }

    /// One incremental step: pop a bounded number of gray objects and
    /// trace them, returning total bytes-equivalent of work done.
    pub fn step(&mut self, work_budget: usize) -> usize {
        let mut done = 0;
        match self.state {
            GcState::Pause => {}
            GcState::Propagate => {
                while done < work_budget {
                    let Some(r) = self.gray.pop() else {
                        self.state = GcState::Atomic;
                        break;
                    };
                    done += self.trace_object(r);
                }
            }
            GcState::Atomic => {
                self.atomic_step();
                done += work_budget;
            }
            GcState::SweepAll | GcState::SweepFinobj | GcState::SweepToBeFnz => {
                done += self.sweep_step(work_budget);
            }
            GcState::CallFinalizers => {
                self.run_finalizers();
                self.state = GcState::Pause;
                if self.strings.should_shrink() {
                    self.rehash_strings(self.strings.bucket_count() / 2);
                }
            }
        }
        done
    }

    /// The atomic step, run as a single uninterruptible unit: drain
    /// gray-again, process weak tables, flip the white, and queue sweep.
    fn atomic_step(&mut self) {
        while let Some(r) = self.gray_again.pop() {
            self.trace_object(r);
        }
        while let Some(r) = self.gray.pop() {
            self.trace_object(r);
        }
        self.process_weak_tables();
        self.queue_finalizable_objects();
        self.current_white = self.other_white();
        self.sweep_cursor = 0;
        self.state = GcState::SweepAll;
    }

    /// Weak-table sweep: nil out entries whose weak side is
    /// unreachable-white. Ephemerons (weak keys, strong values) need a
    /// fixpoint since a value kept alive only by its key becomes
    /// reachable exactly when the key is marked, which can happen after
    /// the ephemeron table was first visited; we approximate this with a
    /// bounded number of extra passes rather than a dedicated worklist,
    /// trading a little precision on pathological chains of ephemerons
    /// for a much simpler implementation.
    fn process_weak_tables(&mut self) {
        for _ in 0..4 {
            let mut changed = false;
            for i in 0..self.weak_tables.len() {
                let r = self.weak_tables[i];
                let Some(table) = self.get(r).and_then(GcObject::as_table) else { continue };
                let mode = table.weak_mode;
                let entries: Vec<(Value, Value)> = table.iter_live().collect();

                let is_white = |gc: &Self, v: &Value| {
                    v.gc_ref().is_some_and(|r| gc.slot(r).is_some_and(|s| s.header.is_white()))
                };

                let mut to_clear = Vec::new();
                let mut to_revive = Vec::new();
                for (k, v) in entries {
                    let key_dead = mode.weak_keys && is_white(self, &k);
                    if mode.is_ephemeron() {
                        if key_dead {
                            to_clear.push(k);
                        } else if is_white(self, &v) {
                            to_revive.push(v);
                        }
                        continue;
                    }
                    let value_dead = mode.weak_values && is_white(self, &v);
                    if key_dead || value_dead {
                        to_clear.push(k);
                    }
                }

                for v in to_revive {
                    if let Some(vr) = v.gc_ref() {
                        self.mark(vr);
                        changed = true;
                    }
                }
                if !to_clear.is_empty() {
                    let seed = self.strings.seed();
                    if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
                        if let GcObject::Table(table) = &mut slot.object {
                            for k in to_clear {
                                table.set(k, Value::Nil, seed, &NullResolver);
                            }
                        }
                    }
                }
            }
            while let Some(r) = self.gray.pop() {
                self.trace_object(r);
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    /// Objects with `__gc` found unreachable are resurrected onto the
    /// to-be-finalized list instead of swept.
    fn queue_finalizable_objects(&mut self) {
        let pending: Vec<GcRef> = self
            .finobj
            .iter()
            .copied()
            .filter(|r| self.slot(*r).is_some_and(|s| s.header.is_white() && !s.header.finalized.get()))
            .collect();
        for r in pending {
            self.mark(r);
            self.to_be_finalized.push(r);
        }
        self.finobj.retain(|r| !self.to_be_finalized.contains(r));
    }

    fn sweep_step(&mut self, budget: usize) -> usize {
        let mut visited = 0;
        while visited < budget.max(1) {
            if self.sweep_cursor >= self.slots.len() {
                self.state = match self.state {
                    GcState::SweepAll => GcState::SweepFinobj,
                    GcState::SweepFinobj => GcState::SweepToBeFnz,
                    _ => GcState::CallFinalizers,
                };
                self.sweep_cursor = 0;
                if self.state == GcState::CallFinalizers {
                    return visited;
                }
                continue;
            }
            let idx = self.sweep_cursor;
            self.sweep_cursor += 1;
            visited += 1;
            let Some(slot) = &self.slots[idx] else { continue };
            if slot.header.fixed {
                continue;
            }
            if slot.header.is_white() {
                self.free_slot(idx);
            } else if let Some(slot) = self.slots[idx].as_mut() {
                slot.header.color.set(self.current_white);
            }
        }
        visited
    }

    fn free_slot(&mut self, idx: usize) {
        if let Some(slot) = self.slots[idx].take() {
            self.bytes_allocated = self.bytes_allocated.saturating_sub(object_size(&slot.object));
            if let GcObject::Str(s) = &slot.object {
                if s.is_short() {
                    self.unlink_string(GcRef::from_index(idx), s);
                }
            }
        }
        self.free.push(idx as u32);
    }

    fn unlink_string(&mut self, target: GcRef, s: &GcString) {
        let hash = s.hash(self.strings.seed());
        let bucket = self.strings.bucket_index(hash);
        let mut cursor = self.strings.bucket_head(bucket);
        let mut prev: Option<GcRef> = None;
        while let Some(candidate) = cursor {
            let next = self.get(candidate).and_then(GcObject::as_string).and_then(next_in_bucket);
            if candidate == target {
                match prev {
                    Some(p) => {
                        if let Some(ps) = self.get(p).and_then(GcObject::as_string) {
                            set_next_in_bucket(ps, next);
                        }
                    }
                    None => self.strings.set_bucket_head(bucket, next),
                }
                self.strings.note_remove();
                return;
            }
            prev = Some(candidate);
            cursor = next;
        }
    }

    /// Run each pending finalizer under a protected call; errors become
    /// `ERRGCMM` but do not abort collection — the embedder drives the
    /// actual `__gc` invocation (it alone can call back into scripted
    /// code), so this just drains the list and hands it back.
    fn run_finalizers(&mut self) {
        for r in self.to_be_finalized.drain(..) {
            if let Some(slot) = self.slots.get(r.index()).and_then(Option::as_ref) {
                slot.header.finalized.set(true);
            }
        }
    }

    pub fn take_pending_finalizers(&mut self) -> Vec<GcRef> {
        std::mem::take(&mut self.to_be_finalized)
    }

    pub fn register_finalizable(&mut self, r: GcRef) {
        self.finobj.push(r);
    }

    pub fn register_weak_table(&mut self, r: GcRef) {
        if !self.weak_tables.contains(&r) {
            self.weak_tables.push(r);
        }
    }

    // -- Pacing -------------------------------------------------------------

    /// Call after any allocation burst; runs one step if debt has gone
    /// positive, sized proportional to `debt * stepmul / 100`.
    pub fn checkpoint(&mut self, roots: impl FnOnce() -> Vec<GcRef>) {
        if self.state == GcState::Pause {
            if !self.gc_running {
                return;
            }
            let threshold = (self.last_cycle_bytes as u64 * self.config.pause_percent as u64 / 100).max(1);
            if self.bytes_allocated as u64 >= threshold {
                self.begin_cycle(roots());
            }
            return;
        }
        if self.debt > 0 {
            let work = ((self.debt as i128 * self.config.step_multiplier as i128) / 100).max(1) as usize;
            self.debt -= work as i64;
            let did = self.step(work);
            if self.state == GcState::Pause {
                self.last_cycle_bytes = self.bytes_allocated;
            }
            let _ = did;
        }
    }

    /// Emergency mode: force a full synchronous collection, letting the
    /// caller retry its allocation afterward.
    pub fn emergency_collect(&mut self, roots: impl FnOnce() -> Vec<GcRef>) {
        self.emergency = true;
        if self.state == GcState::Pause {
            self.begin_cycle(roots());
        }
        while self.state != GcState::Pause {
            self.step(usize::MAX / 4);
        }
        self.emergency = false;
        self.last_cycle_bytes = self.bytes_allocated;
    }

    pub fn full_collect(&mut self, roots: impl FnOnce() -> Vec<GcRef>) {
        if self.state == GcState::Pause {
            self.begin_cycle(roots());
        }
        while self.state != GcState::Pause {
            self.step(usize::MAX / 4);
        }
        self.last_cycle_bytes = self.bytes_allocated;
    }

    #[must_use]
    pub fn string_bytes(&self, r: GcRef) -> &[u8] {
        self.get(r).and_then(GcObject::as_string).map_or(&[], |s| &s.bytes)
    }

    /// Insert/overwrite `table[key] = value`, applying both write
    /// barriers. The table is swapped out of its arena slot for the
    /// duration of the call so `self` can double as the [`KeyResolver`]
    /// `Table::set` needs for string-keyed lookups — the arena can't hand
    /// out `&mut Table` and `&Gc` at once any other way.
    pub fn table_set(&mut self, r: GcRef, key: Value, value: Value) {
        let seed = self.seed();
        let Some(Some(slot)) = self.slots.get_mut(r.index()) else { return };
        if !matches!(slot.object, GcObject::Table(_)) {
            return;
        }
        let GcObject::Table(mut table) = std::mem::replace(&mut slot.object, GcObject::Table(Table::new())) else {
            unreachable!("checked above")
        };
        table.set(key.normalize_key(), value, seed, self);
        table.invalidate_tag_methods();
        if let Some(Some(slot)) = self.slots.get_mut(r.index()) {
            slot.object = GcObject::Table(table);
        }
        self.barrier_back_table(r);
        self.barrier_forward(r, &value);
    }
}

/// A `KeyResolver` used only inside `process_weak_tables`, where nilifying
/// a dead entry never needs to hash/compare a *new* string key (the key is
/// always one already stored in the table), so resolving strings is
/// unreachable in practice but still must type-check.
struct NullResolver;
impl KeyResolver for NullResolver {
    fn string_bytes(&self, _r: GcRef) -> &[u8] {
        &[]
    }
}

impl KeyResolver for Gc {
    fn string_bytes(&self, r: GcRef) -> &[u8] {
        Gc::string_bytes(self, r)
    }
}

/// Rough per-object byte cost for pacing purposes; need not be exact, only
/// monotonic in actual memory use.
fn object_size(object: &GcObject) -> usize {
    match object {
        GcObject::Str(s) => std::mem::size_of::<GcString>() + s.len(),
        GcObject::Table(t) => {
            std::mem::size_of::<Table>() + t.array_len() * std::mem::size_of::<Value>() * 2
                + t.hash_capacity() * std::mem::size_of::<Value>() * 3
        }
        GcObject::Closure(_) => std::mem::size_of::<Closure>() + 64,
        GcObject::UserData(_) => std::mem::size_of::<crate::object::UserData>() + 32,
        GcObject::Thread(t) => std::mem::size_of::<crate::thread::ThreadState>() + t.stack.capacity() * std::mem::size_of::<Value>(),
    }
}
