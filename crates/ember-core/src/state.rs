//! Global state shared by every thread of one interpreter instance, in
//! the spirit of `lstate.h`'s `global_State`.
//!
//! Deliberately *not* a process-wide static: an embedder owns one
//! `GlobalState` per interpreter instance and threads it through
//! explicitly; multiple instances in one process share nothing.

#[cfg(test)]
mod state_test;

use crate::config::{GcConfig, RuntimeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::gc::Gc;
use crate::meta::{Tag, TAG_COUNT};
use crate::object::{GcObject, GcRef};
use crate::table::Table;
use crate::thread::{ThreadId, ThreadState};
use crate::value::Value;

/// Index into [`GlobalState::type_metatables`]: one slot per base type
/// that can carry a *shared* default metatable. Tables and userdata
/// carry their own instead and never use this array (`lstate.h`'s
/// `mt[LUA_NUMTAGS]` does index them too, but this runtime never consults
/// that slot for them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BaseType {
    Nil = 0,
    Boolean = 1,
    LightUserData = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    UserData = 7,
    Thread = 8,
}

pub const BASE_TYPE_COUNT: usize = 9;

/// Registry convention: fixed integer slots, then a `ref`/`unref` free
/// list for the rest (`lauxlib.h`'s `luaL_ref`).
pub const REGISTRY_MAIN_THREAD: i64 = 1;
pub const REGISTRY_GLOBALS: i64 = 2;
/// First slot `luaL_ref` may hand out; mirrors Lua's `LUA_RIDX_LAST + 1`.
const REGISTRY_FIRST_FREE: i64 = 3;

/// Per interpreter instance: GC arena, registry, per-type default
/// metatables, panic hook, and the handful of process-instance-wide
/// values every thread shares.
pub struct GlobalState {
    pub gc: Gc,
    pub registry: GcRef,
    pub main_thread: GcRef,
    type_metatables: [Option<GcRef>; BASE_TYPE_COUNT],
    tag_method_names: [GcRef; TAG_COUNT],
    /// The one error object used for every `RuntimeError::Memory`: a
    /// preallocated, permanently-fixed string, allocated once so an
    /// out-of-memory condition never itself needs to allocate.
    pub memerrmsg: GcRef,
    /// Registry ref/unref: pops the top value, stores it at the first
    /// free slot. Free slots form a singly linked list through the
    /// registry table itself, each node's value holding the next free
    /// integer key (Lua's actual `luaL_ref` trick) — so no separate
    /// bookkeeping structure is needed here.
    next_free_ref: i64,
    next_thread_id: u32,
    pub panic: Option<fn(&mut ThreadState, &mut GlobalState) -> i32>,
    pub runtime_config: RuntimeConfig,
    pub version: &'static str,
}

impl GlobalState {
    /// Bootstraps a fresh interpreter instance: allocates the registry, the
    /// globals table, the main thread, and interns the fixed strings every
    /// instance needs (tag-method names, the OOM message) — mirrors
    /// `lstate.c`'s `lua_newstate` + `ltm.c`'s `luaT_init` sequence, minus
    /// the parts this crate doesn't own (stdlib, loader hookup).
    #[must_use]
    pub fn new(runtime_config: RuntimeConfig, gc_config: GcConfig) -> Self {
        let seed = Self::make_seed();
        let mut gc = Gc::new(seed, gc_config);

        let tag_method_names = std::array::from_fn(|i| {
            let tag = TAGS_IN_ORDER[i];
            gc.intern_fixed(tag.name().as_bytes())
        });
        let memerrmsg = gc.intern_fixed(b"not enough memory");

        let registry = gc.alloc_table(Table::with_capacity(0, runtime_config.registry_presize));
        let globals = gc.alloc_table(Table::new());

        let thread_id = ThreadId(0);
        let main_thread = gc.alloc_thread(ThreadState::new(
            thread_id,
            runtime_config.initial_stack_size,
            runtime_config.max_stack_size,
        ));

        gc.table_set(registry, Value::Int(REGISTRY_MAIN_THREAD), Value::Thread(main_thread));
        gc.table_set(registry, Value::Int(REGISTRY_GLOBALS), Value::Table(globals));

        Self {
            gc,
            registry,
            main_thread,
            type_metatables: [None; BASE_TYPE_COUNT],
            tag_method_names,
            memerrmsg,
            next_free_ref: 0,
            next_thread_id: 1,
            panic: None,
            runtime_config,
            version: crate::VERSION,
        }
    }

    /// Cheap, non-cryptographic per-instance seed so two instances in one
    /// process don't share the same hash-flooding-resistant string hash
    /// (`lstate.c`'s `luai_makeseed`).
    fn make_seed() -> u32 {
        let addr = std::ptr::addr_of!(REGISTRY_FIRST_FREE) as usize;
        (addr as u32) ^ 0x9E37_79B9
    }

    #[must_use]
    pub fn globals(&self) -> GcRef {
        let seed = self.gc.seed();
        match self.gc.get(self.registry).and_then(GcObject::as_table) {
            Some(t) => match t.get(&Value::Int(REGISTRY_GLOBALS), seed, &self.gc) {
                Value::Table(r) => r,
                _ => unreachable!("globals table installed at bootstrap"),
            },
            None => unreachable!("registry installed at bootstrap"),
        }
    }

    #[must_use]
    pub fn tag_method_name(&self, tag: Tag) -> GcRef {
        self.tag_method_names[tag as usize]
    }

    #[must_use]
    pub fn type_metatable(&self, type_name: &str) -> Option<GcRef> {
        let idx = match type_name {
            "nil" => BaseType::Nil,
            "boolean" => BaseType::Boolean,
            "number" => BaseType::Number,
            "string" => BaseType::String,
            "table" => BaseType::Table,
            "function" => BaseType::Function,
            "userdata" => BaseType::UserData,
            "thread" => BaseType::Thread,
            _ => return None,
        };
        self.type_metatables[idx as usize]
    }

    pub fn set_type_metatable(&mut self, ty: BaseType, mt: Option<GcRef>) {
        self.type_metatables[ty as usize] = mt;
    }

    pub fn new_thread_id(&mut self) -> ThreadId {
        let id = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;
        id
    }

    /// GC roots: main thread, registry, and type-default metatables. The
    /// registry alone reaches the globals table and the main thread; the
    /// per-type metatables are listed separately since nothing else
    /// references them.
    pub fn roots(&self) -> Vec<GcRef> {
        let mut roots = vec![self.registry, self.main_thread];
        roots.extend(self.type_metatables.iter().flatten().copied());
        roots
    }

    /// Registry ref/unref: pop `v` from `thread`'s stack (caller's job —
    /// this takes the value directly), store it at the first free
    /// registry slot, return that slot (`lauxlib.h`'s `luaL_ref`).
    pub fn registry_ref(&mut self, value: Value) -> i64 {
        if value.is_nil() {
            return 0; // LUA_REFNIL convention: nil is never actually stored
        }
        let seed = self.gc.seed();
        let slot = if self.next_free_ref != 0 {
            let slot = self.next_free_ref;
            self.next_free_ref = match self.gc.get(self.registry).and_then(GcObject::as_table) {
                Some(t) => match t.get(&Value::Int(slot), seed, &self.gc) {
                    Value::Int(n) => n,
                    _ => slot + 1,
                },
                None => slot + 1,
            };
            slot
        } else {
            let used = self.next_used_slot();
            self.next_used_slot_set(used + 1);
            used
        };
        self.gc.table_set(self.registry, Value::Int(slot), value);
        slot
    }

    /// `lauxlib.h`'s `luaL_unref`: splice `slot` back onto the free list.
    pub fn registry_unref(&mut self, slot: i64) {
        if slot <= 0 {
            return;
        }
        self.gc.table_set(self.registry, Value::Int(slot), Value::Int(self.next_free_ref));
        self.next_free_ref = slot;
    }

    /// High-water mark for never-yet-used registry slots, stashed at a
    /// reserved negative key so it survives alongside the free list
    /// without a separate field on every clone of this struct's callers.
    fn next_used_slot(&self) -> i64 {
        let seed = self.gc.seed();
        match self.gc.get(self.registry).and_then(GcObject::as_table) {
            Some(t) => match t.get(&Value::Int(-1), seed, &self.gc) {
                Value::Int(n) => n,
                _ => REGISTRY_FIRST_FREE,
            },
            None => REGISTRY_FIRST_FREE,
        }
    }

    fn next_used_slot_set(&mut self, v: i64) {
        self.gc.table_set(self.registry, Value::Int(-1), Value::Int(v));
    }

    /// Raise `RuntimeError::Memory` using the preallocated fixed string,
    /// after driving an emergency collection and retry; the caller
    /// supplies `retry` as the allocation to attempt again once space has
    /// (hopefully) been freed.
    pub fn alloc_or_oom<T>(&mut self, mut retry: impl FnMut(&mut Self) -> Option<T>) -> RuntimeResult<T> {
        if let Some(v) = retry(self) {
            return Ok(v);
        }
        if self.gc.config.emergency_mode {
            let roots = self.roots();
            self.gc.emergency_collect(|| roots);
            if let Some(v) = retry(self) {
                return Ok(v);
            }
        }
        Err(RuntimeError::Memory)
    }
}

const TAGS_IN_ORDER: [Tag; TAG_COUNT] = [
    Tag::Index,
    Tag::NewIndex,
    Tag::Gc,
    Tag::Mode,
    Tag::Len,
    Tag::Eq,
    Tag::Add,
    Tag::Sub,
    Tag::Mul,
    Tag::Mod,
    Tag::Pow,
    Tag::Div,
    Tag::IDiv,
    Tag::BAnd,
    Tag::BOr,
    Tag::BXor,
    Tag::Shl,
    Tag::Shr,
    Tag::Unm,
    Tag::BNot,
    Tag::Lt,
    Tag::Le,
    Tag::Concat,
    Tag::Call,
];
