//! Metatable dispatch.
//!
//! Tables and full userdata carry their own metatable; every other base
//! type shares one of [`crate::state::GlobalState`]'s per-type defaults,
//! selected by base type.

#[cfg(test)]
mod meta_test;

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::GcObject;
use crate::state::GlobalState;
use crate::table::NoTagMethods;
use crate::value::Value;

/// One reserved metamethod name. The first six are the ones cached by a
/// table's [`NoTagMethods`] bitset for O(1) negative lookups; the rest are
/// looked up fresh every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Index = 0,
    NewIndex = 1,
    Gc = 2,
    Mode = 3,
    Len = 4,
    Eq = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Mod = 9,
    Pow = 10,
    Div = 11,
    IDiv = 12,
    BAnd = 13,
    BOr = 14,
    BXor = 15,
    Shl = 16,
    Shr = 17,
    Unm = 18,
    BNot = 19,
    Lt = 20,
    Le = 21,
    Concat = 22,
    Call = 23,
}

/// Number of distinct tag methods, `ltm.h`'s `TM_N`.
pub const TAG_COUNT: usize = 24;

impl Tag {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Index => "__index",
            Self::NewIndex => "__newindex",
            Self::Gc => "__gc",
            Self::Mode => "__mode",
            Self::Len => "__len",
            Self::Eq => "__eq",
            Self::Add => "__add",
            Self::Sub => "__sub",
            Self::Mul => "__mul",
            Self::Mod => "__mod",
            Self::Pow => "__pow",
            Self::Div => "__div",
            Self::IDiv => "__idiv",
            Self::BAnd => "__band",
            Self::BOr => "__bor",
            Self::BXor => "__bxor",
            Self::Shl => "__shl",
            Self::Shr => "__shr",
            Self::Unm => "__unm",
            Self::BNot => "__bnot",
            Self::Lt => "__lt",
            Self::Le => "__le",
            Self::Concat => "__concat",
            Self::Call => "__call",
        }
    }

    /// Cache bit this tag occupies in [`NoTagMethods`], or `None` for tags
    /// past `TM_EQ` ("last tag method with fast access", `ltm.h`).
    #[must_use]
    pub const fn cache_bit(self) -> Option<u8> {
        match self {
            Self::Index => Some(NoTagMethods::INDEX),
            Self::NewIndex => Some(NoTagMethods::NEWINDEX),
            Self::Gc => Some(NoTagMethods::GC),
            Self::Mode => Some(NoTagMethods::MODE),
            Self::Len => Some(NoTagMethods::LEN),
            Self::Eq => Some(NoTagMethods::EQ),
            _ => None,
        }
    }
}

/// The metatable applicable to `value`: its own for tables/userdata, the
/// shared per-type default otherwise (`ltm.c luaT_gettmbyobj`'s switch).
#[must_use]
pub fn metatable_of(value: &Value, global: &GlobalState) -> Option<crate::object::GcRef> {
    match value {
        Value::Table(r) => global.gc.get(*r).and_then(GcObject::as_table).and_then(|t| t.metatable),
        Value::UserData(r) => match global.gc.get(*r) {
            Some(GcObject::UserData(u)) => u.metatable,
            _ => None,
        },
        _ => global.type_metatable(value.type_name()),
    }
}

/// Look up `tag` on `value`'s metatable, honoring a table's negative
/// cache (`ltm.h`'s `fasttm`/`gfasttm` macros) when the value is a table.
pub fn get_metamethod(value: &Value, tag: Tag, global: &GlobalState) -> Value {
    if let Value::Table(r) = value {
        if let Some(GcObject::Table(t)) = global.gc.get(*r) {
            if let Some(bit) = tag.cache_bit() {
                if t.no_tag_methods().has(bit) {
                    return Value::Nil;
                }
            }
        }
    }
    let Some(mt) = metatable_of(value, global) else { return Value::Nil };
    let Some(GcObject::Table(t)) = global.gc.get(mt) else { return Value::Nil };
    let name = global.tag_method_name(tag);
    let result = t.get(&Value::String(name), global.gc.seed(), &global.gc);
    if result.is_nil() {
        if let (Value::Table(r), Some(bit)) = (value, tag.cache_bit()) {
            if let Some(GcObject::Table(t)) = global.gc.get_mut(*r) {
                t.mark_no_tag_method(bit);
            }
        }
    }
    result
}

/// Indexing is recursive: caller resolves `t[k]`'s raw
/// `Nil` miss by walking `__index` chains, following a table metafield
/// again but stopping to *call* a function metafield. This returns the
/// next step to take rather than performing the call itself, since only
/// the caller (holding `ThreadState`/`BytecodeExecutor`) can invoke a
/// function value.
pub enum IndexStep {
    /// Final value, raw or via a chain of table `__index`es.
    Value(Value),
    /// `__index` is a function: caller must invoke `f(t, k)` and use its
    /// first result.
    Call(Value),
}

/// Resolve `t[k]`, following `__index` metafields up to a fixed depth
/// (mirrors the "too many nested metamethods" guard every Lua dispatch
/// loop applies, without exposing a raw `MAXTAGLOOP` constant here).
pub fn index(table: Value, key: &Value, global: &GlobalState) -> RuntimeResult<IndexStep> {
    const MAX_DEPTH: u32 = 2000;
    let mut current = table;
    for _ in 0..MAX_DEPTH {
        if let Value::Table(r) = current {
            let raw = global
                .gc
                .get(r)
                .and_then(GcObject::as_table)
                .map(|t| t.get(key, global.gc.seed(), &global.gc))
                .unwrap_or(Value::Nil);
            if !raw.is_nil() {
                return Ok(IndexStep::Value(raw));
            }
            match get_metamethod(&current, Tag::Index, global) {
                Value::Nil => return Ok(IndexStep::Value(Value::Nil)),
                Value::Table(next) => current = Value::Table(next),
                f => return Ok(IndexStep::Call(f)),
            }
        } else {
            match get_metamethod(&current, Tag::Index, global) {
                Value::Nil => {
                    return Err(RuntimeError::runtime(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
                Value::Table(next) => current = Value::Table(next),
                f => return Ok(IndexStep::Call(f)),
            }
        }
    }
    Err(RuntimeError::runtime("'__index' chain too long; possible loop"))
}

pub enum NewIndexStep {
    /// Handled: value has been stored directly.
    Done,
    Call(Value),
}

/// Resolve `t[k] = v`: a raw slot that already exists (or a table with no
/// `__newindex`) is overwritten directly; otherwise the metafield chain is
/// followed the same way `index` does.
pub fn new_index(
    table: Value,
    key: Value,
    value: Value,
    global: &mut GlobalState,
) -> RuntimeResult<NewIndexStep> {
    const MAX_DEPTH: u32 = 2000;
    let mut current = table;
    for _ in 0..MAX_DEPTH {
        let Value::Table(r) = current else {
            match get_metamethod(&current, Tag::NewIndex, global) {
                Value::Nil => {
                    return Err(RuntimeError::runtime(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
                Value::Table(next) => {
                    current = Value::Table(next);
                    continue;
                }
                f => return Ok(NewIndexStep::Call(f)),
            }
        };
        let exists = global
            .gc
            .get(r)
            .and_then(GcObject::as_table)
            .is_some_and(|t| !t.get(&key, global.gc.seed(), &global.gc).is_nil());
        if exists {
            set_raw(r, key, value, global);
            return Ok(NewIndexStep::Done);
        }
        match get_metamethod(&current, Tag::NewIndex, global) {
            Value::Nil => {
                set_raw(r, key, value, global);
                return Ok(NewIndexStep::Done);
            }
            Value::Table(next) => current = Value::Table(next),
            f => return Ok(NewIndexStep::Call(f)),
        }
    }
    Err(RuntimeError::runtime("'__newindex' chain too long; possible loop"))
}

fn set_raw(table: crate::object::GcRef, key: Value, value: Value, global: &mut GlobalState) {
    global.gc.table_set(table, key, value);
}

/// Binary operators try the first operand's metatable, then the second.
/// Returns the metamethod to invoke, or `Nil` if neither operand has one.
#[must_use]
pub fn binary_handler(a: &Value, b: &Value, tag: Tag, global: &GlobalState) -> Value {
    let first = get_metamethod(a, tag, global);
    if !first.is_nil() {
        return first;
    }
    get_metamethod(b, tag, global)
}

/// Equality between values of the same type applies the `__eq` metamethod
/// only when the raw values are non-equal and both operands carry it,
/// trying `a`'s metatable then falling back to `b`'s.
#[must_use]
pub fn eq_handler(a: &Value, b: &Value, global: &GlobalState) -> Option<Value> {
    if a.type_name() != b.type_name() {
        return None;
    }
    if !matches!(a, Value::Table(_) | Value::UserData(_)) {
        return None;
    }
    let h = get_metamethod(a, Tag::Eq, global);
    if !h.is_nil() {
        return Some(h);
    }
    let h = get_metamethod(b, Tag::Eq, global);
    if !h.is_nil() {
        return Some(h);
    }
    None
}
