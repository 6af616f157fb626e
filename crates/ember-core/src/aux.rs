//! Argument-checking and convenience helpers layered on top of
//! [`crate::api::Api`], in the spirit of `lauxlib.h`'s auxiliary library.
//!
//! Every `check_*` here raises a [`RuntimeError`] instead of `lauxlib.c`'s
//! longjmp-based `luaL_error`, matching how the rest of this crate threads
//! errors through `Result` rather than unwinding.

#[cfg(test)]
mod aux_test;

use crate::api::Api;
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::BytecodeExecutor;
use crate::meta;
use crate::object::GcObject;
use crate::state::GlobalState;
use crate::value::Value;

/// `luaL_argerror`: prefixes the message with the argument's 1-based
/// position and the calling function's name when known.
#[must_use]
pub fn arg_error(fn_name: &str, arg_index: i32, message: &str) -> RuntimeError {
    RuntimeError::runtime(format!("bad argument #{arg_index} to '{fn_name}' ({message})"))
}

fn type_error(fn_name: &str, arg_index: i32, expected: &str, got: &str) -> RuntimeError {
    arg_error(fn_name, arg_index, &format!("{expected} expected, got {got}"))
}

impl Api<'_> {
    /// `luaL_checkinteger`.
    pub fn check_integer(&self, fn_name: &str, arg_index: i32) -> RuntimeResult<i64> {
        self.to_integer(arg_index)
            .ok_or_else(|| type_error(fn_name, arg_index, "number", self.type_name(arg_index)))
    }

    /// `luaL_optinteger`.
    pub fn opt_integer(&self, fn_name: &str, arg_index: i32, default: i64) -> RuntimeResult<i64> {
        if self.is_none_or_nil(arg_index) {
            Ok(default)
        } else {
            self.check_integer(fn_name, arg_index)
        }
    }

    /// `luaL_checknumber`.
    pub fn check_number(&self, fn_name: &str, arg_index: i32) -> RuntimeResult<f64> {
        self.to_number(arg_index)
            .ok_or_else(|| type_error(fn_name, arg_index, "number", self.type_name(arg_index)))
    }

    pub fn opt_number(&self, fn_name: &str, arg_index: i32, default: f64) -> RuntimeResult<f64> {
        if self.is_none_or_nil(arg_index) {
            Ok(default)
        } else {
            self.check_number(fn_name, arg_index)
        }
    }

    /// `luaL_checklstring`: accepts strings and numbers (numbers convert,
    /// same coercion `lua_tolstring` performs).
    pub fn check_string(&mut self, fn_name: &str, arg_index: i32) -> RuntimeResult<Vec<u8>> {
        self.to_string(arg_index)?
            .ok_or_else(|| type_error(fn_name, arg_index, "string", self.type_name(arg_index)))
    }

    pub fn opt_string(&mut self, fn_name: &str, arg_index: i32, default: &[u8]) -> RuntimeResult<Vec<u8>> {
        if self.is_none_or_nil(arg_index) {
            Ok(default.to_vec())
        } else {
            self.check_string(fn_name, arg_index)
        }
    }

    /// `luaL_checktype`: any-value type check that doesn't attempt
    /// coercion (used for table/function/userdata/thread arguments).
    pub fn check_type(&self, fn_name: &str, arg_index: i32, expected: &'static str) -> RuntimeResult<()> {
        if self.type_name(arg_index) == expected {
            Ok(())
        } else {
            Err(type_error(fn_name, arg_index, expected, self.type_name(arg_index)))
        }
    }

    /// `luaL_checkany`: any value present, including `nil`, but not "none"
    /// (an omitted trailing argument).
    pub fn check_any(&self, fn_name: &str, arg_index: i32) -> RuntimeResult<()> {
        if self.is_none(arg_index) {
            Err(arg_error(fn_name, arg_index, "value expected"))
        } else {
            Ok(())
        }
    }

    /// `luaL_checkstack`, with the human-readable message `lauxlib.c`
    /// attaches.
    pub fn check_stack_room(&mut self, n: i32, context: &str) -> RuntimeResult<()> {
        self.check_stack(n).map_err(|_| RuntimeError::runtime(format!("stack overflow ({context})")))
    }
}

/// `luaL_newmetatable`: get-or-create the named metatable in the registry
/// table `global`'s metatable-name subtable is keyed under
/// (`lauxlib.c`: registered under the type name itself in the registry).
/// Returns `false` if it already existed (matching `luaL_newmetatable`'s
/// return convention), with the table left on top of the stack either way.
pub fn new_metatable(api: &mut Api<'_>, name: &[u8]) -> RuntimeResult<bool> {
    let registry = api.global.registry;
    let key = Value::String(api.global.gc.intern(name));
    let seed = api.global.gc.seed();
    let existing = api.global.gc.get(registry).and_then(GcObject::as_table).map(|t| t.get(&key, seed, &api.global.gc));
    if let Some(Value::Table(r)) = existing {
        api.thread.stack.push(Value::Table(r))?;
        return Ok(false);
    }
    api.new_table()?;
    let table_value = api.get(-1);
    api.global.gc.table_set(registry, key, table_value);
    Ok(true)
}

/// `luaL_getmetatable`: push the named metatable, or `nil` if unregistered.
pub fn get_metatable_named(api: &mut Api<'_>, name: &[u8]) -> RuntimeResult<()> {
    let registry = api.global.registry;
    let key = Value::String(api.global.gc.intern(name));
    let seed = api.global.gc.seed();
    let v = api.global.gc.get(registry).and_then(GcObject::as_table).map_or(Value::Nil, |t| t.get(&key, seed, &api.global.gc));
    api.thread.stack.push(v)
}

/// `luaL_checkudata`: the value at `arg_index` must be a full userdata
/// whose metatable is (by identity) the one registered under `name`.
pub fn check_userdata<'a>(
    api: &'a Api<'_>,
    fn_name: &str,
    arg_index: i32,
    name: &[u8],
) -> RuntimeResult<&'a (dyn std::any::Any)> {
    let Value::UserData(r) = api.get(arg_index) else {
        return Err(type_error(fn_name, arg_index, std::str::from_utf8(name).unwrap_or("userdata"), api.type_name(arg_index)));
    };
    let expected = api.global.gc.get(api.global.registry).and_then(GcObject::as_table).map(|t| {
        t.get(&Value::String(api.global.gc.intern(name)), api.global.gc.seed(), &api.global.gc)
    });
    let matches = match (api.global.gc.get(r), expected) {
        (Some(GcObject::UserData(u)), Some(Value::Table(expected_mt))) => u.metatable == Some(expected_mt),
        _ => false,
    };
    if !matches {
        return Err(type_error(fn_name, arg_index, std::str::from_utf8(name).unwrap_or("userdata"), api.type_name(arg_index)));
    }
    match api.global.gc.get(r) {
        Some(GcObject::UserData(u)) => Ok(u.data.as_ref()),
        _ => unreachable!("checked above"),
    }
}

/// `luaL_ref`: pop the value on top of the stack into the registry,
/// returning its slot.
pub fn registry_ref(api: &mut Api<'_>) -> i64 {
    let v = api.thread.stack.pop().unwrap_or(Value::Nil);
    api.global.registry_ref(v)
}

/// `luaL_unref`.
pub fn registry_unref(api: &mut Api<'_>, slot: i64) {
    api.global.registry_unref(slot);
}

/// `luaL_tolstring`: like [`Api::to_string`] but honors `__tostring`/
/// `__name` metafields first (`lauxlib.c luaL_tolstring`).
pub fn to_display_string(
    api: &mut Api<'_>,
    index: i32,
    executor: &mut dyn BytecodeExecutor,
) -> RuntimeResult<Vec<u8>> {
    let v = api.get(index);
    if let Some(mt) = meta::metatable_of(&v, api.global) {
        let tostring_key = Value::String(api.global.gc.intern(b"__tostring"));
        let f = api
            .global
            .gc
            .get(mt)
            .and_then(GcObject::as_table)
            .map_or(Value::Nil, |t| t.get(&tostring_key, api.global.gc.seed(), &api.global.gc));
        if !f.is_nil() {
            let func_slot = api.thread.stack.top();
            api.thread.stack.push(f)?;
            api.thread.stack.push(v)?;
            return match crate::callinfo::call(api.thread, api.global, executor, func_slot, 1, 1)? {
                crate::callinfo::CallOutcome::Returned { .. } => {
                    let result = api.thread.stack.pop().unwrap_or(Value::Nil);
                    match result {
                        Value::String(r) => Ok(api.global.gc.string_bytes(r).to_vec()),
                        _ => Err(RuntimeError::runtime("'__tostring' must return a string")),
                    }
                }
                crate::callinfo::CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __tostring")),
            };
        }
        let name_key = Value::String(api.global.gc.intern(b"__name"));
        let name = api
            .global
            .gc
            .get(mt)
            .and_then(GcObject::as_table)
            .map_or(Value::Nil, |t| t.get(&name_key, api.global.gc.seed(), &api.global.gc));
        if let Value::String(r) = name {
            let type_name = String::from_utf8_lossy(api.global.gc.string_bytes(r)).into_owned();
            return Ok(format!("{}: 0x{:08x}", type_name, address_of(v)).into_bytes());
        }
    }
    Ok(api.to_string(index)?.unwrap_or_else(|| format_default(&v, api.global)))
}

fn format_default(v: &Value, _global: &GlobalState) -> Vec<u8> {
    match v {
        Value::Nil => b"nil".to_vec(),
        Value::Bool(true) => b"true".to_vec(),
        Value::Bool(false) => b"false".to_vec(),
        _ => format!("{}: 0x{:08x}", v.type_name(), address_of(*v)).into_bytes(),
    }
}

/// Stand-in for a pointer value in default `tostring` output: this crate
/// has no addresses, only arena slots, so the slot index serves the same
/// "something that uniquely names this object" role.
fn address_of(v: Value) -> u32 {
    v.gc_ref().map_or(0, |r| r.index() as u32)
}

/// A `luaL_Buffer`-equivalent: an accumulating byte buffer for building up
/// strings piecewise before a single [`Api::push_string`] (`lauxlib.h`'s
/// `luaL_Buffer`), avoiding the O(n²) blowup of repeated `concat`.
#[derive(Debug, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_byte(&mut self, b: u8) {
        self.bytes.push(b);
    }

    pub fn add_bytes(&mut self, s: &[u8]) {
        self.bytes.extend_from_slice(s);
    }

    pub fn add_string(&mut self, api: &Api<'_>, r: crate::object::GcRef) {
        self.bytes.extend_from_slice(api.global.gc.string_bytes(r));
    }

    /// `luaL_pushresult`: intern the accumulated bytes and push the result.
    pub fn finish(self, api: &mut Api<'_>) -> RuntimeResult<()> {
        api.push_string(&self.bytes)
    }
}
