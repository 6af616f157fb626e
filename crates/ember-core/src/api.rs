//! The host interface: the narrow, stack-mediated contract through which
//! embedding code reads/writes values, calls functions, and manipulates
//! tables. In the spirit of `lapi.c`.
//!
//! Every operation here takes `&mut ThreadState` plus `&mut GlobalState`
//! (and, for anything that may invoke scripted code, `&mut dyn
//! BytecodeExecutor`) rather than a single opaque `lua_State *`, since Rust
//! has no single-pointer-owns-everything idiom; the critical section around
//! every entry point is satisfied trivially here because both are borrowed
//! exclusively for the call's duration.

#[cfg(test)]
mod api_test;

use crate::callinfo::{self, CallOutcome};
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::BytecodeExecutor;
use crate::meta::{self, IndexStep, NewIndexStep, Tag};
use crate::object::{GcObject, GcRef, UserData};
use crate::stack::ResolvedIndex;
use crate::state::GlobalState;
use crate::table::Table;
use crate::thread::ThreadState;
use crate::value::Value;

/// `LUA_GCxxx`-equivalent controls, the `what` argument of
/// `lua_gc` (`lapi.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcControl {
    Stop,
    Restart,
    Collect,
    /// Kilobytes currently allocated.
    Count,
    Step,
    SetPause(u32),
    SetStepMul(u32),
    IsRunning,
}

/// Thin borrow bundle so every operation isn't a six-argument function;
/// still just borrows — no ownership, nothing stored beyond the call.
pub struct Api<'a> {
    pub thread: &'a mut ThreadState,
    pub global: &'a mut GlobalState,
}

impl<'a> Api<'a> {
    pub fn new(thread: &'a mut ThreadState, global: &'a mut GlobalState) -> Self {
        Self { thread, global }
    }

    fn func_base(&self) -> usize {
        self.thread.call_stack.last().map_or(0, |ci| ci.func)
    }

    /// Resolve a public index, including pseudo-indices. A `Capture`
    /// pseudo-index only resolves meaningfully while the currently
    /// executing frame is a host closure; callers needing upvalue access
    /// go through [`Self::upvalue`] instead.
    fn resolve(&self, index: i32) -> ResolvedIndex {
        self.thread.stack.resolve(index, self.func_base())
    }

    // -- Stack manipulation -----------------------------------------------

    #[must_use]
    pub fn top(&self) -> i32 {
        (self.thread.stack.top() - self.func_base()) as i32
    }

    pub fn set_top(&mut self, index: i32) {
        let base = self.func_base();
        let new_top = if index >= 0 { base + index as usize } else { self.thread.stack.top() - (-index as usize) };
        self.thread.stack.set_top(new_top);
    }

    pub fn check_stack(&mut self, n: i32) -> RuntimeResult<()> {
        self.thread.stack.ensure(n.max(0) as usize)
    }

    pub fn push_value(&mut self, index: i32) -> RuntimeResult<()> {
        let v = self.get(index);
        self.thread.stack.push(v)
    }

    pub fn pop(&mut self, n: i32) {
        let top = self.thread.stack.top();
        self.thread.stack.set_top(top.saturating_sub(n.max(0) as usize));
    }

    /// `lua_copy`: overwrite `to` with the value at `from`, without
    /// touching the stack top.
    pub fn copy(&mut self, from: i32, to: i32) {
        let v = self.get(from);
        self.set_at(to, v);
    }

    /// `lua_rotate`: rotate the `[index, top)` range by `n` places
    /// (`lapi.c lua_rotate`, implemented here as the equivalent of its
    /// "reverse three times" trick since that needs no scratch buffer).
    pub fn rotate(&mut self, index: i32, n: i32) {
        let ResolvedIndex::Slot(start) = self.resolve(index) else { return };
        let top = self.thread.stack.top();
        if start >= top {
            return;
        }
        let len = top - start;
        let n = n.rem_euclid(len as i32) as usize;
        if n == 0 {
            return;
        }
        let mut buf: Vec<Value> = (start..top).map(|i| self.thread.stack.get(i)).collect();
        buf.rotate_right(n);
        for (i, v) in buf.into_iter().enumerate() {
            self.thread.stack.set(start + i, v);
        }
    }

    /// Move `n` values from the top of `self`'s stack to `to`'s stack,
    /// both belonging to the same global state (`lapi.c lua_xmove`).
    pub fn xmove(&mut self, to: &mut ThreadState, n: usize) {
        let top = self.thread.stack.top();
        let values: Vec<Value> = (top - n..top).map(|i| self.thread.stack.get(i)).collect();
        self.thread.stack.set_top(top - n);
        for v in values {
            let _ = to.stack.push(v);
        }
    }

    // -- Readers ------------------------------------------------------------

    #[must_use]
    pub fn get(&self, index: i32) -> Value {
        match self.resolve(index) {
            ResolvedIndex::Slot(i) => self.thread.stack.get(i),
            ResolvedIndex::Registry => Value::Table(self.global.registry),
            ResolvedIndex::Capture(n) => self.upvalue_at(n),
        }
    }

    fn upvalue_at(&self, n: usize) -> Value {
        let Some(ci) = self.thread.call_stack.last() else { return Value::Nil };
        let callee = self.thread.stack.get(ci.func);
        let Value::Closure(r) = callee else { return Value::Nil };
        match self.global.gc.get(r) {
            Some(GcObject::Closure(crate::closure::Closure::Native { captures, .. })) => {
                captures.get(n.wrapping_sub(1)).copied().unwrap_or(Value::Nil)
            }
            _ => Value::Nil,
        }
    }

    fn set_at(&mut self, index: i32, value: Value) {
        if let ResolvedIndex::Slot(i) = self.resolve(index) {
            self.thread.stack.set(i, value);
        }
    }

    #[must_use]
    pub fn type_name(&self, index: i32) -> &'static str {
        self.get(index).type_name()
    }

    #[must_use]
    pub fn is_none(&self, index: i32) -> bool {
        matches!(self.resolve(index), ResolvedIndex::Slot(i) if i >= self.thread.stack.top())
    }

    #[must_use]
    pub fn is_nil(&self, index: i32) -> bool {
        self.get(index).is_nil()
    }

    #[must_use]
    pub fn is_none_or_nil(&self, index: i32) -> bool {
        self.is_none(index) || self.is_nil(index)
    }

    /// `lua_tonumberx`: accepts numbers and numeric strings, returns
    /// `None` otherwise.
    #[must_use]
    pub fn to_number(&self, index: i32) -> Option<f64> {
        match self.get(index) {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            Value::String(r) => std::str::from_utf8(self.global.gc.string_bytes(r)).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// `lua_tointegerx`: integers pass through; floats convert only if
    /// they have an exact integer representation, rejecting the rest
    /// (`lobject.h`'s `lua_numbertointeger`).
    #[must_use]
    pub fn to_integer(&self, index: i32) -> Option<i64> {
        match self.get(index) {
            Value::Int(i) => Some(i),
            Value::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Some(f as i64),
            Value::String(r) => {
                let s = std::str::from_utf8(self.global.gc.string_bytes(r)).ok()?.trim();
                s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn to_boolean(&self, index: i32) -> bool {
        self.get(index).is_truthy()
    }

    /// `lua_tolstring`: numbers are converted and the conversion is
    /// written back into the slot, matching `lapi.c`'s observable
    /// "may produce a new string value and mutate the slot". Non-string,
    /// non-number values return `None`.
    pub fn to_string(&mut self, index: i32) -> RuntimeResult<Option<Vec<u8>>> {
        let v = self.get(index);
        let bytes = match v {
            Value::String(r) => return Ok(Some(self.global.gc.string_bytes(r).to_vec())),
            Value::Int(i) => i.to_string().into_bytes(),
            Value::Float(f) => format_float(f).into_bytes(),
            _ => return Ok(None),
        };
        let r = self.global.gc.intern(&bytes);
        self.set_at(index, Value::String(r));
        Ok(Some(bytes))
    }

    /// `lua_rawlen`: array-sequence length for tables (raw, no
    /// metamethod), byte length for strings.
    #[must_use]
    pub fn raw_len(&self, index: i32) -> i64 {
        match self.get(index) {
            Value::String(r) => self.global.gc.string_bytes(r).len() as i64,
            Value::Table(r) => self
                .global
                .gc
                .get(r)
                .and_then(GcObject::as_table)
                .map_or(0, |t| t.length(self.global.gc.seed(), &self.global.gc)),
            _ => 0,
        }
    }

    #[must_use]
    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        self.global.gc.value_eq(&self.get(a), &self.get(b))
    }

    // -- Pushers ----------------------------------------------------------

    pub fn push_nil(&mut self) -> RuntimeResult<()> {
        self.thread.stack.push(Value::Nil)
    }

    pub fn push_bool(&mut self, b: bool) -> RuntimeResult<()> {
        self.thread.stack.push(Value::Bool(b))
    }

    pub fn push_int(&mut self, n: i64) -> RuntimeResult<()> {
        self.thread.stack.push(Value::Int(n))
    }

    pub fn push_float(&mut self, n: f64) -> RuntimeResult<()> {
        self.thread.stack.push(Value::Float(n))
    }

    pub fn push_string(&mut self, bytes: &[u8]) -> RuntimeResult<()> {
        let r = self.global.gc.intern(bytes);
        self.thread.stack.push(Value::String(r))
    }

    pub fn push_light_fn(&mut self, f: crate::value::LightFn) -> RuntimeResult<()> {
        self.thread.stack.push(Value::LightFn(f))
    }

    /// `lua_pushcclosure`: pop `n` values already pushed and bundle them
    /// as the closure's captures.
    pub fn push_closure(&mut self, func: crate::closure::NativeFn, n: usize) -> RuntimeResult<()> {
        if n as i32 > crate::stack::MAX_CLOSURE_CAPTURES {
            return Err(RuntimeError::runtime("too many upvalues"));
        }
        let top = self.thread.stack.top();
        let captures: Vec<Value> = (top - n..top).map(|i| self.thread.stack.get(i)).collect();
        self.thread.stack.set_top(top - n);
        let closure = crate::closure::Closure::Native { func, captures };
        let r = self.global.gc.alloc_closure(closure);
        self.thread.stack.push(Value::Closure(r))
    }

    pub fn new_table(&mut self) -> RuntimeResult<()> {
        self.new_table_sized(0, 0)
    }

    pub fn new_table_sized(&mut self, narray: usize, nhash: usize) -> RuntimeResult<()> {
        let r = self.global.gc.alloc_table(Table::with_capacity(narray, nhash));
        self.thread.stack.push(Value::Table(r))
    }

    /// `lua_pushthread`: pushes the main thread (this layer does not track
    /// each running `ThreadState`'s own `GcRef`, so it cannot distinguish
    /// "the thread currently executing" from "the main thread" the way
    /// `lapi.c` does — callers that need the former must carry their own
    /// `GcRef` alongside their `ThreadState`). Returns whether it is the
    /// main thread, which is always `true` here.
    pub fn push_thread(&mut self) -> bool {
        let _ = self.thread.stack.push(Value::Thread(self.global.main_thread));
        true
    }

    pub fn new_userdata<T: std::any::Any>(&mut self, data: T) -> RuntimeResult<()> {
        let r = self.global.gc.alloc_userdata(UserData { data: Box::new(data), metatable: None });
        self.thread.stack.push(Value::UserData(r))
    }

    // -- Table operations ---------------------------------------------------

    /// `lua_gettable`: `t[k]` with metamethods, where `t` is at `index`
    /// and `k` is on top of the stack, replaced in place by the result.
    pub fn get_table(&mut self, index: i32, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let table = self.get(index);
        let key = self.thread.stack.pop().unwrap_or(Value::Nil);
        let result = self.index_value(table, &key, executor)?;
        self.thread.stack.push(result)
    }

    pub fn get_field(&mut self, index: i32, name: &[u8], executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let table = self.get(index);
        let key = Value::String(self.global.gc.intern(name));
        let result = self.index_value(table, &key, executor)?;
        self.thread.stack.push(result)
    }

    pub fn get_index(&mut self, index: i32, n: i64, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let table = self.get(index);
        let result = self.index_value(table, &Value::Int(n), executor)?;
        self.thread.stack.push(result)
    }

    /// `meta::index` already walks the `__index` table chain internally;
    /// this only has to handle the one case it hands back for the caller
    /// to perform: a function metafield, called once with `(t, k)`.
    fn index_value(&mut self, table: Value, key: &Value, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<Value> {
        match meta::index(table, key, self.global)? {
            IndexStep::Value(v) => Ok(v),
            IndexStep::Call(f) => {
                let func_slot = self.thread.stack.top();
                self.thread.stack.push(f)?;
                self.thread.stack.push(table)?;
                self.thread.stack.push(*key)?;
                match callinfo::call(self.thread, self.global, executor, func_slot, 2, 1)? {
                    CallOutcome::Returned { .. } => Ok(self.thread.stack.pop().unwrap_or(Value::Nil)),
                    CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __index")),
                }
            }
        }
    }

    /// `lua_settable`: `t[k] = v`, `k` and `v` popped from the top of the
    /// stack (`v` then `k`, matching `lapi.c`'s order).
    pub fn set_table(&mut self, index: i32, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let table = self.get(index);
        let value = self.thread.stack.pop().unwrap_or(Value::Nil);
        let key = self.thread.stack.pop().unwrap_or(Value::Nil);
        self.new_index_value(table, key, value, executor)
    }

    pub fn set_field(&mut self, index: i32, name: &[u8], executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let table = self.get(index);
        let value = self.thread.stack.pop().unwrap_or(Value::Nil);
        let key = Value::String(self.global.gc.intern(name));
        self.new_index_value(table, key, value, executor)
    }

    fn new_index_value(&mut self, table: Value, key: Value, value: Value, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        if !key.is_valid_key() {
            return Err(RuntimeError::runtime("table index is nil or NaN"));
        }
        match meta::new_index(table, key, value, self.global)? {
            NewIndexStep::Done => Ok(()),
            NewIndexStep::Call(f) => {
                let func_slot = self.thread.stack.top();
                self.thread.stack.push(f)?;
                self.thread.stack.push(table)?;
                self.thread.stack.push(key)?;
                self.thread.stack.push(value)?;
                match callinfo::call(self.thread, self.global, executor, func_slot, 3, 0)? {
                    CallOutcome::Returned { .. } => Ok(()),
                    CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __newindex")),
                }
            }
        }
    }

    /// `lua_rawget`/`lua_rawset`: no metamethod dispatch at all.
    pub fn raw_get(&mut self, index: i32) {
        let key = self.thread.stack.pop().unwrap_or(Value::Nil);
        let v = self.raw_get_value(self.get(index), &key);
        let _ = self.thread.stack.push(v);
    }

    fn raw_get_value(&self, table: Value, key: &Value) -> Value {
        let Value::Table(r) = table else { return Value::Nil };
        self.global.gc.get(r).and_then(GcObject::as_table).map_or(Value::Nil, |t| t.get(key, self.global.gc.seed(), &self.global.gc))
    }

    pub fn raw_set(&mut self, index: i32) -> RuntimeResult<()> {
        let value = self.thread.stack.pop().unwrap_or(Value::Nil);
        let key = self.thread.stack.pop().unwrap_or(Value::Nil);
        if !key.is_valid_key() {
            return Err(RuntimeError::runtime("table index is nil or NaN"));
        }
        if let Value::Table(r) = self.get(index) {
            self.global.gc.table_set(r, key, value);
        }
        Ok(())
    }

    pub fn raw_get_index(&mut self, index: i32, n: i64) {
        let v = self.raw_get_value(self.get(index), &Value::Int(n));
        let _ = self.thread.stack.push(v);
    }

    pub fn raw_set_index(&mut self, index: i32, n: i64) {
        let value = self.thread.stack.pop().unwrap_or(Value::Nil);
        if let Value::Table(r) = self.get(index) {
            self.global.gc.table_set(r, Value::Int(n), value);
        }
    }

    pub fn get_metatable(&mut self, index: i32) -> bool {
        match meta::metatable_of(&self.get(index), self.global) {
            Some(mt) => {
                let _ = self.thread.stack.push(Value::Table(mt));
                true
            }
            None => false,
        }
    }

    /// `lua_setmetatable`: pops the metatable (or nil) from the top.
    pub fn set_metatable(&mut self, index: i32) -> RuntimeResult<()> {
        let mt = self.thread.stack.pop().unwrap_or(Value::Nil);
        let mt_ref = match mt {
            Value::Nil => None,
            Value::Table(r) => Some(r),
            _ => return Err(RuntimeError::runtime("bad argument to setmetatable (nil or table expected)")),
        };
        match self.get(index) {
            Value::Table(r) => {
                let mode = mt_ref.map(|m| self.weak_mode_of(m)).unwrap_or_default();
                if let Some(GcObject::Table(t)) = self.global.gc.get_mut(r) {
                    t.metatable = mt_ref;
                    t.invalidate_tag_methods();
                    t.weak_mode = mode;
                }
                if mode.is_weak() {
                    self.global.gc.register_weak_table(r);
                }
                Ok(())
            }
            Value::UserData(r) => {
                if let Some(GcObject::UserData(u)) = self.global.gc.get_mut(r) {
                    u.metatable = mt_ref;
                }
                Ok(())
            }
            _ => Err(RuntimeError::runtime("cannot set a metatable on this type")),
        }
    }

    /// Decode a `__mode` metafield.
    fn weak_mode_of(&mut self, mt: GcRef) -> crate::table::WeakMode {
        let name = self.global.gc.intern(b"__mode");
        let mode_str = match self.global.gc.get(mt).and_then(GcObject::as_table) {
            Some(t) => t.get(&Value::String(name), self.global.gc.seed(), &self.global.gc),
            None => return crate::table::WeakMode::default(),
        };
        let Value::String(r) = mode_str else { return crate::table::WeakMode::default() };
        let bytes = self.global.gc.string_bytes(r);
        crate::table::WeakMode {
            weak_keys: bytes.contains(&b'k'),
            weak_values: bytes.contains(&b'v'),
        }
    }

    // -- Calls ----------------------------------------------------------

    /// `lua_callk` without continuations: run to completion or propagate
    /// the error (never yields across this entry point).
    pub fn call(&mut self, nargs: i32, nresults: i32, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let func = self.thread.stack.top() - nargs as usize - 1;
        match callinfo::call(self.thread, self.global, executor, func, nargs as usize, nresults)? {
            CallOutcome::Returned { .. } => Ok(()),
            CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from a call with no continuation")),
        }
    }

    /// `lua_pcallk`: protected call. Returns the status code; on error
    /// the error object is left on top of the stack in place of the
    /// failed call's arguments.
    pub fn pcall(&mut self, nargs: i32, nresults: i32, executor: &mut dyn BytecodeExecutor) -> crate::error::StatusCode {
        let func = self.thread.stack.top() - nargs as usize - 1;
        match callinfo::call(self.thread, self.global, executor, func, nargs as usize, nresults) {
            Ok(CallOutcome::Returned { .. }) => crate::error::StatusCode::Ok,
            Ok(CallOutcome::Yielded) => crate::error::StatusCode::Yield,
            Err(e) => {
                let keep = self.thread.call_stack.iter().position(|ci| ci.func == func).map_or(0, |i| i + 1);
                self.thread.call_stack.truncate(keep);
                self.thread.stack.set_top(func);
                let status = e.status();
                let value = match &e {
                    RuntimeError::Memory => Value::String(self.global.memerrmsg),
                    other => Value::String(self.global.gc.intern(other.to_string().as_bytes())),
                };
                let _ = self.thread.stack.push(value);
                status
            }
        }
    }

    // -- Arithmetic, comparison, concat, length ----------------------------

    /// `lua_arith`: pop one or two operands (per `op`), push the result.
    pub fn arith(&mut self, op: ArithOp, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let result = if op.is_unary() {
            let a = self.thread.stack.pop().unwrap_or(Value::Nil);
            self.do_arith(op, a, Value::Nil, executor)?
        } else {
            let b = self.thread.stack.pop().unwrap_or(Value::Nil);
            let a = self.thread.stack.pop().unwrap_or(Value::Nil);
            self.do_arith(op, a, b, executor)?
        };
        self.thread.stack.push(result)
    }

    fn do_arith(&mut self, op: ArithOp, a: Value, b: Value, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<Value> {
        if let Some(v) = op.try_numeric(a, b) {
            return Ok(v);
        }
        let handler = meta::binary_handler(&a, &b, op.tag(), self.global);
        if handler.is_nil() {
            return Err(RuntimeError::runtime(format!("attempt to perform arithmetic on a {} value", a.type_name())));
        }
        let func_slot = self.thread.stack.top();
        self.thread.stack.push(handler)?;
        self.thread.stack.push(a)?;
        self.thread.stack.push(b)?;
        match callinfo::call(self.thread, self.global, executor, func_slot, 2, 1)? {
            CallOutcome::Returned { .. } => Ok(self.thread.stack.pop().unwrap_or(Value::Nil)),
            CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from an arithmetic metamethod")),
        }
    }

    /// `lua_compare`: `LUA_OPEQ`/`LUA_OPLT`/`LUA_OPLE`, metamethod-aware.
    pub fn compare(&mut self, a_idx: i32, b_idx: i32, op: CompareOp, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<bool> {
        let a = self.get(a_idx);
        let b = self.get(b_idx);
        match op {
            CompareOp::Eq => self.values_equal(a, b, executor),
            CompareOp::Lt => self.order(a, b, Tag::Lt, executor, |x, y| x < y, |x, y| x < y),
            CompareOp::Le => self.order(a, b, Tag::Le, executor, |x, y| x <= y, |x, y| x <= y),
        }
    }

    fn values_equal(&mut self, a: Value, b: Value, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<bool> {
        if self.global.gc.value_eq(&a, &b) {
            return Ok(true);
        }
        let Some(handler) = meta::eq_handler(&a, &b, self.global) else { return Ok(false) };
        let func_slot = self.thread.stack.top();
        self.thread.stack.push(handler)?;
        self.thread.stack.push(a)?;
        self.thread.stack.push(b)?;
        match callinfo::call(self.thread, self.global, executor, func_slot, 2, 1)? {
            CallOutcome::Returned { .. } => Ok(self.thread.stack.pop().unwrap_or(Value::Nil).is_truthy()),
            CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __eq")),
        }
    }

    fn order(
        &mut self,
        a: Value,
        b: Value,
        tag: Tag,
        executor: &mut dyn BytecodeExecutor,
        int_op: fn(i64, i64) -> bool,
        float_op: fn(f64, f64) -> bool,
    ) -> RuntimeResult<bool> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => return Ok(int_op(x, y)),
            (Value::Int(x), Value::Float(y)) => return Ok(float_op(x as f64, y)),
            (Value::Float(x), Value::Int(y)) => return Ok(float_op(x, y as f64)),
            (Value::Float(x), Value::Float(y)) => return Ok(float_op(x, y)),
            (Value::String(x), Value::String(y)) => {
                return Ok(float_op_bytes(self.global.gc.string_bytes(x), self.global.gc.string_bytes(y), int_op))
            }
            _ => {}
        }
        let handler = meta::binary_handler(&a, &b, tag, self.global);
        if handler.is_nil() {
            return Err(RuntimeError::runtime(format!("attempt to compare two {} values", a.type_name())));
        }
        let func_slot = self.thread.stack.top();
        self.thread.stack.push(handler)?;
        self.thread.stack.push(a)?;
        self.thread.stack.push(b)?;
        match callinfo::call(self.thread, self.global, executor, func_slot, 2, 1)? {
            CallOutcome::Returned { .. } => Ok(self.thread.stack.pop().unwrap_or(Value::Nil).is_truthy()),
            CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from a comparison metamethod")),
        }
    }

    /// `lua_concat`: pop `n` values, concatenate right-to-left (adjacent
    /// pairs go through `__concat` when either side isn't string/number),
    /// push one result.
    pub fn concat(&mut self, n: usize, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        if n == 0 {
            return self.push_string(b"");
        }
        let top = self.thread.stack.top();
        let mut acc = self.thread.stack.get(top - 1);
        for i in (0..n - 1).rev() {
            let left = self.thread.stack.get(top - n + i);
            acc = self.concat_pair(left, acc, executor)?;
        }
        self.thread.stack.set_top(top - n);
        self.thread.stack.push(acc)
    }

    fn concat_pair(&mut self, a: Value, b: Value, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<Value> {
        if let (Some(sa), Some(sb)) = (self.coerce_concat_bytes(a), self.coerce_concat_bytes(b)) {
            let mut bytes = sa;
            bytes.extend_from_slice(&sb);
            return Ok(Value::String(self.global.gc.intern(&bytes)));
        }
        let handler = meta::binary_handler(&a, &b, Tag::Concat, self.global);
        if handler.is_nil() {
            let bad = if self.coerce_concat_bytes(a).is_none() { a } else { b };
            return Err(RuntimeError::runtime(format!("attempt to concatenate a {} value", bad.type_name())));
        }
        let func_slot = self.thread.stack.top();
        self.thread.stack.push(handler)?;
        self.thread.stack.push(a)?;
        self.thread.stack.push(b)?;
        match callinfo::call(self.thread, self.global, executor, func_slot, 2, 1)? {
            CallOutcome::Returned { .. } => Ok(self.thread.stack.pop().unwrap_or(Value::Nil)),
            CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __concat")),
        }
    }

    fn coerce_concat_bytes(&self, v: Value) -> Option<Vec<u8>> {
        match v {
            Value::String(r) => Some(self.global.gc.string_bytes(r).to_vec()),
            Value::Int(i) => Some(i.to_string().into_bytes()),
            Value::Float(f) => Some(format_float(f).into_bytes()),
            _ => None,
        }
    }

    /// `lua_len`: `#v`, metamethod-aware (raw length for strings and
    /// metamethod-free tables, `__len` otherwise).
    pub fn length(&mut self, index: i32, executor: &mut dyn BytecodeExecutor) -> RuntimeResult<()> {
        let v = self.get(index);
        let handler = meta::get_metamethod(&v, Tag::Len, self.global);
        if !handler.is_nil() {
            let func_slot = self.thread.stack.top();
            self.thread.stack.push(handler)?;
            self.thread.stack.push(v)?;
            return match callinfo::call(self.thread, self.global, executor, func_slot, 1, 1)? {
                CallOutcome::Returned { .. } => Ok(()),
                CallOutcome::Yielded => Err(RuntimeError::runtime("attempt to yield from __len")),
            };
        }
        match v {
            Value::String(r) => self.push_int(self.global.gc.string_bytes(r).len() as i64),
            Value::Table(_) => {
                let n = self.raw_len(index);
                self.push_int(n)
            }
            _ => Err(RuntimeError::runtime(format!("attempt to get length of a {} value", v.type_name()))),
        }
    }

    // -- `next` ------------------------------------------------------------

    /// `lua_next`: pops a key, pushes the next key and value if any,
    /// returns whether traversal continues.
    pub fn next(&mut self, index: i32) -> RuntimeResult<bool> {
        let key = self.thread.stack.pop().unwrap_or(Value::Nil);
        let Value::Table(r) = self.get(index) else {
            return Err(RuntimeError::runtime("bad argument to 'next' (table expected)"));
        };
        let seed = self.global.gc.seed();
        let next = self.global.gc.get(r).and_then(GcObject::as_table).and_then(|t| t.next(&key, seed, &self.global.gc));
        match next {
            Some((k, v)) => {
                self.thread.stack.push(k)?;
                self.thread.stack.push(v)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -- GC control ----------------------------------------------------------

    pub fn gc(&mut self, control: GcControl) -> i64 {
        match control {
            GcControl::Stop => {
                self.global.gc.gc_running = false;
                0
            }
            GcControl::Restart => {
                self.global.gc.gc_running = true;
                0
            }
            GcControl::Collect => {
                let roots = self.global.roots();
                self.global.gc.full_collect(|| roots);
                0
            }
            GcControl::Count => (self.global.gc.bytes_allocated() >> 10) as i64,
            GcControl::Step => {
                let roots = self.global.roots();
                let was_running = self.global.gc.gc_running;
                self.global.gc.gc_running = true;
                self.global.gc.checkpoint(|| roots);
                self.global.gc.gc_running = was_running;
                i64::from(self.global.gc.state == crate::gc::GcState::Pause)
            }
            GcControl::SetPause(p) => {
                let old = self.global.gc.config.pause_percent;
                self.global.gc.config.pause_percent = p;
                i64::from(old)
            }
            GcControl::SetStepMul(m) => {
                let old = self.global.gc.config.step_multiplier;
                self.global.gc.config.step_multiplier = m.max(40);
                i64::from(old)
            }
            GcControl::IsRunning => i64::from(self.global.gc.gc_running),
        }
    }

    /// `lua_error`: raise the value on top of the stack as a runtime
    /// error.
    pub fn error(&mut self) -> RuntimeError {
        let v = self.thread.stack.pop().unwrap_or(Value::Nil);
        let msg = match v {
            Value::String(r) => String::from_utf8_lossy(self.global.gc.string_bytes(r)).into_owned(),
            other => format!("(error object is a {} value)", other.type_name()),
        };
        RuntimeError::runtime(msg)
    }
}

fn float_op_bytes(a: &[u8], b: &[u8], int_op: fn(i64, i64) -> bool) -> bool {
    // Byte-lexicographic order, reusing `int_op`'s direction (`< or <=`) by
    // comparing the `Ordering` it would give integers to.
    match a.cmp(b) {
        std::cmp::Ordering::Less => int_op(0, 1),
        std::cmp::Ordering::Equal => int_op(0, 0),
        std::cmp::Ordering::Greater => int_op(1, 0),
    }
}

/// `tostring` float formatting: integral floats get a trailing `.0` so
/// `tostring(1.0)` round-trips as a float, not `"1"`.
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Arithmetic operators `lua_arith`'s `op` enumerates (`ltm.h`'s
/// `TM_ADD..TM_BNOT`, minus the comparison/concat ones handled
/// separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

impl ArithOp {
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::Unm | Self::BNot)
    }

    const fn tag(self) -> Tag {
        match self {
            Self::Add => Tag::Add,
            Self::Sub => Tag::Sub,
            Self::Mul => Tag::Mul,
            Self::Mod => Tag::Mod,
            Self::Pow => Tag::Pow,
            Self::Div => Tag::Div,
            Self::IDiv => Tag::IDiv,
            Self::BAnd => Tag::BAnd,
            Self::BOr => Tag::BOr,
            Self::BXor => Tag::BXor,
            Self::Shl => Tag::Shl,
            Self::Shr => Tag::Shr,
            Self::Unm => Tag::Unm,
            Self::BNot => Tag::BNot,
        }
    }

    /// Direct numeric evaluation when both operands are numbers (or, for
    /// the bitwise ops, integer-valued); `None` falls through to
    /// metamethod dispatch.
    fn try_numeric(self, a: Value, b: Value) -> Option<Value> {
        use ArithOp::{Add, BAnd, BNot, BOr, BXor, Div, IDiv, Mod, Mul, Pow, Shl, Shr, Sub, Unm};
        if self.is_unary() {
            return match (self, a) {
                (Unm, Value::Int(x)) => Some(Value::Int(x.wrapping_neg())),
                (Unm, Value::Float(x)) => Some(Value::Float(-x)),
                (BNot, Value::Int(x)) => Some(Value::Int(!x)),
                (BNot, Value::Float(x)) if x.fract() == 0.0 => Some(Value::Int(!(x as i64))),
                _ => None,
            };
        }
        match (self, a, b) {
            (Add, Value::Int(x), Value::Int(y)) => Some(Value::Int(x.wrapping_add(y))),
            (Sub, Value::Int(x), Value::Int(y)) => Some(Value::Int(x.wrapping_sub(y))),
            (Mul, Value::Int(x), Value::Int(y)) => Some(Value::Int(x.wrapping_mul(y))),
            (Mod, Value::Int(x), Value::Int(y)) if y != 0 => Some(Value::Int(x.rem_euclid(y))),
            (IDiv, Value::Int(x), Value::Int(y)) if y != 0 => Some(Value::Int(x.div_euclid(y))),
            (BAnd, a, b) => exact_int_pair(a, b).map(|(x, y)| Value::Int(x & y)),
            (BOr, a, b) => exact_int_pair(a, b).map(|(x, y)| Value::Int(x | y)),
            (BXor, a, b) => exact_int_pair(a, b).map(|(x, y)| Value::Int(x ^ y)),
            (Shl, a, b) => exact_int_pair(a, b).map(|(x, y)| Value::Int(shift(x, y))),
            (Shr, a, b) => exact_int_pair(a, b).map(|(x, y)| Value::Int(shift(x, -y))),
            (Add, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x + y)),
            (Sub, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x - y)),
            (Mul, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x * y)),
            (Div, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x / y)),
            (Mod, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x - (x / y).floor() * y)),
            (Pow, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float(x.powf(y))),
            (IDiv, a, b) => numeric_pair(a, b).map(|(x, y)| Value::Float((x / y).floor())),
            _ => None,
        }
    }
}

fn shift(x: i64, by: i64) -> i64 {
    if by <= -64 || by >= 64 {
        0
    } else if by >= 0 {
        ((x as u64) << by) as i64
    } else {
        ((x as u64) >> -by) as i64
    }
}

/// Bitwise operands coerce through the same "float with an exact integer
/// value" rule as table keys (`lvm.c`'s `luaV_tointeger`): `2.0 & 3` is
/// `2 & 3`, but `2.5 & 3` has no bitwise meaning and falls through to a
/// metamethod (or an error).
fn exact_int_pair(a: Value, b: Value) -> Option<(i64, i64)> {
    Some((exact_int(a)?, exact_int(b)?))
}

fn exact_int(v: Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(i),
        Value::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

fn numeric_pair(a: Value, b: Value) -> Option<(f64, f64)> {
    let x = match a {
        Value::Int(i) => i as f64,
        Value::Float(f) => f,
        _ => return None,
    };
    let y = match b {
        Value::Int(i) => i as f64,
        Value::Float(f) => f,
        _ => return None,
    };
    Some((x, y))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}
