//! Call frames and the call/pcall/tailcall protocols.

use crate::closure::Closure;
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::BytecodeExecutor;
use crate::stack::{ResolvedIndex, MULTRET};
use crate::state::GlobalState;
use crate::thread::ThreadState;
use crate::value::Value;

bitflags::bitflags! {
    /// Per-frame status bits, checked in the hottest path in the runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallStatus: u8 {
        const YIELDABLE = 1 << 0;
        const TAILCALL  = 1 << 1;
        const PROTECTED = 1 << 2;
        const FINALIZER = 1 << 3;
    }
}

/// One entry in a thread's call chain. Kept as a growable `Vec` rather
/// than an intrusive doubly-linked list: this crate's arena-of-indices
/// posture extends naturally to an array-indexed call stack, and it keeps
/// frames contiguous and cheap to index by depth.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Stack index of the function value being called.
    pub func: usize,
    /// First argument / local-variable slot.
    pub base: usize,
    /// This frame's `top`, restored into the thread's stack on return.
    pub top: usize,
    /// Requested result count; `MULTRET` means "keep everything".
    pub nresults: i32,
    /// Resume point for a scripted frame (meaningless for native ones,
    /// interpreted by whatever `BytecodeExecutor` the embedder supplies).
    pub saved_pc: usize,
    pub status: CallStatus,
}

impl CallInfo {
    #[must_use]
    pub fn is_yieldable(&self) -> bool {
        self.status.contains(CallStatus::YIELDABLE)
    }
}

/// What a call produced, from the caller's point of view.
pub enum CallOutcome {
    /// The call ran to completion; `nresults` values are on the stack
    /// starting at the frame's `func` slot.
    Returned { nresults: usize },
    /// The callee (or something it called) yielded; the thread is now
    /// suspended with this frame still on the chain.
    Yielded,
}

/// Call a function: caller has already pushed the function followed by
/// `nargs` arguments starting at stack index `func`.
pub fn call(
    thread: &mut ThreadState,
    global: &mut GlobalState,
    executor: &mut dyn BytecodeExecutor,
    func: usize,
    nargs: usize,
    nresults: i32,
) -> RuntimeResult<CallOutcome> {
    let callee = thread.stack.get(func);
    let base = func + 1;

    match callee {
        Value::LightFn(f) => {
            thread.stack.ensure(crate::stack::MIN_STACK)?;
            push_frame(thread, func, base, base + nargs, nresults, false);
            let produced = f(thread, global);
            finish_native_call(thread, func, nresults, produced.max(0) as usize)
        }
        Value::Closure(r) => {
            let obj = global.gc.get(r).ok_or_else(|| RuntimeError::runtime("call to a freed closure"))?;
            let closure = obj.as_closure().ok_or_else(|| RuntimeError::runtime("attempt to call a non-function"))?;
            match closure {
                Closure::Native { func: f, .. } => {
                    let f = *f;
                    thread.stack.ensure(crate::stack::MIN_STACK)?;
                    push_frame(thread, func, base, base + nargs, nresults, false);
                    let produced = f(thread, global)?;
                    finish_native_call(thread, func, nresults, produced.max(0) as usize)
                }
                Closure::Scripted { proto, .. } => {
                    let max_stack = proto.max_stack_size as usize;
                    thread.stack.ensure(max_stack + crate::stack::MIN_STACK)?;
                    push_frame(thread, func, base, base + max_stack, nresults, true);
                    executor.run(thread, global)
                }
            }
        }
        _ => Err(RuntimeError::runtime(format!(
            "attempt to call a {} value",
            callee.type_name()
        ))),
    }
}

fn push_frame(thread: &mut ThreadState, func: usize, base: usize, top: usize, nresults: i32, yieldable: bool) {
    let mut status = CallStatus::empty();
    if yieldable {
        status.insert(CallStatus::YIELDABLE);
    }
    thread.call_stack.push(CallInfo { func, base, top, nresults, saved_pc: 0, status });
    thread.stack.set_top(top);
}

fn finish_native_call(
    thread: &mut ThreadState,
    func: usize,
    nresults: i32,
    produced: usize,
) -> RuntimeResult<CallOutcome> {
    thread.call_stack.pop();
    post_call(thread, func, nresults, produced)
}

/// Post-call: move results down to the original `func` slot, padding with
/// nil if `nresults` is fixed and short, or leaving everything if
/// `nresults == MULTRET`.
pub fn post_call(thread: &mut ThreadState, func: usize, nresults: i32, produced: usize) -> RuntimeResult<CallOutcome> {
    let results_at = thread.stack.top() - produced;
    thread.stack.copy_down(results_at, func, produced);

    let final_count = if nresults == MULTRET {
        produced
    } else {
        nresults.max(0) as usize
    };
    thread.stack.set_top(func + final_count);
    if final_count > produced {
        for i in produced..final_count {
            thread.stack.set(func + i, Value::Nil);
        }
    }
    Ok(CallOutcome::Returned { nresults: final_count })
}

/// Protected call: run `body`, and on error restore the
/// stack to `func` and leave the error value there instead of unwinding
/// further, returning the matching status code. `to_value` turns the
/// caught `RuntimeError` into a pushable [`Value`] — only the caller
/// (`crate::api`) has `Gc` access to allocate an error string, so this
/// layer stays allocation-agnostic.
pub fn pcall(
    thread: &mut ThreadState,
    func: usize,
    body: impl FnOnce(&mut ThreadState) -> RuntimeResult<CallOutcome>,
    to_value: impl FnOnce(&RuntimeError) -> Value,
) -> CallOutcome {
    match body(thread) {
        Ok(outcome) => outcome,
        Err(e) => {
            thread.call_stack.truncate(
                thread
                    .call_stack
                    .iter()
                    .position(|ci| ci.func == func)
                    .map_or(0, |i| i + 1),
            );
            thread.stack.set_top(func);
            let value = to_value(&e);
            let _ = thread.stack.push(value);
            CallOutcome::Returned { nresults: 1 }
        }
    }
}

/// Tail calls: reuse the current frame. Arguments are
/// moved down to the frame's `func` slot and no new `CallInfo` is pushed,
/// so the scripted call chain does not grow across a tail-recursive loop.
#[expect(
    clippy::expect_used,
    reason = "only reachable from opcode dispatch for a frame already on \
              call_stack; an empty stack here means the executor called this \
              without a frame to tail-call from, which is a caller bug"
)]
pub fn tailcall_prepare(thread: &mut ThreadState, from: usize, nargs: usize) {
    let ci = thread.call_stack.last().expect("tailcall requires an active frame");
    let func = ci.func;
    thread.stack.copy_down(from, func, nargs + 1);
    thread.stack.set_top(func + nargs + 1);
    if let Some(ci) = thread.call_stack.last_mut() {
        ci.status.insert(CallStatus::TAILCALL);
        ci.saved_pc = 0;
    }
}

/// Resolve a public API index against the currently executing frame.
#[must_use]
pub fn current_resolve(thread: &ThreadState, index: i32) -> ResolvedIndex {
    let base = thread.call_stack.last().map_or(0, |ci| ci.func);
    thread.stack.resolve(index, base)
}
