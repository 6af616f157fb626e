//! Coroutine resume/yield transitions.
//!
//! A thread lives in [`crate::gc::Gc`]'s arena like any other collectable
//! object, so driving it means temporarily taking it out of its slot (the
//! same swap-out-then-back trick [`crate::gc::Gc::table_set`] uses for
//! tables, since the arena can't hand out an aliasing `&mut` alongside
//! `&mut GlobalState`), running it, and putting it back.

#[cfg(test)]
mod coroutine_test;

use crate::callinfo::{self, CallOutcome};
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::BytecodeExecutor;
use crate::object::{GcObject, GcRef};
use crate::stack::MULTRET;
use crate::state::GlobalState;
use crate::thread::{ThreadState, ThreadStatus};
use crate::value::Value;

/// What a `resume` call produced, from the resumer's point of view.
#[derive(Debug)]
pub enum ResumeOutcome {
    Yielded(Vec<Value>),
    Returned(Vec<Value>),
    Errored(RuntimeError),
}

/// Resume a suspended thread, passing `nargs` values from `from`.
///
/// For a thread's *first* resume, the embedder must already have pushed
/// the closure to call onto the resumee's own stack (slot 0) — e.g. via
/// [`crate::api::Api::xmove`] right after creating it — exactly as a host
/// using the real stack-mediated interface would; `nargs` values are then
/// transferred from `from`'s top into the resumee above that closure. For
/// every later resume (continuing after a yield), `nargs` values are
/// transferred the same way and become the result of the `yield` call the
/// resumee is suspended in.
pub fn resume(
    thread_ref: GcRef,
    from: &mut ThreadState,
    global: &mut GlobalState,
    executor: &mut dyn BytecodeExecutor,
    nargs: usize,
) -> ResumeOutcome {
    let status = global.gc.get(thread_ref).and_then(GcObject::as_thread).map(|t| t.status);
    if !matches!(status, Some(ThreadStatus::Suspended)) {
        let message = match status {
            Some(ThreadStatus::Dead) | None => "cannot resume dead coroutine",
            Some(ThreadStatus::Running | ThreadStatus::Normal) => "cannot resume non-suspended coroutine",
            Some(ThreadStatus::Suspended) => unreachable!("checked above"),
        };
        return ResumeOutcome::Errored(RuntimeError::runtime(message));
    }

    let top = from.stack.top();
    let args: Vec<Value> = (top - nargs..top).map(|i| from.stack.get(i)).collect();
    from.stack.set_top(top - nargs);

    let Some(mut resumee) = take_thread(global, thread_ref) else {
        return ResumeOutcome::Errored(RuntimeError::runtime("cannot resume dead coroutine"));
    };
    resumee.status = ThreadStatus::Running;
    resumee.resumed_by = Some(thread_ref);
    for v in args {
        let _ = resumee.stack.push(v);
    }

    let outcome = if resumee.has_started {
        executor.run(&mut resumee, global)
    } else {
        resumee.has_started = true;
        let nargs_now = resumee.stack.top() - 1;
        callinfo::call(&mut resumee, global, executor, 0, nargs_now, MULTRET)
    };

    let result = match outcome {
        Ok(CallOutcome::Returned { nresults }) => {
            let top = resumee.stack.top();
            let values: Vec<Value> = (top - nresults..top).map(|i| resumee.stack.get(i)).collect();
            resumee.status = ThreadStatus::Dead;
            ResumeOutcome::Returned(values)
        }
        Ok(CallOutcome::Yielded) => {
            let n = resumee.pending_yield;
            let top = resumee.stack.top();
            let values: Vec<Value> = (top - n..top).map(|i| resumee.stack.get(i)).collect();
            resumee.status = ThreadStatus::Suspended;
            ResumeOutcome::Yielded(values)
        }
        Err(e) => {
            resumee.status = ThreadStatus::Dead;
            ResumeOutcome::Errored(e)
        }
    };

    put_thread(global, thread_ref, resumee);
    result
}

/// Yield from the currently running thread: legal only if the nearest
/// non-host frame allows yielding. `nresults` values must already be on top of
/// `thread`'s own stack (the calling convention every other multi-result
/// operation in this crate uses); `resume` reads them back off after the
/// executor returns `CallOutcome::Yielded`.
pub fn suspend(thread: &mut ThreadState, nresults: usize) -> RuntimeResult<CallOutcome> {
    if !thread.is_yieldable_here() {
        return Err(RuntimeError::runtime("attempt to yield from outside a coroutine"));
    }
    thread.pending_yield = nresults;
    Ok(CallOutcome::Yielded)
}

/// Swap `r`'s [`ThreadState`] out of the arena, leaving a throwaway
/// placeholder behind until [`put_thread`] restores the real one. Returns
/// `None` if `r` no longer names a live thread.
fn take_thread(global: &mut GlobalState, r: GcRef) -> Option<ThreadState> {
    let obj = global.gc.get_mut(r)?;
    if !matches!(obj, GcObject::Thread(_)) {
        return None;
    }
    let placeholder = ThreadState::new(crate::thread::ThreadId(u32::MAX), 0, 0);
    let GcObject::Thread(thread) = std::mem::replace(obj, GcObject::Thread(placeholder)) else {
        unreachable!("checked above")
    };
    Some(thread)
}

fn put_thread(global: &mut GlobalState, r: GcRef, thread: ThreadState) {
    if let Some(obj) = global.gc.get_mut(r) {
        *obj = GcObject::Thread(thread);
    }
}
