//! The narrow contract between this crate and an embedder's bytecode
//! interpreter loop.
//!
//! The lexer, parser, code generator, and the opcode dispatch loop itself
//! live outside this crate. Everything in here that needs to "run a
//! scripted closure until it returns, yields, or errors" does so through
//! this one trait, so the runtime core is usable without an embedder ever
//! supplying a real compiler — tests in this crate use a trivial executor
//! that runs a hand-built `Proto` with no real opcodes.

use crate::callinfo::CallOutcome;
use crate::error::RuntimeResult;
use crate::state::GlobalState;
use crate::thread::ThreadState;

/// Implemented by the embedder's interpreter loop. `run` is invoked with
/// the scripted call frame already pushed onto `thread.call_stack` (see
/// `crate::callinfo::call`) and must drive it — and any further calls it
/// makes — to completion, a yield, or an error.
pub trait BytecodeExecutor {
    /// Execute starting at the top frame of `thread.call_stack` until that
    /// frame (and everything it called) returns, yields, or raises.
    fn run(&mut self, thread: &mut ThreadState, global: &mut GlobalState) -> RuntimeResult<CallOutcome>;
}

/// An executor that cannot run any scripted code: every `Proto::code` it
/// is asked to run is assumed empty, so it immediately returns zero
/// results. Useful for exercising the host-interface / table / GC surface
/// of this crate without pulling in a real compiler.
#[derive(Debug, Default)]
pub struct NullExecutor;

impl BytecodeExecutor for NullExecutor {
    #[expect(
        clippy::expect_used,
        reason = "called only with the scripted frame already pushed by \
                  crate::callinfo::call; an empty call_stack means the embedder \
                  invoked this executor outside that contract"
    )]
    fn run(&mut self, thread: &mut ThreadState, _global: &mut GlobalState) -> RuntimeResult<CallOutcome> {
        let ci = thread.call_stack.pop().expect("run called with no active frame");
        crate::callinfo::post_call(thread, ci.func, ci.nresults, 0)
    }
}
