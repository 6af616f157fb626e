//! Introspection surface: call-stack walking, per-frame info, and the
//! hook mechanism.

#[cfg(test)]
mod debug_test;

use crate::api::Api;
use crate::closure::Closure;
use crate::object::GcObject;
use crate::thread::ThreadState;
use crate::value::Value;

bitflags::bitflags! {
    /// `lua.h`'s `LUA_MASKCALL`/`LUA_MASKRET`/`LUA_MASKLINE`/`LUA_MASKCOUNT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HookMask: u8 {
        const CALL  = 1 << 0;
        const RETURN = 1 << 1;
        const LINE  = 1 << 2;
        const COUNT = 1 << 3;
    }
}

/// `lua.h`'s `LUA_HOOKCALL`/`LUA_HOOKRET`/`LUA_HOOKLINE`/`LUA_HOOKCOUNT`/
/// `LUA_HOOKTAILCALL`, the event passed to the installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Call,
    TailCall,
    Return,
    Line(u32),
    Count,
}

pub type HookFn = fn(&mut ThreadState, &mut crate::state::GlobalState, HookEvent);

/// Per-thread hook registration, kept here rather than on `ThreadState`
/// since only code that actually installs hooks needs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookConfig {
    pub hook: Option<HookFn>,
    pub mask: HookMask,
    pub count: i32,
}

impl Default for HookMask {
    fn default() -> Self {
        Self::empty()
    }
}

/// One frame's worth of introspectable info, `lua_Debug`-equivalent
/// (`ldebug.c`'s `auxgetinfo`/`funcinfo`). Fields are populated lazily by
/// [`Self::for_level`] rather than via a `what` format string, since Rust
/// has no variadic "fields you asked for" convention to mirror it with.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Call-stack depth, 0 = currently executing frame (`lua_getstack`'s
    /// `level`).
    pub level: usize,
    pub source: Option<std::rc::Rc<str>>,
    pub current_line: Option<u32>,
    pub line_defined: Option<u32>,
    pub last_line_defined: Option<u32>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub is_tail_call: bool,
    /// Best-effort name for the called function (`ldebug.c
    /// getfuncname`'s heuristic, based on how the caller invoked it — not
    /// attempted here since that requires decoding the caller's bytecode;
    /// left `None` until a `BytecodeExecutor` can supply it).
    pub name: Option<String>,
    pub what: &'static str,
}

/// `lua_getstack` + `lua_getinfo` combined: walk `level` frames up from
/// the currently executing one and describe what's there.
#[must_use]
pub fn frame_info(api: &Api<'_>, level: usize) -> Option<FrameInfo> {
    let depth = api.thread.call_stack.len();
    if level >= depth {
        return None;
    }
    let ci = &api.thread.call_stack[depth - 1 - level];
    let callee = api.thread.stack.get(ci.func);
    let mut info = FrameInfo { level, is_tail_call: ci.status.contains(crate::callinfo::CallStatus::TAILCALL), ..Default::default() };
    match callee {
        Value::Closure(r) => match api.global.gc.get(r).and_then(GcObject::as_closure) {
            Some(Closure::Scripted { proto, .. }) => {
                info.source = Some(proto.source_name.clone());
                info.line_defined = Some(proto.line_defined);
                info.last_line_defined = Some(proto.last_line_defined);
                info.num_params = proto.num_params;
                info.is_vararg = proto.is_vararg;
                info.what = "Lua";
                info.current_line = proto.debug.lines.get(ci.saved_pc).copied();
            }
            Some(Closure::Native { .. }) => {
                info.what = "C";
            }
            None => {}
        },
        Value::LightFn(_) => info.what = "C",
        _ => info.what = "?",
    }
    Some(info)
}

/// `lua_getlocal`: the name and current value of local slot `n` (1-based)
/// in the frame at `level`, if it's alive at the frame's current pc
/// (`ldebug.c findlocal`, simplified to the whole-frame lifetime — this
/// crate's `ProtoDebug::local_names` doesn't carry register reuse info
/// finer than a [start_pc, end_pc) range, which is exactly what's stored).
#[must_use]
pub fn local(api: &Api<'_>, level: usize, n: usize) -> Option<(String, Value)> {
    let depth = api.thread.call_stack.len();
    if level >= depth || n == 0 {
        return None;
    }
    let ci = &api.thread.call_stack[depth - 1 - level];
    let callee = api.thread.stack.get(ci.func);
    let Value::Closure(r) = callee else { return None };
    let Some(Closure::Scripted { proto, .. }) = api.global.gc.get(r).and_then(GcObject::as_closure) else { return None };
    let pc = ci.saved_pc as u32;
    let mut count = 0;
    for (name, start_pc, end_pc) in &proto.debug.local_names {
        if *start_pc <= pc && pc < *end_pc {
            count += 1;
            if count == n {
                let slot = ci.base + n - 1;
                let value = if slot < api.thread.stack.top() { api.thread.stack.get(slot) } else { Value::Nil };
                return Some((name.to_string(), value));
            }
        }
    }
    None
}

/// Human-readable `chunkname:line` prefix `ldebug.c addinfo` attaches to
/// runtime error messages raised from scripted code.
#[must_use]
pub fn current_location(api: &Api<'_>) -> crate::error::SourceLocation {
    match frame_info(api, 0) {
        Some(info) => crate::error::SourceLocation {
            chunk: info.source.map(|s| s.to_string()),
            line: info.current_line,
        },
        None => crate::error::SourceLocation::default(),
    }
}

/// Fire `event` through the installed hook, honoring its mask
/// (`ldebug.c luaG_traceexec`'s dispatch, minus the per-line/per-count
/// bookkeeping an executor drives directly since it alone knows the pc).
pub fn dispatch_hook(
    config: &HookConfig,
    thread: &mut ThreadState,
    global: &mut crate::state::GlobalState,
    event: HookEvent,
) {
    let Some(hook) = config.hook else { return };
    let bit = match event {
        HookEvent::Call | HookEvent::TailCall => HookMask::CALL,
        HookEvent::Return => HookMask::RETURN,
        HookEvent::Line(_) => HookMask::LINE,
        HookEvent::Count => HookMask::COUNT,
    };
    if config.mask.contains(bit) {
        hook(thread, global, event);
    }
}
