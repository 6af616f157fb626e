//! Closures and the bytecode prototypes they're built from.
//!
//! A [`Proto`] is the "compiled function" an external lexer/parser/codegen
//! collaborator produces; this crate only needs its shape, not how it got
//! built. [`executor::BytecodeExecutor`] is the trait an embedder implements
//! to actually run `Proto::code`.

use std::rc::Rc;

use crate::upvalue::Upvalue;
use crate::value::Value;

/// Where a closure's upvalue descriptor points: a slot in the immediately
/// enclosing stack frame, or an upvalue the enclosing closure already
/// holds and simply passes through.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueDesc {
    InStack { frame_relative_slot: usize },
    Outer { enclosing_index: usize },
}

/// A compiled function body: constants, upvalue descriptors, nested
/// prototypes, and opaque bytecode plus optional debug info — the shape a
/// precompiled-chunk dump/load format would serialize.
#[derive(Debug)]
pub struct Proto {
    pub source_name: Rc<str>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    /// Opaque to this crate: the external bytecode executor interprets it.
    pub code: Vec<u32>,
    pub constants: Vec<Value>,
    pub upvalues: Vec<UpvalueDesc>,
    pub protos: Vec<Rc<Proto>>,
    pub debug: ProtoDebug,
}

/// Optional per-instruction / per-local debug info: line map, local
/// variables, upvalue names. Stripped by a dumper that drops debug info,
/// at which point these are all empty.
#[derive(Debug, Default)]
pub struct ProtoDebug {
    pub lines: Vec<u32>,
    pub local_names: Vec<(Rc<str>, u32, u32)>,
    pub upvalue_names: Vec<Rc<str>>,
}

/// A native (host-provided) function body. Host closures are built by
/// pushing captured values then invoking a create-closure-with-N-upvalues
/// op: a `NativeFn` plus its captured values is exactly that closure.
pub type NativeFn = fn(&mut crate::thread::ThreadState, &mut crate::state::GlobalState) -> crate::error::RuntimeResult<i32>;

#[derive(Debug)]
pub enum Closure {
    Scripted { proto: Rc<Proto>, upvalues: Vec<Upvalue> },
    Native { func: NativeFn, captures: Vec<Value> },
}

impl Closure {
    #[must_use]
    pub fn is_scripted(&self) -> bool {
        matches!(self, Self::Scripted { .. })
    }

    /// Number of captured upvalues, bounded to 255 per host closure.
    #[must_use]
    pub fn upvalue_count(&self) -> usize {
        match self {
            Self::Scripted { upvalues, .. } => upvalues.len(),
            Self::Native { captures, .. } => captures.len(),
        }
    }
}
