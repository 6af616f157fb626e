//! Upvalues: variables captured from an enclosing scope by a closure.
//! Deliberately *not* arena objects: sharing between closures is
//! reference-counted and distinct from the traced heap, so an upvalue
//! lives in an `Rc<RefCell<_>>` handed directly to every closure that
//! captures it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

/// An upvalue is open while its enclosing stack frame is live (the stack
/// slot is the source of truth) and closed once that frame retires (the
/// value is copied into the upvalue's own storage).
#[derive(Debug)]
pub enum UpvalueState {
    Open { thread: crate::thread::ThreadId, stack_index: usize },
    Closed(Value),
}

pub type Upvalue = Rc<RefCell<UpvalueState>>;

/// The sorted-by-stack-index open-upvalue list a thread keeps so that two
/// closures capturing the same local end up sharing one upvalue.
#[derive(Debug, Default)]
pub struct OpenUpvalues {
    /// Kept sorted by `stack_index` ascending, matching Lua's invariant
    /// that the open list walks outward from the stack top.
    entries: Vec<Upvalue>,
}

impl OpenUpvalues {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Returns the existing open upvalue for `stack_index` if one is
    /// already in the list, otherwise inserts and returns a new one.
    pub fn find_or_create(&mut self, thread: crate::thread::ThreadId, stack_index: usize) -> Upvalue {
        let pos = self.entries.partition_point(|uv| match &*uv.borrow() {
            UpvalueState::Open { stack_index: si, .. } => *si < stack_index,
            UpvalueState::Closed(_) => true,
        });
        if let Some(existing) = self.entries.get(pos) {
            if let UpvalueState::Open { stack_index: si, .. } = &*existing.borrow() {
                if *si == stack_index {
                    return Rc::clone(existing);
                }
            }
        }
        let uv = Rc::new(RefCell::new(UpvalueState::Open { thread, stack_index }));
        self.entries.insert(pos, Rc::clone(&uv));
        uv
    }

    /// Convert every open upvalue at or above `level` to closed form,
    /// reading its value out of `stack` before unlinking it from the open
    /// list.
    pub fn close(&mut self, level: usize, stack: &[Value]) {
        self.entries.retain(|uv| {
            let mut state = uv.borrow_mut();
            match &*state {
                UpvalueState::Open { stack_index, .. } if *stack_index >= level => {
                    let value = stack[*stack_index];
                    *state = UpvalueState::Closed(value);
                    false
                }
                _ => true,
            }
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity comparison, for detecting when two closures share one upvalue.
#[must_use]
pub fn same_upvalue(a: &Upvalue, b: &Upvalue) -> bool {
    Rc::ptr_eq(a, b)
}

pub fn read(uv: &Upvalue, stack: &[Value]) -> Value {
    match &*uv.borrow() {
        UpvalueState::Open { stack_index, .. } => stack[*stack_index],
        UpvalueState::Closed(v) => *v,
    }
}

pub fn write(uv: &Upvalue, stack: &mut [Value], value: Value) {
    match &mut *uv.borrow_mut() {
        UpvalueState::Open { stack_index, .. } => stack[*stack_index] = value,
        UpvalueState::Closed(v) => *v = value,
    }
}
