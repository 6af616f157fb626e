//! Heap object representation: the GC arena's handle type and the header
//! every collectable object carries.

use std::any::Any;
use std::cell::Cell;
use std::fmt;

use crate::closure::Closure;
use crate::string_store::GcString;
use crate::table::Table;
use crate::thread::ThreadState;

/// Handle into [`crate::gc::Gc`]'s arena. Analogous to a tagged pointer in a
/// pointer-based collector, but just an index — trading a pointer
/// indirection for freedom from dangling-reference bugs during sweep.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(pub(crate) u32);

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl GcRef {
    #[expect(
        clippy::expect_used,
        reason = "an arena past u32::MAX live objects has already exhausted far more \
                  memory than any host running this crate has available; there is no \
                  smaller GcRef to hand back and nothing useful to recover into"
    )]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("GC arena exceeded u32::MAX objects"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tri-color mark state, plus the two rotating "white" shades used to
/// distinguish this cycle's garbage from the previous cycle's survivors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Color {
    White0,
    White1,
    Gray,
    Black,
}

/// Metadata every collectable object carries, independent of its payload.
#[derive(Debug)]
pub struct ObjectHeader {
    pub(crate) color: Cell<Color>,
    /// Reserved words, the empty string, and other never-collected objects,
    /// placed on the fixed (never-collect) list.
    pub(crate) fixed: bool,
    /// Set once this object has been moved onto the to-be-finalized list;
    /// sweep skips it and call-finalizers runs its `__gc` exactly once.
    pub(crate) finalized: Cell<bool>,
}

impl ObjectHeader {
    pub(crate) fn new(initial_white: Color) -> Self {
        Self {
            color: Cell::new(initial_white),
            fixed: false,
            finalized: Cell::new(false),
        }
    }

    pub(crate) fn fixed(initial_white: Color) -> Self {
        Self {
            color: Cell::new(initial_white),
            fixed: true,
            finalized: Cell::new(false),
        }
    }

    pub(crate) fn is_white(&self) -> bool {
        matches!(self.color.get(), Color::White0 | Color::White1)
    }

    pub(crate) fn is_black(&self) -> bool {
        matches!(self.color.get(), Color::Black)
    }
}

/// Host-opaque full userdata: arbitrary host payload plus an optional
/// metatable, the only heap kind whose contents the runtime never inspects.
pub struct UserData {
    pub data: Box<dyn Any>,
    pub metatable: Option<GcRef>,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData").field("metatable", &self.metatable).finish_non_exhaustive()
    }
}

/// The union of everything the arena can store behind a [`GcRef`]. One
/// variant per collectable base type; a `Proto` (bytecode prototype) is
/// kept outside the arena since it is immutable and owned by closures via
/// `Rc`, same as upvalues (see `crate::upvalue`).
#[derive(Debug)]
pub enum GcObject {
    Str(GcString),
    Table(Table),
    Closure(Closure),
    UserData(UserData),
    Thread(ThreadState),
}

impl GcObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Table(_) => "table",
            Self::Closure(_) => "function",
            Self::UserData(_) => "userdata",
            Self::Thread(_) => "thread",
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&GcString> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Self::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadState> {
        match self {
            Self::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_thread_mut(&mut self) -> Option<&mut ThreadState> {
        match self {
            Self::Thread(t) => Some(t),
            _ => None,
        }
    }
}
