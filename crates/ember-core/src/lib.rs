//! # ember-core
//!
//! The core runtime of the ember embeddable scripting language: value
//! representation, string interning, the table data structure, the
//! incremental tri-color garbage collector, the stack-and-call model shared
//! between host code and scripted code, and the host interface that drives
//! all of it.
//!
//! What this crate is *not*: a lexer, parser, code generator, bytecode
//! interpreter loop, standard library, or command-line driver. Those are
//! external collaborators. The [`executor`] module defines the narrow
//! contract an embedder's bytecode interpreter must satisfy to plug into
//! [`callinfo::call`]; everything else in this crate is usable without one.

pub mod aux;
pub mod callinfo;
pub mod closure;
pub mod config;
pub mod coroutine;
pub mod debug;
pub mod error;
pub mod executor;
pub mod gc;
pub mod meta;
pub mod object;
pub mod stack;
pub mod state;
pub mod string_store;
pub mod table;
pub mod thread;
pub mod upvalue;
pub mod value;

pub mod api;

pub use error::{RuntimeError, StatusCode};
pub use object::{GcObject, GcRef};
pub use state::GlobalState;
pub use table::Table;
pub use thread::{ThreadId, ThreadState, ThreadStatus};
pub use value::Value;

/// Crate version, surfaced to embedders the way `lua_version` is.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
