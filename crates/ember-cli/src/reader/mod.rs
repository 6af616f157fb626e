//! Reader for `ember-cli`'s input: converts source text into values pushed
//! onto a thread's stack through [`ember_core::api::Api`] alone, the way
//! any other embedder would via its own tiny reader/compiler pipeline.

mod lexer;
mod parser;

pub use lexer::{LexError, Token};
pub use parser::{read, Expr, Field, ParseError};

use ember_core::api::Api;
use ember_core::error::RuntimeResult;

/// Realize `expr` as a value on top of `api`'s stack.
pub fn push(api: &mut Api<'_>, expr: &Expr) -> RuntimeResult<()> {
    match expr {
        Expr::Nil => api.push_nil(),
        Expr::Bool(b) => api.push_bool(*b),
        Expr::Int(n) => api.push_int(*n),
        Expr::Float(n) => api.push_float(*n),
        Expr::Str(s) => api.push_string(s.as_bytes()),
        Expr::Table(fields) => push_table(api, fields),
    }
}

fn push_table(api: &mut Api<'_>, fields: &[Field]) -> RuntimeResult<()> {
    api.new_table_sized(fields.len(), 0)?;
    let mut next_index: i64 = 1;
    for field in fields {
        match field {
            Field::Positional(value) => {
                push(api, value)?;
                api.raw_set_index(-1, next_index);
                next_index += 1;
            }
            Field::Named(name, value) => {
                api.push_string(name.as_bytes())?;
                push(api, value)?;
                api.raw_set(-1)?;
            }
            Field::Indexed(key, value) => {
                push(api, key)?;
                push(api, value)?;
                api.raw_set(-1)?;
            }
        }
    }
    Ok(())
}
