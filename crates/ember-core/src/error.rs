//! Error types and status codes.

use thiserror::Error;

/// Error codes returned from protected entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Yield = 1,
    ErrRun = 2,
    ErrSyntax = 3,
    ErrMem = 4,
    ErrGcMm = 5,
    ErrErr = 6,
}

impl StatusCode {
    #[must_use]
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Ok | Self::Yield)
    }
}

/// Where a runtime error was raised, when known: the source chunk and
/// line, if it was raised from scripted code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub chunk: Option<String>,
    pub line: Option<u32>,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.chunk, self.line) {
            (Some(chunk), Some(line)) => write!(f, "{chunk}:{line}"),
            (Some(chunk), None) => write!(f, "{chunk}"),
            _ => write!(f, "?"),
        }
    }
}

/// One `RuntimeError` variant per error kind this runtime can raise.
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    #[error("{location}: {message}")]
    Runtime { message: String, location: SourceLocation },

    #[error("{location}: syntax error: {message}")]
    Syntax { message: String, location: SourceLocation },

    /// The error object for this kind is always the same preallocated,
    /// permanently-fixed string, so construction never itself allocates.
    #[error("not enough memory")]
    Memory,

    #[error("error in error handling: {message}")]
    ErrorInHandler { message: String },

    #[error("error in garbage-collection metamethod: {message}")]
    GcError { message: String },
}

impl RuntimeError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Runtime { .. } => StatusCode::ErrRun,
            Self::Syntax { .. } => StatusCode::ErrSyntax,
            Self::Memory => StatusCode::ErrMem,
            Self::ErrorInHandler { .. } => StatusCode::ErrErr,
            Self::GcError { .. } => StatusCode::ErrGcMm,
        }
    }

    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into(), location: SourceLocation::default() }
    }

    #[must_use]
    pub fn runtime_at(message: impl Into<String>, chunk: impl Into<String>, line: u32) -> Self {
        Self::Runtime {
            message: message.into(),
            location: SourceLocation { chunk: Some(chunk.into()), line: Some(line) },
        }
    }

    #[must_use]
    pub fn syntax(message: impl Into<String>, chunk: impl Into<String>, line: u32) -> Self {
        Self::Syntax {
            message: message.into(),
            location: SourceLocation { chunk: Some(chunk.into()), line: Some(line) },
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
