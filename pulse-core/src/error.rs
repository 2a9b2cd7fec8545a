//! Error types for the core runtime

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the core runtime.
///
/// Buffer full/empty conditions are not errors; they are reported as `bool`
/// returns on the buffer operations themselves. Scheduling slip is recorded
/// in per-task counters and surfaced through the event service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A named entry was requested with a type other than the registered one
    #[error("type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Registration of a name that already exists
    #[error("duplicate entry '{0}'")]
    Duplicate(String),

    /// Lookup of a named entity that does not exist
    #[error("'{0}' not found")]
    NotFound(String),

    /// Argument list length does not match the declared signature
    #[error("wrong argument count: expected {expected}, got {got}")]
    WrongArgumentCount { expected: usize, got: usize },

    /// Argument type does not match the declared signature
    #[error("wrong type for argument {index}: expected {expected}, got {got}")]
    WrongArgumentType {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    /// A handler argument binding requires writable storage
    #[error("argument {0} is not an lvalue")]
    NonLvalueArgument(usize),
}
