//! Evaluation errors.

use std::time::Duration;

use thiserror::Error;

use super::host::HostError;

/// Everything that can make [`Evaluator::evaluate`](super::Evaluator::evaluate) fail.
///
/// Lex and parse failures surface here too, as [`EvalError::Parse`], when
/// the `ParseError` node they produced is evaluated.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("parse error: Error at position {position}. {message}")]
    Parse { position: usize, message: String },

    #[error("{0}")]
    Type(String),

    /// `action` reads like "get property 'x' of nil".
    #[error("cannot {action}")]
    NilAccess { action: String },

    #[error("index {index} out of range for {kind} of length {len}")]
    IndexOutOfRange {
        index: String,
        kind: &'static str,
        len: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot call non-function '{name}' of type {type_name}")]
    NotCallable { name: String, type_name: String },

    #[error("function '{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("function '{name}': argument {position} ({value}) cannot be used as {expected}")]
    Argument {
        name: String,
        position: usize,
        value: String,
        expected: &'static str,
    },

    #[error("function '{name}': {reason}")]
    ReturnShape { name: String, reason: String },

    #[error("function '{name}' failed: {source}")]
    Host {
        name: String,
        #[source]
        source: HostError,
    },

    #[error("unknown property '{property}' on {type_name}")]
    UnknownProperty { property: String, type_name: String },

    /// Only reachable with trees built by hand; the parser caps nesting first.
    #[error("expression nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation panicked: {0}")]
    Panicked(String),

    #[error("cannot start evaluation runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl EvalError {
    /// `true` for the timeout and cancellation kinds, which are produced only
    /// at the evaluation boundary.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EvalError::TimedOut(_) | EvalError::Cancelled)
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type(message.into())
    }
}
