//! The template language: lexer, parser, and evaluator.
//!
//! ```text
//!   source ──Lexer──▶ [Token] ──Parser──▶ Expr ──Evaluator(namespace)──▶ Value | EvalError
//! ```
//!
//! Parsing is total. A syntax error becomes an [`Expr::ParseError`] root
//! and surfaces as [`EvalError::Parse`] when evaluated, so `evaluate` is the
//! only place callers have to handle failure.
//!
//! # Quick start
//!
//! ```rust
//! use xpress::template::{parse, Evaluator, Value};
//!
//! let ev = Evaluator::with_members([("name", "world")]);
//! let ast = std::sync::Arc::new(parse("Hello @{{ name }}!"));
//! assert_eq!(ev.evaluate_blocking(ast).unwrap(), Value::from("Hello world!"));
//! ```

pub mod ast;
pub mod cancel;
pub mod error;
pub mod evaluator;
pub mod host;
mod interp;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::{Expr, Visitor};
pub use cancel::{CallContext, CancelHandle};
pub use error::EvalError;
pub use evaluator::{Evaluator, Options, DEFAULT_TIMEOUT};
pub use host::{Callable, HostError, Kind, Output, Record, RecordType, ReturnKind, Signature};
pub use lexer::{scan, Delimiters, Lexer};
pub use parser::{parse, parse_with};
pub use value::{Map, Namespace, Value};
