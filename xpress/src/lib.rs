//! xpress: an embeddable expression/template language.
//!
//! Text with `@{{ expression }}` actions is scanned, parsed into an
//! [`Expr`](template::Expr) tree, and evaluated against a namespace of host
//! values and functions. See [`template`] for the pipeline and [`printer`]
//! for the AST printers.

pub mod cli;
pub mod printer;
pub mod template;

pub use template::{parse, EvalError, Evaluator, Expr, Value};
