//! Template AST.
//!
//! Nodes are plain data: every consumer (the interpreter, the printers in
//! [`crate::printer`]) walks them with an exhaustive `match` or through the
//! [`Visitor`] trait, so a new variant fails to compile until every consumer
//! handles it.

use super::token::Token;

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Coalesce,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Coalesce => "??",
        }
    }
}

// ── Expr ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal text between actions.
    Text(String),
    /// Every numeric literal is an `f64`; `raw` keeps the source spelling.
    Number { value: f64, raw: String },
    Str { value: String, raw: String },
    Bool(bool),
    Nil,
    Grouping(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Root of every successful parse: text runs and actions in source order.
    Template(Vec<Expr>),
    Variable(Token),
    Get {
        object: Box<Expr>,
        name: Token,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    Array(Vec<Expr>),
    /// `(key, value)` pairs in source order. Identifier and string keys are
    /// stored as `Str` literals; bracketed keys keep their expression.
    Map(Vec<(Expr, Expr)>),
    ParseError { message: String, token: Token },
}

impl Expr {
    /// Variant name, as used by the JSON printer.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Text(_) => "Text",
            Expr::Number { .. } => "Number",
            Expr::Str { .. } => "String",
            Expr::Bool(_) => "Bool",
            Expr::Nil => "Nil",
            Expr::Grouping(_) => "Grouping",
            Expr::Unary { .. } => "Unary",
            Expr::Binary { .. } => "Binary",
            Expr::Ternary { .. } => "Ternary",
            Expr::Template(_) => "Template",
            Expr::Variable(_) => "Variable",
            Expr::Get { .. } => "Get",
            Expr::Index { .. } => "Index",
            Expr::Call { .. } => "Call",
            Expr::Array(_) => "Array",
            Expr::Map(_) => "Map",
            Expr::ParseError { .. } => "ParseError",
        }
    }

    /// The name a callee can be reported under in error messages.
    pub fn static_name(&self) -> Option<&str> {
        match self {
            Expr::Variable(tok) => Some(&tok.lexeme),
            Expr::Get { name, .. } => Some(&name.lexeme),
            _ => None,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Expr::ParseError { .. })
    }

    /// Double-dispatch entry point for [`Visitor`] implementations.
    pub fn accept<V: Visitor + ?Sized>(&self, v: &mut V) -> V::Output {
        match self {
            Expr::Text(raw) => v.visit_text(raw),
            Expr::Number { value, raw } => v.visit_number(*value, raw),
            Expr::Str { value, raw } => v.visit_string(value, raw),
            Expr::Bool(b) => v.visit_bool(*b),
            Expr::Nil => v.visit_nil(),
            Expr::Grouping(inner) => v.visit_grouping(inner),
            Expr::Unary { op, operand } => v.visit_unary(*op, operand),
            Expr::Binary { left, op, right } => v.visit_binary(left, *op, right),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => v.visit_ternary(cond, then, otherwise),
            Expr::Template(parts) => v.visit_template(parts),
            Expr::Variable(name) => v.visit_variable(name),
            Expr::Get {
                object,
                name,
                optional,
            } => v.visit_get(object, name, *optional),
            Expr::Index {
                object,
                index,
                optional,
            } => v.visit_index(object, index, *optional),
            Expr::Call {
                callee,
                args,
                optional,
            } => v.visit_call(callee, args, *optional),
            Expr::Array(items) => v.visit_array(items),
            Expr::Map(entries) => v.visit_map(entries),
            Expr::ParseError { message, token } => v.visit_parse_error(message, token),
        }
    }
}

// ── Visitor ───────────────────────────────────────────────────────────────────

/// Read-only traversal contract: one callback per node variant.
pub trait Visitor {
    type Output;

    fn visit_text(&mut self, raw: &str) -> Self::Output;
    fn visit_number(&mut self, value: f64, raw: &str) -> Self::Output;
    fn visit_string(&mut self, value: &str, raw: &str) -> Self::Output;
    fn visit_bool(&mut self, value: bool) -> Self::Output;
    fn visit_nil(&mut self) -> Self::Output;
    fn visit_grouping(&mut self, inner: &Expr) -> Self::Output;
    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Self::Output;
    fn visit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Self::Output;
    fn visit_ternary(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Self::Output;
    fn visit_template(&mut self, parts: &[Expr]) -> Self::Output;
    fn visit_variable(&mut self, name: &Token) -> Self::Output;
    fn visit_get(&mut self, object: &Expr, name: &Token, optional: bool) -> Self::Output;
    fn visit_index(&mut self, object: &Expr, index: &Expr, optional: bool) -> Self::Output;
    fn visit_call(&mut self, callee: &Expr, args: &[Expr], optional: bool) -> Self::Output;
    fn visit_array(&mut self, items: &[Expr]) -> Self::Output;
    fn visit_map(&mut self, entries: &[(Expr, Expr)]) -> Self::Output;
    fn visit_parse_error(&mut self, message: &str, token: &Token) -> Self::Output;
}
