//! Tree-walking interpreter.
//!
//! Synchronous and single-threaded: [`Evaluator`](super::Evaluator) runs it
//! on a blocking task and enforces the timeout from outside. Every node
//! checks the [`CallContext`] first, so a tripped signal stops the walk at
//! the next node boundary.

use std::cell::Cell;
use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;

use super::ast::{BinOp, Expr, UnaryOp};
use super::cancel::CallContext;
use super::error::EvalError;
use super::token::Token;
use super::value::{Namespace, Value};

/// Result of one node: a value, or the short-circuit of an optional chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Value(Value),
    Absent,
}

impl Flow {
    fn into_value(self) -> Value {
        match self {
            Flow::Value(v) => v,
            Flow::Absent => Value::Nil,
        }
    }
}

type EvalResult = Result<Flow, EvalError>;

/// Deepest node the walk will visit. Parsed trees stay well below this.
pub(crate) const MAX_DEPTH: usize = 192;

pub(crate) struct Interpreter<'a> {
    ns: &'a Namespace,
    ctx: &'a CallContext,
    depth: Cell<usize>,
}

impl<'a> Interpreter<'a> {
    pub fn new(ns: &'a Namespace, ctx: &'a CallContext) -> Self {
        Interpreter {
            ns,
            ctx,
            depth: Cell::new(0),
        }
    }

    /// Evaluate a whole tree; a dangling `Absent` becomes nil.
    pub fn run(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.value(expr)
    }

    fn value(&self, expr: &Expr) -> Result<Value, EvalError> {
        Ok(self.eval(expr)?.into_value())
    }

    fn eval(&self, expr: &Expr) -> EvalResult {
        self.ctx.check()?;
        let depth = self.depth.get() + 1;
        if depth > MAX_DEPTH {
            return Err(EvalError::NestingTooDeep(MAX_DEPTH));
        }
        self.depth.set(depth);
        let flow = self.node(expr);
        self.depth.set(depth - 1);
        flow
    }

    fn node(&self, expr: &Expr) -> EvalResult {
        let v = match expr {
            Expr::Text(s) => Value::Str(s.clone()),
            Expr::Number { value, .. } => Value::Float(*value),
            Expr::Str { value, .. } => Value::Str(value.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Nil => Value::Nil,
            Expr::Grouping(inner) => self.value(inner)?,
            Expr::Unary { op, operand } => self.unary(*op, operand)?,
            Expr::Binary { left, op, right } => return self.binary(left, *op, right),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                return if self.value(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                };
            }
            Expr::Template(parts) => self.template(parts)?,
            Expr::Variable(name) => self.ns.get(&name.lexeme).cloned().unwrap_or_default(),
            Expr::Get {
                object,
                name,
                optional,
            } => return self.get(object, name, *optional),
            Expr::Index {
                object,
                index,
                optional,
            } => return self.index(object, index, *optional),
            Expr::Call {
                callee,
                args,
                optional,
            } => return self.call(callee, args, *optional),
            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::List(Arc::new(items))
            }
            Expr::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.value(key)?.to_string();
                    let value = self.value(value)?;
                    map.insert(key, value);
                }
                Value::Map(Arc::new(map))
            }
            Expr::ParseError { message, token } => {
                return Err(EvalError::Parse {
                    position: token.position,
                    message: message.clone(),
                })
            }
        };
        Ok(Flow::Value(v))
    }

    // ── Templates ─────────────────────────────────────────────────────────────

    fn template(&self, parts: &[Expr]) -> Result<Value, EvalError> {
        if let [only] = parts {
            return self.value(only);
        }
        let mut out = String::new();
        for part in parts {
            match self.value(part)? {
                Value::Str(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            }
        }
        Ok(Value::Str(out))
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    fn unary(&self, op: UnaryOp, operand: &Expr) -> Result<Value, EvalError> {
        let v = self.value(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnaryOp::Neg => match v.as_f64() {
                Some(x) => Ok(Value::Float(-x)),
                None => Err(EvalError::type_error(format!(
                    "operand of unary '-' must be a number, got {}",
                    v.type_name()
                ))),
            },
        }
    }

    fn binary(&self, left: &Expr, op: BinOp, right: &Expr) -> EvalResult {
        let v = match op {
            BinOp::And => {
                let l = self.value(left)?;
                Value::Bool(l.is_truthy() && self.value(right)?.is_truthy())
            }
            BinOp::Or => {
                let l = self.value(left)?;
                Value::Bool(l.is_truthy() || self.value(right)?.is_truthy())
            }
            BinOp::Coalesce => {
                let l = self.value(left)?;
                if l.is_truthy() {
                    l
                } else {
                    self.value(right)?
                }
            }
            BinOp::Eq => {
                let (l, r) = self.operands(left, right)?;
                Value::Bool(equals(&l, &r))
            }
            BinOp::Ne => {
                let (l, r) = self.operands(left, right)?;
                Value::Bool(!equals(&l, &r))
            }
            BinOp::Add => {
                let (l, r) = self.operands(left, right)?;
                add(l, r)?
            }
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                let (l, r) = self.operands(left, right)?;
                arithmetic(op, &l, &r)?
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (l, r) = self.operands(left, right)?;
                compare(op, &l, &r)?
            }
        };
        Ok(Flow::Value(v))
    }

    fn operands(&self, left: &Expr, right: &Expr) -> Result<(Value, Value), EvalError> {
        let l = self.value(left)?;
        let r = self.value(right)?;
        Ok((l, r))
    }

    // ── Access ────────────────────────────────────────────────────────────────

    fn get(&self, object: &Expr, name: &Token, optional: bool) -> EvalResult {
        let Flow::Value(obj) = self.eval(object)? else {
            return Ok(Flow::Absent);
        };
        let property = name.lexeme.as_str();
        let found = match &obj {
            Value::Nil if optional => return Ok(Flow::Absent),
            Value::Nil => {
                return Err(EvalError::NilAccess {
                    action: format!("get property '{property}' of nil"),
                })
            }
            Value::Map(map) => map.get(property).cloned(),
            Value::Record(record) => record.get(property),
            Value::List(items) if property == "length" => Some(Value::from(items.len())),
            Value::Str(s) if property == "length" => Some(Value::from(s.chars().count())),
            other => return Err(unknown_property(property, other)),
        };
        match (found, &obj) {
            (Some(v), _) => Ok(Flow::Value(v)),
            (None, _) if optional => Ok(Flow::Absent),
            (None, Value::Map(_)) => Ok(Flow::Value(Value::Nil)),
            (None, other) => Err(unknown_property(property, other)),
        }
    }

    fn index(&self, object: &Expr, index: &Expr, optional: bool) -> EvalResult {
        let Flow::Value(obj) = self.eval(object)? else {
            return Ok(Flow::Absent);
        };
        if obj.is_nil() {
            if optional {
                return Ok(Flow::Absent);
            }
            return Err(EvalError::NilAccess {
                action: "index into nil".to_owned(),
            });
        }

        let idx = self.value(index)?;
        let v = match &obj {
            Value::Map(map) => match map.get(&idx.to_string()) {
                Some(v) => v.clone(),
                None if optional => return Ok(Flow::Absent),
                None => Value::Nil,
            },
            Value::List(items) => {
                let i = position(&idx, items.len(), "list")?;
                items[i].clone()
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let i = position(&idx, len, "string")?;
                s.chars().nth(i).map(String::from).unwrap_or_default().into()
            }
            Value::Record(record) => {
                let Value::Str(name) = &idx else {
                    return Err(EvalError::type_error(format!(
                        "record index must be a string, got {}",
                        idx.type_name()
                    )));
                };
                match record.get(name) {
                    Some(v) => v,
                    None if optional => return Ok(Flow::Absent),
                    None => return Err(unknown_property(name, &obj)),
                }
            }
            other => {
                return Err(EvalError::type_error(format!(
                    "cannot index into {}",
                    other.type_name()
                )))
            }
        };
        Ok(Flow::Value(v))
    }

    fn call(&self, callee: &Expr, args: &[Expr], optional: bool) -> EvalResult {
        let Flow::Value(target) = self.eval(callee)? else {
            return Ok(Flow::Absent);
        };
        if optional && target.is_nil() {
            return Ok(Flow::Absent);
        }
        let args = args
            .iter()
            .map(|arg| self.value(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let Value::Callable(function) = target else {
            return Err(EvalError::NotCallable {
                name: callee.static_name().unwrap_or("unknown").to_owned(),
                type_name: target.type_name().to_owned(),
            });
        };
        function.call(self.ctx, args).map(Flow::Value)
    }
}

// ── Operator helpers ──────────────────────────────────────────────────────────

fn add(l: Value, r: Value) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{l}{r}"))),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Err(operand_error(BinOp::Add, &l, &r)),
        },
    }
}

/// `==` in templates: like [`Value`] equality, except that ints and floats
/// compare by numeric value, at any depth inside lists and maps.
fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equals(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| equals(v, w)))
        }
        _ => l == r,
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(operand_error(op, l, r));
    };
    let v = match op {
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => return Err(operand_error(op, l, r)),
    };
    Ok(Value::Float(v))
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let ord = match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalError::type_error(format!(
                    "cannot compare {} and {} with '{}'",
                    l.type_name(),
                    r.type_name(),
                    op.symbol()
                )))
            }
        },
    };
    // NaN compares false under every ordering.
    let Some(ord) = ord else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn operand_error(op: BinOp, l: &Value, r: &Value) -> EvalError {
    EvalError::type_error(format!(
        "operands of '{}' must be numbers, got {} and {}",
        op.symbol(),
        l.type_name(),
        r.type_name()
    ))
}

fn unknown_property(property: &str, on: &Value) -> EvalError {
    EvalError::UnknownProperty {
        property: property.to_owned(),
        type_name: on.type_name().to_owned(),
    }
}

/// Bounds-checked position for a numeric index. No negative wraparound.
fn position(idx: &Value, len: usize, kind: &'static str) -> Result<usize, EvalError> {
    let i = match idx {
        Value::Int(n) => *n,
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 => *x as i64,
        other => {
            return Err(EvalError::type_error(format!(
                "{kind} index must be an integer, got {other}"
            )))
        }
    };
    match usize::try_from(i) {
        Ok(u) if u < len => Ok(u),
        _ => Err(EvalError::IndexOutOfRange {
            index: i.to_string(),
            kind,
            len,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
