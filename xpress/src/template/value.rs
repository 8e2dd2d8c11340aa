//! Runtime values.
//!
//! Every host value placed in a [`Namespace`] and every intermediate result
//! of evaluation is a [`Value`]. Template literals only ever produce `Float`
//! numbers; `Int` exists for host-supplied integers, which keep their native
//! representation through property access and calls.
//!
//! | Variant    | Display form             | Truthy           |
//! |------------|--------------------------|------------------|
//! | `Nil`      | `<nil>`                  | no               |
//! | `Bool`     | `true` / `false`         | only `true`      |
//! | `Int`      | `42`                     | yes (even `0`)   |
//! | `Float`    | `9`, `-5617.41`          | yes (even `0`)   |
//! | `Str`      | raw text                 | yes (even `""`)  |
//! | `List`     | `[a b c]`                | yes              |
//! | `Map`      | `map[k:v k2:v2]`         | yes              |
//! | `Record`   | `Name{field:value}`      | yes              |
//! | `Callable` | `func(int, ...any)`      | yes              |

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::host::{Callable, Record};

/// Name → value table visible to expressions.
pub type Namespace = IndexMap<String, Value>;

/// String-keyed map value, iterated in insertion order.
pub type Map = IndexMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<Vec<Value>>),
    Map(Arc<Map>),
    Record(Record),
    Callable(Callable),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `nil` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Numeric view in the evaluator's working type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "<nil>",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(r) => r.type_name(),
            Value::Callable(_) => "function",
        }
    }
}

// ── Equality ──────────────────────────────────────────────────────────────────

/// Strict equality: no numeric cross-type comparison, deep for lists and
/// maps, identity for records and callables. Template `==` is looser and
/// compares ints with floats by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Record(a), Value::Record(b)) => a.same_instance(b),
            (Value::Callable(a), Value::Callable(b)) => a.same_function(b),
            _ => false,
        }
    }
}

// ── Display ───────────────────────────────────────────────────────────────────

pub(crate) fn fmt_float(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        f.write_str("NaN")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "+Inf" } else { "-Inf" })
    } else {
        write!(f, "{x}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => fmt_float(*x, f),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
            Value::Record(r) => write!(f, "{r}"),
            Value::Callable(c) => write!(f, "{}", c.signature()),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Nil.to_string(), "<nil>");
        assert_eq!(Value::Float(9.0).to_string(), "9");
        assert_eq!(Value::Float(-123.0 * 45.67).to_string(), "-5617.41");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "+Inf");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::from("s").to_string(), "s");
    }

    #[test]
    fn display_containers() {
        let list = Value::list([Value::Float(1.0), Value::Float(2.0), true.into(), "a".into()]);
        assert_eq!(list.to_string(), "[1 2 true a]");
        let map = Value::map([("b", Value::Int(1)), ("a", Value::list([Value::Nil]))]);
        assert_eq!(map.to_string(), "map[b:1 a:[<nil>]]");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Float(0.0).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::list(Vec::<Value>::new()).is_truthy());
    }

    #[test]
    fn strict_equality() {
        assert_ne!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_eq!(
            Value::list([1i64, 2]),
            Value::list([Value::Int(1), Value::Int(2)])
        );
        assert_eq!(Value::map([("k", 1i64)]), Value::map([("k", 1i64)]));
        assert_ne!(Value::map([("k", 1i64)]), Value::map([("k", 2i64)]));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Nil.type_name(), "<nil>");
        assert_eq!(Value::Float(1.0).type_name(), "float");
        assert_eq!(Value::map(Vec::<(String, Value)>::new()).type_name(), "map");
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Nil);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
