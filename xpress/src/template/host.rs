//! Host bindings: callables and records.
//!
//! Instead of inspecting host types at run time, every host function carries
//! a [`Signature`] (parameter kinds, variadic tail, declared returns) next to
//! its invocation thunk, and every host struct is described once by a
//! [`RecordType`] accessor table. The interpreter only ever talks to these
//! descriptors.
//!
//! Argument coercion table, applied to every parameter:
//!
//! | Kind       | Accepts                                         |
//! |------------|-------------------------------------------------|
//! | `Any`      | everything, unchanged                           |
//! | `Float`    | float; int (widened)                            |
//! | `Int`      | int; integral finite float within `i64` range   |
//! | `Number`   | int or float, unchanged                         |
//! | `Str`      | string only                                     |
//! | `Bool`     | bool only                                       |
//! | `List`     | list or nil                                     |
//! | `Map`      | map or nil                                      |
//! | `Record`   | record or nil                                   |
//! | `Callable` | function or nil                                 |

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::cancel::CallContext;
use super::error::EvalError;
use super::value::Value;

/// Error type host callables report failures with.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

// ── Kinds ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    Bool,
    Int,
    Float,
    Number,
    Str,
    List,
    Map,
    Record,
    Callable,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Number => "number",
            Kind::Str => "string",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Callable => "function",
        }
    }

    /// Convert `v` to this kind, or hand it back unchanged on mismatch.
    pub fn coerce(self, v: Value) -> Result<Value, Value> {
        match (self, v) {
            (Kind::Any, v) => Ok(v),
            (Kind::Bool, v @ Value::Bool(_))
            | (Kind::Str, v @ Value::Str(_))
            | (Kind::Int, v @ Value::Int(_))
            | (Kind::Float, v @ Value::Float(_))
            | (Kind::Number, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (Kind::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
            (Kind::Int, Value::Float(x))
                if x.is_finite()
                    && x.fract() == 0.0
                    && x >= i64::MIN as f64
                    && x < i64::MAX as f64 =>
            {
                Ok(Value::Int(x as i64))
            }
            (Kind::List, v @ (Value::List(_) | Value::Nil))
            | (Kind::Map, v @ (Value::Map(_) | Value::Nil))
            | (Kind::Record, v @ (Value::Record(_) | Value::Nil))
            | (Kind::Callable, v @ (Value::Callable(_) | Value::Nil)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Value(Kind),
    Error,
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Value(k) => write!(f, "{k}"),
            ReturnKind::Error => f.write_str("error"),
        }
    }
}

// ── Signature ─────────────────────────────────────────────────────────────────

/// Declared shape of a host function.
///
/// `context` marks an implicit leading [`CallContext`] parameter; it is
/// supplied by the evaluator and never counted against the arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub context: bool,
    pub params: Vec<Kind>,
    pub variadic: Option<Kind>,
    pub returns: Vec<ReturnKind>,
}

impl Signature {
    /// Fixed parameters, returning one value of any kind.
    pub fn new(params: impl IntoIterator<Item = Kind>) -> Self {
        Signature {
            context: false,
            params: params.into_iter().collect(),
            variadic: None,
            returns: vec![ReturnKind::Value(Kind::Any)],
        }
    }

    /// Accept any number of trailing `kind` arguments after the fixed ones.
    pub fn variadic(mut self, kind: Kind) -> Self {
        self.variadic = Some(kind);
        self
    }

    pub fn returns(mut self, returns: impl IntoIterator<Item = ReturnKind>) -> Self {
        self.returns = returns.into_iter().collect();
        self
    }

    /// Shorthand for `returns([Value(Any), Error])`.
    pub fn fallible(self) -> Self {
        self.returns([ReturnKind::Value(Kind::Any), ReturnKind::Error])
    }

    fn check_returns(&self) -> Result<(), String> {
        match self.returns.as_slice() {
            [ReturnKind::Value(_)] | [ReturnKind::Value(_), ReturnKind::Error] => Ok(()),
            [ReturnKind::Error] | [ReturnKind::Error, _] => {
                Err("first return value must not be an error".to_owned())
            }
            [_, second] => Err(format!("second return value must be an error, declared {second}")),
            other => Err(format!("must return 1 or 2 values, declared {}", other.len())),
        }
    }

    fn bind(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        let fixed = self.params.len();
        let arity_ok = match self.variadic {
            None => args.len() == fixed,
            Some(_) => args.len() >= fixed,
        };
        if !arity_ok {
            let expected = match self.variadic {
                None => fixed.to_string(),
                Some(_) => format!("at least {fixed}"),
            };
            return Err(EvalError::Arity {
                name: name.to_owned(),
                expected,
                got: args.len(),
            });
        }

        args.into_iter()
            .enumerate()
            .map(|(i, arg)| {
                let kind = self.params.get(i).copied().or(self.variadic).unwrap_or(Kind::Any);
                kind.coerce(arg).map_err(|v| EvalError::Argument {
                    name: name.to_owned(),
                    position: i + 1,
                    value: quoted(&v),
                    expected: kind.name(),
                })
            })
            .collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<String> = Vec::new();
        if self.context {
            params.push("context".to_owned());
        }
        params.extend(self.params.iter().map(|k| k.name().to_owned()));
        if let Some(k) = self.variadic {
            params.push(format!("...{k}"));
        }
        write!(f, "func({})", params.join(", "))?;
        match self.returns.as_slice() {
            [] => Ok(()),
            [one] => write!(f, " {one}"),
            many => {
                let names: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, " ({})", names.join(", "))
            }
        }
    }
}

fn quoted(v: &Value) -> String {
    match v {
        Value::Str(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

// ── Callable ──────────────────────────────────────────────────────────────────

/// One value produced by a host thunk.
pub enum Output {
    Value(Value),
    /// An error slot; `None` means "no error".
    Error(Option<HostError>),
}

impl Output {
    pub fn value(v: impl Into<Value>) -> Self {
        Output::Value(v.into())
    }

    pub fn ok() -> Self {
        Output::Error(None)
    }

    pub fn err(e: impl Into<HostError>) -> Self {
        Output::Error(Some(e.into()))
    }
}

type PlainFn = dyn Fn(Vec<Value>) -> Vec<Output> + Send + Sync;
type ContextFn = dyn Fn(&CallContext, Vec<Value>) -> Vec<Output> + Send + Sync;

enum Thunk {
    Plain(Box<PlainFn>),
    Contextual(Box<ContextFn>),
}

struct CallableInner {
    name: String,
    signature: Signature,
    thunk: Thunk,
}

/// A host function value. Cloning shares the function; equality is identity.
#[derive(Clone)]
pub struct Callable(Arc<CallableInner>);

impl Callable {
    /// Raw constructor: `f` returns every declared output itself.
    pub fn new<F>(name: impl Into<String>, mut signature: Signature, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Vec<Output> + Send + Sync + 'static,
    {
        signature.context = false;
        Self::build(name.into(), signature, Thunk::Plain(Box::new(f)))
    }

    /// Raw constructor for functions that take the cancellation context.
    pub fn with_context<F>(name: impl Into<String>, mut signature: Signature, f: F) -> Self
    where
        F: Fn(&CallContext, Vec<Value>) -> Vec<Output> + Send + Sync + 'static,
    {
        signature.context = true;
        Self::build(name.into(), signature, Thunk::Contextual(Box::new(f)))
    }

    /// Infallible function returning one value. Replaces the declared returns.
    pub fn func<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    {
        let signature = signature.returns([ReturnKind::Value(Kind::Any)]);
        Self::new(name, signature, move |args| vec![Output::Value(f(args))])
    }

    /// Function returning `(value, error)`. Replaces the declared returns.
    pub fn fallible<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self::new(name, signature.fallible(), move |args| split(f(args)))
    }

    /// Context-aware function returning `(value, error)`.
    pub fn contextual<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(&CallContext, Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self::with_context(name, signature.fallible(), move |ctx, args| split(f(ctx, args)))
    }

    fn build(name: String, signature: Signature, thunk: Thunk) -> Self {
        Callable(Arc::new(CallableInner {
            name,
            signature,
            thunk,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    pub fn same_function(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Validate, invoke, and unpack one call.
    pub(crate) fn call(&self, ctx: &CallContext, args: Vec<Value>) -> Result<Value, EvalError> {
        let inner = &*self.0;
        inner
            .signature
            .check_returns()
            .map_err(|reason| self.shape_error(reason))?;
        let args = inner.signature.bind(&inner.name, args)?;
        let outputs = match &inner.thunk {
            Thunk::Plain(f) => f(args),
            Thunk::Contextual(f) => f(ctx, args),
        };
        self.collect(outputs)
    }

    fn collect(&self, outputs: Vec<Output>) -> Result<Value, EvalError> {
        let count = outputs.len();
        let mut outputs = outputs.into_iter();
        let declared = self.0.signature.returns.as_slice();
        let (kind, value) = match (declared, outputs.next(), outputs.next()) {
            ([ReturnKind::Value(kind)], Some(Output::Value(v)), None) => (*kind, v),
            (
                [ReturnKind::Value(kind), ReturnKind::Error],
                Some(Output::Value(v)),
                Some(Output::Error(err)),
            ) => {
                if let Some(source) = err {
                    return Err(EvalError::Host {
                        name: self.0.name.clone(),
                        source,
                    });
                }
                (*kind, v)
            }
            _ => {
                return Err(self.shape_error(format!(
                    "returned {count} values that do not match declared {}",
                    self.0.signature
                )))
            }
        };
        kind.coerce(value).map_err(|v| {
            self.shape_error(format!("returned {} where {kind} was declared", v.type_name()))
        })
    }

    fn shape_error(&self, reason: String) -> EvalError {
        EvalError::ReturnShape {
            name: self.0.name.clone(),
            reason,
        }
    }
}

fn split(result: Result<Value, HostError>) -> Vec<Output> {
    match result {
        Ok(v) => vec![Output::Value(v), Output::ok()],
        Err(e) => vec![Output::Value(Value::Nil), Output::Error(Some(e))],
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.0.name)
            .field("signature", &self.0.signature)
            .finish()
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

type Data = Arc<dyn Any + Send + Sync>;
type FieldFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Value + Send + Sync>;
type MethodFn = Box<dyn Fn(Data) -> Option<Callable> + Send + Sync>;

/// Accessor table shared by every instance of one host type.
struct RecordSchema {
    name: String,
    fields: IndexMap<String, FieldFn>,
    /// Methods bound on a plain instance.
    value_methods: IndexMap<String, MethodFn>,
    /// Methods bound on a shared reference.
    ref_methods: IndexMap<String, MethodFn>,
}

/// Typed description of a host struct, built once and used to wrap values.
pub struct RecordType<T> {
    schema: Arc<RecordSchema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordType<T> {
    fn clone(&self) -> Self {
        RecordType {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T: Any + Send + Sync> RecordType<T> {
    pub fn builder(name: impl Into<String>) -> RecordBuilder<T> {
        RecordBuilder {
            schema: RecordSchema {
                name: name.into(),
                fields: IndexMap::new(),
                value_methods: IndexMap::new(),
                ref_methods: IndexMap::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Wrap a plain (non-addressable) instance.
    pub fn instance(&self, value: T) -> Record {
        self.wrap(Arc::new(value), false)
    }

    /// Wrap a shared reference; reference methods bind without fallback.
    pub fn reference(&self, value: Arc<T>) -> Record {
        self.wrap(value, true)
    }

    fn wrap(&self, data: Arc<T>, addressable: bool) -> Record {
        Record {
            schema: Arc::clone(&self.schema),
            data,
            addressable,
        }
    }
}

pub struct RecordBuilder<T> {
    schema: RecordSchema,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> RecordBuilder<T> {
    pub fn field<F>(mut self, name: impl Into<String>, get: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let getter: FieldFn =
            Box::new(move |data| data.downcast_ref::<T>().map_or(Value::Nil, &get));
        self.schema.fields.insert(name.into(), getter);
        self
    }

    /// A method whose receiver is a plain instance.
    pub fn method<F>(mut self, name: impl Into<String>, bind: F) -> Self
    where
        F: Fn(Arc<T>) -> Callable + Send + Sync + 'static,
    {
        self.schema.value_methods.insert(name.into(), binder(bind));
        self
    }

    /// A method whose receiver is a shared reference.
    pub fn ref_method<F>(mut self, name: impl Into<String>, bind: F) -> Self
    where
        F: Fn(Arc<T>) -> Callable + Send + Sync + 'static,
    {
        self.schema.ref_methods.insert(name.into(), binder(bind));
        self
    }

    pub fn build(self) -> RecordType<T> {
        RecordType {
            schema: Arc::new(self.schema),
            _marker: PhantomData,
        }
    }
}

fn binder<T, F>(bind: F) -> MethodFn
where
    T: Any + Send + Sync,
    F: Fn(Arc<T>) -> Callable + Send + Sync + 'static,
{
    Box::new(move |data: Data| data.downcast::<T>().ok().map(&bind))
}

/// A host struct value: shared data plus its accessor table.
#[derive(Clone)]
pub struct Record {
    schema: Arc<RecordSchema>,
    data: Data,
    addressable: bool,
}

impl Record {
    pub fn type_name(&self) -> &str {
        &self.schema.name
    }

    pub fn is_addressable(&self) -> bool {
        self.addressable
    }

    /// Resolve `name` as a field, then as a bound method.
    ///
    /// Methods declared for this instance's receiver form win; the other
    /// form is the fallback.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(field) = self.schema.fields.get(name) {
            return Some(field(self.data.as_ref()));
        }
        let (exact, fallback) = if self.addressable {
            (&self.schema.ref_methods, &self.schema.value_methods)
        } else {
            (&self.schema.value_methods, &self.schema.ref_methods)
        };
        if let Some(bind) = exact.get(name) {
            return bind(Arc::clone(&self.data)).map(Value::Callable);
        }
        let bind = fallback.get(name)?;
        trace!(
            record = %self.schema.name,
            method = name,
            addressable = self.addressable,
            "binding method through receiver fallback"
        );
        bind(Arc::clone(&self.data)).map(Value::Callable)
    }

    pub fn same_instance(&self, other: &Record) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.data) as *const (),
            Arc::as_ptr(&other.data) as *const (),
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.schema.name)?;
        for (i, (name, get)) in self.schema.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}:{}", get(self.data.as_ref()))?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.schema.name)
            .field("addressable", &self.addressable)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
