//! The evaluation boundary.
//!
//! ```text
//!   Ready ──evaluate──▶ Running ──┬── task done ───────▶ Completed (value or error)
//!                                 ├── timeout fires ───▶ TimedOut   (task abandoned)
//!                                 └── handle cancelled ▶ Cancelled  (task abandoned)
//! ```
//!
//! The tree-walk runs on a `spawn_blocking` task so host callables may block.
//! On timeout or cancellation the signal is tripped and the task is left to
//! notice it at its next node boundary; a host callable that never returns
//! keeps its blocking thread until it does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::ast::Expr;
use super::cancel::CancelHandle;
use super::error::EvalError;
use super::interp::Interpreter;
use super::lexer::Delimiters;
use super::parser::parse_with;
use super::value::{Namespace, Value};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub timeout: Duration,
    pub delimiters: Delimiters,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            timeout: DEFAULT_TIMEOUT,
            delimiters: Delimiters::default(),
        }
    }
}

impl Options {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Action markers for [`Evaluator::parse`].
    ///
    /// An empty marker cannot be scanned for, so if either `open` or `close`
    /// is empty the default `@{{` / `}}` pair is used instead; `options()`
    /// reports the pair actually in effect.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = Delimiters::new(delimiters.open, delimiters.close);
        self
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluates parsed templates against a shared namespace.
///
/// Clones share the namespace but not the options. Any number of
/// evaluations may run at once; namespace writes wait for in-flight
/// evaluations to finish.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    members: Arc<RwLock<Arc<Namespace>>>,
    options: Options,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members<K, V>(members: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let ns: Namespace = members
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Evaluator {
            members: Arc::new(RwLock::new(Arc::new(ns))),
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.options.timeout = timeout;
    }

    /// Parse `src` with this evaluator's delimiters.
    pub fn parse(&self, src: &str) -> Arc<Expr> {
        Arc::new(parse_with(src, &self.options.delimiters))
    }

    // ── Namespace ─────────────────────────────────────────────────────────────

    /// Replace the whole namespace.
    pub async fn set_members(&self, members: Namespace) {
        *self.members.write().await = Arc::new(members);
    }

    pub async fn add_member(&self, name: impl Into<String>, value: impl Into<Value>) {
        let mut guard = self.members.write().await;
        Arc::make_mut(&mut guard).insert(name.into(), value.into());
    }

    /// Merge `members` into the namespace; existing names are overwritten.
    pub async fn add_members<K, V>(&self, members: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut guard = self.members.write().await;
        let ns = Arc::make_mut(&mut guard);
        for (k, v) in members {
            ns.insert(k.into(), v.into());
        }
    }

    /// Current namespace snapshot.
    pub async fn members(&self) -> Arc<Namespace> {
        Arc::clone(&*self.members.read().await)
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    pub async fn evaluate(&self, ast: Arc<Expr>) -> Result<Value, EvalError> {
        self.evaluate_with_cancel(ast, CancelHandle::new()).await
    }

    /// Parse and evaluate in one step.
    pub async fn evaluate_str(&self, src: &str) -> Result<Value, EvalError> {
        self.evaluate(self.parse(src)).await
    }

    /// Evaluate `ast`, giving up when `cancel` fires or the timeout passes.
    pub async fn evaluate_with_cancel(
        &self,
        ast: Arc<Expr>,
        cancel: CancelHandle,
    ) -> Result<Value, EvalError> {
        let guard = Arc::clone(&self.members).read_owned().await;
        let ns = Arc::clone(&*guard);
        let timeout = self.options.timeout;
        let ctx = cancel.context(timeout);
        let started = Instant::now();
        debug!(root = ast.kind_name(), ?timeout, "evaluation started");

        let mut task = tokio::task::spawn_blocking(move || Interpreter::new(&ns, &ctx).run(&ast));
        let outcome = tokio::select! {
            biased;
            joined = &mut task => {
                joined.unwrap_or_else(|e| Err(EvalError::Panicked(panic_message(e))))
            }
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                warn!(?timeout, "evaluation timed out; abandoning task");
                Err(EvalError::TimedOut(timeout))
            }
            _ = cancel.cancelled() => {
                warn!("evaluation cancelled; abandoning task");
                Err(EvalError::Cancelled)
            }
        };
        drop(guard);

        debug!(elapsed = ?started.elapsed(), ok = outcome.is_ok(), "evaluation finished");
        outcome
    }

    /// Run [`evaluate`](Self::evaluate) on a private runtime.
    ///
    /// Must not be called from inside a Tokio runtime.
    pub fn evaluate_blocking(&self, ast: Arc<Expr>) -> Result<Value, EvalError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let result = rt.block_on(self.evaluate(ast));
        // An abandoned task must not hold up the caller.
        rt.shutdown_background();
        result
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned()),
        Err(err) => err.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
