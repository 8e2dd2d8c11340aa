//! Cooperative cancellation.
//!
//! A [`CancelHandle`] is the sending side: the evaluator trips it on timeout,
//! and callers may hold a clone to cancel an evaluation from outside. A
//! [`CallContext`] is the receiving side, checked by the interpreter at every
//! node and handed to host callables that declare a context parameter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::error::EvalError;

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        CancelHandle { tx: Arc::new(tx) }
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot see a closed channel.
        let _ = rx.wait_for(|tripped| *tripped).await;
    }

    pub(crate) fn context(&self, timeout: Duration) -> CallContext {
        CallContext {
            rx: self.tx.subscribe(),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }
}

/// Read side of a cancellation signal plus the evaluation deadline.
#[derive(Debug, Clone)]
pub struct CallContext {
    rx: watch::Receiver<bool>,
    deadline: Instant,
    timeout: Duration,
}

impl CallContext {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || Instant::now() >= self.deadline
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `Err` once the signal has fired or the deadline has passed.
    pub fn check(&self) -> Result<(), EvalError> {
        if *self.rx.borrow() {
            return Err(EvalError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(EvalError::TimedOut(self.timeout));
        }
        Ok(())
    }
}
