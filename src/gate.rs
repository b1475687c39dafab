//! Reconnect decision gate: a synchronous-or-deferred veto over close
//! diagnostics.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::types::CloseEvent;

/// Verdict returned by a [`ReconnectPredicate`].
///
/// `true` approves another connection attempt, `false` closes the socket
/// for good with the diagnostics of the closure under decision.
pub enum Decision {
    /// Decide immediately.
    Now(bool),
    /// Decide later. The socket stays down (no retry scheduled, no
    /// terminal close) until the future resolves. A manual `reconnect()`
    /// or `close()` in the meantime discards the decision.
    Deferred(BoxFuture<'static, bool>),
}

impl From<bool> for Decision {
    fn from(approved: bool) -> Self {
        Decision::Now(approved)
    }
}

impl std::fmt::Debug for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Now(approved) => f.debug_tuple("Now").field(approved).finish(),
            Decision::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Predicate consulted after every unexpected transport closure. The
/// diagnostics are `None` when the closure came from a connect timeout.
pub type ReconnectPredicate = Arc<dyn Fn(Option<&CloseEvent>) -> Decision + Send + Sync>;

/// The default predicate: always approve another attempt.
pub(crate) fn always_approve() -> ReconnectPredicate {
    Arc::new(|_| Decision::Now(true))
}

/// Wraps the veto predicate for the lifecycle controller.
pub(crate) struct ReconnectGate {
    predicate: ReconnectPredicate,
}

impl ReconnectGate {
    pub(crate) fn new(predicate: ReconnectPredicate) -> Self {
        Self { predicate }
    }

    /// Evaluates the predicate for one closure.
    pub(crate) fn decide(&self, diagnostics: Option<&CloseEvent>) -> Decision {
        (self.predicate)(diagnostics)
    }
}
