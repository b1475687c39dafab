//! Public types: connection state, close diagnostics, payloads, options.

use std::sync::Arc;
use std::time::Duration;

use crate::gate::{ReconnectPredicate, always_approve};
use crate::transport::TransportFactory;

/// Lifecycle state of a [`SturdySocket`](crate::SturdySocket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open; sends go straight through.
    Open,
    /// Disconnected, with a retry scheduled or a reconnect decision
    /// outstanding.
    Down,
    /// Terminal state. No further transport activity.
    Closed,
}

/// Diagnostics from a transport closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

/// A message payload. Opaque to the reconnection core; framing and
/// serialization are the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// Configuration for [`SturdySocket::new`](crate::SturdySocket::new).
///
/// The defaults give an immediate first retry, then 1s growing by 1.5x
/// per attempt up to 30s, with no attempt limit and no connect timeout.
#[derive(Clone)]
pub struct Options {
    /// Sub-protocols advertised to the transport.
    pub protocols: Vec<String>,
    /// Delay before the second retry of an episode (the first is immediate).
    pub min_reconnect_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_reconnect_delay: Duration,
    /// Multiplier applied to the delay for each subsequent attempt.
    /// Must be positive; validated at construction.
    pub reconnect_backoff_factor: f64,
    /// Attempts allowed since the last successful open before the socket
    /// closes for good.
    pub max_reconnect_attempts: u32,
    /// Time an attempt may spend connecting before it is aborted and
    /// counted as a failure. `None` disables the watchdog.
    pub connect_timeout: Option<Duration>,
    /// Veto predicate consulted after every unexpected closure.
    pub should_reconnect: ReconnectPredicate,
    /// Builds the underlying transports. When unset, the built-in
    /// WebSocket factory is used if the `native-ws` feature is enabled;
    /// otherwise construction fails.
    pub transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            min_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            reconnect_backoff_factor: 1.5,
            max_reconnect_attempts: u32::MAX,
            connect_timeout: None,
            should_reconnect: always_approve(),
            transport_factory: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("protocols", &self.protocols)
            .field("min_reconnect_delay", &self.min_reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("reconnect_backoff_factor", &self.reconnect_backoff_factor)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("transport_factory", &self.transport_factory.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Decision;

    #[test]
    fn default_options() {
        let options = Options::default();
        assert_eq!(options.min_reconnect_delay, Duration::from_secs(1));
        assert_eq!(options.max_reconnect_delay, Duration::from_secs(30));
        assert!((options.reconnect_backoff_factor - 1.5).abs() < f64::EPSILON);
        assert_eq!(options.max_reconnect_attempts, u32::MAX);
        assert!(options.connect_timeout.is_none());
        assert!(options.transport_factory.is_none());
        assert!(matches!(
            (options.should_reconnect)(None),
            Decision::Now(true)
        ));
    }

    #[test]
    fn close_event_equality() {
        let a = CloseEvent {
            code: 1000,
            reason: "done".into(),
            was_clean: true,
        };
        assert_eq!(a, a.clone());
        assert_ne!(
            a,
            CloseEvent {
                code: 1006,
                reason: "done".into(),
                was_clean: false,
            }
        );
    }
}
