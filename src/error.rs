//! Errors surfaced synchronously by the socket API.

/// Errors returned by [`SturdySocket`](crate::SturdySocket) methods.
///
/// Transport-level failures (abrupt closes, protocol errors, connect
/// timeouts) never show up here; they are absorbed by the reconnection
/// state machine and reported through events only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No `transport_factory` was configured and the built-in WebSocket
    /// factory is unavailable.
    #[error(
        "no transport factory: set Options::transport_factory or enable the `native-ws` feature"
    )]
    NoTransportFactory,

    /// Backoff or timeout configuration that the schedule cannot honour.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `send` was called after the socket reached its terminal closed state.
    #[error("socket is closed")]
    Closed,

    /// `reconnect` was called after the socket reached its terminal closed state.
    #[error("cannot reconnect: socket already closed")]
    AlreadyClosed,
}
