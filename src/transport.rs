//! Transport abstraction driven by the reconnection core.
//!
//! A transport is a full-duplex message channel: commands go in through
//! [`Transport`], lifecycle notifications and inbound traffic come back
//! as [`TransportEvent`]s on a channel. Connecting hands back a possibly
//! half-open transport immediately; whether the attempt succeeded arrives
//! later as `Opened` or `Closed`.

use tokio::sync::mpsc;

use crate::types::Payload;

/// Lifecycle and traffic notifications from a transport, in delivery
/// order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The channel finished its handshake and is ready for traffic.
    Opened,
    /// Inbound payload.
    Message(Payload),
    /// Transport-level error. A `Closed` event follows.
    Error(String),
    /// The channel is gone. Always the last event a transport emits.
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
}

/// Command surface of a live (possibly still half-open) transport.
///
/// The handle is exclusively owned by the socket's lifecycle controller;
/// nothing else sends through it or closes it.
pub trait Transport: Send {
    /// Queues a payload for delivery. Payloads handed to a dying
    /// transport are dropped; the caller learns about the death from the
    /// `Closed` event and recovers through the reconnect cycle.
    fn send(&mut self, payload: Payload);

    /// Starts closing the channel.
    fn close(&mut self, code: Option<u16>, reason: Option<String>);
}

/// Receiver half of a transport.
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Builds transports. A factory is asked for one transport per
/// connection attempt, any number of times over a socket's lifetime.
pub trait TransportFactory: Send + Sync {
    fn connect(&self, url: &str, protocols: &[String]) -> (Box<dyn Transport>, TransportEvents);
}
