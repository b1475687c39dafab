//! Resilient client-side socket wrapper.
//!
//! [`SturdySocket`] presents the same surface as a raw full-duplex
//! message socket but transparently recovers from transport-level
//! disconnections: failed connections are retried with deterministic
//! exponential backoff, payloads sent while disconnected are buffered
//! and flushed in order on the next successful open, a connect timeout
//! aborts attempts that hang, and a caller-supplied predicate can veto
//! further reconnection based on close diagnostics. Application code
//! gets to treat a flaky network transport as an always-available
//! channel.
//!
//! Besides the usual `open` / `message` / `close` / `error`
//! notifications, two extensions report recovery progress: `down` when
//! a retry episode begins and `reopen` when one ends in success. The
//! terminal `close` fires exactly once and is the only definitive
//! "never again" signal.
//!
//! The default transport is a WebSocket over tokio-tungstenite (cargo
//! feature `native-ws`, enabled by default); any other full-duplex
//! channel plugs in through [`TransportFactory`].
//!
//! ```no_run
//! use sturdy_ws::{Options, Payload, SturdySocket};
//!
//! # async fn demo() -> Result<(), sturdy_ws::Error> {
//! let socket = SturdySocket::new("wss://example.com/feed", Options::default())?;
//! socket.on_message(|event| println!("{event:?}"));
//! socket.on_down(|_| eprintln!("connection lost, retrying"));
//! socket.on_reopen(|_| eprintln!("connection restored"));
//! socket.send(Payload::Text("hello".into()))?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod events;
pub mod gate;
mod queue;
pub mod socket;
pub mod transport;
pub mod types;
#[cfg(feature = "native-ws")]
pub mod ws;

pub use backoff::BackoffConfig;
pub use error::Error;
pub use events::{Event, EventKind, ListenerId};
pub use gate::{Decision, ReconnectPredicate};
pub use socket::SturdySocket;
pub use transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
pub use types::{CloseEvent, ConnectionState, Options, Payload};
#[cfg(feature = "native-ws")]
pub use ws::WsTransportFactory;
