//! Built-in WebSocket transport over tokio-tungstenite.
//!
//! One spawned task per connection attempt runs the handshake and then a
//! combined read/write pump. Frames map onto [`TransportEvent`]s; pings
//! are answered in place; close frames and stream errors become `Closed`
//! events with the appropriate status code.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
use crate::types::Payload;

/// Abnormal closure, no close handshake (RFC 6455 §7.4.1).
const CLOSE_ABNORMAL: u16 = 1006;
/// No status code present in the close frame.
const CLOSE_NO_STATUS: u16 = 1005;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// [`TransportFactory`] producing WebSocket connections.
///
/// This is what a socket uses when `Options::transport_factory` is left
/// unset. `ws://` and `wss://` URLs are accepted; TLS is handled by
/// tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn connect(&self, url: &str, protocols: &[String]) -> (Box<dyn Transport>, TransportEvents) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_connection(
            url.to_string(),
            protocols.to_vec(),
            event_tx,
            out_rx,
            cancel.clone(),
        ));

        (Box::new(WsTransport { out_tx, cancel }), event_rx)
    }
}

enum Outbound {
    Payload(Payload),
    Close(Option<(u16, String)>),
}

struct WsTransport {
    out_tx: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl Transport for WsTransport {
    fn send(&mut self, payload: Payload) {
        let _ = self.out_tx.send(Outbound::Payload(payload));
    }

    fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        let frame = code.map(|code| (code, reason.unwrap_or_default()));
        let _ = self.out_tx.send(Outbound::Close(frame));
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        // Aborts a handshake still in flight; an established pump exits
        // through the closed command channel instead.
        self.cancel.cancel();
    }
}

fn build_request(
    url: &str,
    protocols: &[String],
) -> Result<tungstenite::handshake::client::Request, tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if !protocols.is_empty() {
        let value = tungstenite::http::HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

async fn run_connection(
    url: String,
    protocols: Vec<String>,
    event_tx: mpsc::Sender<TransportEvent>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    let request = match build_request(&url, &protocols) {
        Ok(request) => request,
        Err(e) => {
            warn!(%url, error = %e, "invalid websocket request");
            let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
            let _ = event_tx
                .send(TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: e.to_string(),
                    was_clean: false,
                })
                .await;
            return;
        }
    };

    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%url, "handshake abandoned");
            return;
        }
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(%url, error = %e, "websocket connect failed");
                let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                let _ = event_tx
                    .send(TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: e.to_string(),
                        was_clean: false,
                    })
                    .await;
                return;
            }
        }
    };

    debug!(%url, "websocket open");
    if event_tx.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return;
            }

            command = out_rx.recv() => match command {
                Some(Outbound::Payload(payload)) => {
                    let message = match payload {
                        Payload::Text(text) => tungstenite::Message::Text(text.into()),
                        Payload::Binary(data) => tungstenite::Message::Binary(data.into()),
                    };
                    if let Err(e) = write.send(message).await {
                        warn!(%url, error = %e, "websocket write failed");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = event_tx
                            .send(TransportEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: e.to_string(),
                                was_clean: false,
                            })
                            .await;
                        return;
                    }
                }
                Some(Outbound::Close(frame)) => {
                    let (code, reason) = frame
                        .clone()
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    let close_message =
                        tungstenite::Message::Close(frame.map(|(code, reason)| CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        }));
                    let _ = write.send(close_message).await;
                    let _ = event_tx
                        .send(TransportEvent::Closed {
                            code,
                            reason,
                            was_clean: true,
                        })
                        .await;
                    return;
                }
                // Transport handle dropped.
                None => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return;
                }
            },

            incoming = read.next() => match incoming {
                Some(Ok(message)) => match message {
                    tungstenite::Message::Text(text) => {
                        let event = TransportEvent::Message(Payload::Text(text.as_str().to_owned()));
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    tungstenite::Message::Binary(data) => {
                        let event = TransportEvent::Message(Payload::Binary(data.to_vec()));
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Pong(_) => {
                        trace!("received pong");
                    }
                    tungstenite::Message::Close(frame) => {
                        debug!(%url, "received close frame");
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        let _ = event_tx
                            .send(TransportEvent::Closed {
                                code,
                                reason,
                                was_clean: true,
                            })
                            .await;
                        return;
                    }
                    tungstenite::Message::Frame(_) => {}
                },
                Some(Err(e)) => {
                    warn!(%url, error = %e, "websocket read error");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                            was_clean: false,
                        })
                        .await;
                    return;
                }
                None => {
                    debug!(%url, "websocket stream ended");
                    let _ = event_tx
                        .send(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "connection reset".into(),
                            was_clean: false,
                        })
                        .await;
                    return;
                }
            },
        }
    }
}
