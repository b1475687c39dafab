//! Connection lifecycle controller: the socket-like surface and the
//! reconnection state machine behind it.
//!
//! The controller runs as one spawned task driven by `tokio::select!`
//! over handle commands, events from the live transport, the retry
//! timer, the connect-timeout watchdog, and a pending deferred
//! reconnect decision. Every transition happens inside this single
//! task, so state never needs locking and at most one transport is live
//! at any time.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tracing::{debug, info, trace, warn};

use crate::backoff::BackoffConfig;
use crate::error::Error;
use crate::events::{Event, EventKind, ListenerId, Registry};
use crate::gate::{Decision, ReconnectGate};
use crate::queue::SendQueue;
use crate::transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
use crate::types::{CloseEvent, ConnectionState, Options, Payload};

/// Normal closure status (RFC 6455 §7.4.1), used when force-closing a
/// transport on manual reconnect or shutdown.
const NORMAL_CLOSURE: u16 = 1000;

enum Command {
    Send(Payload),
    Reconnect,
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// A socket-like handle that transparently survives transport failures.
///
/// Behaves like a plain full-duplex message socket, but reconnects with
/// exponential backoff when the transport drops, buffers payloads sent
/// while disconnected and flushes them on the next open, and lets a
/// caller-supplied predicate veto further reconnection. Ordinary senders
/// and receivers never have to special-case reconnection: [`send`]
/// fails only after the terminal close.
///
/// Must be created inside a tokio runtime. Dropping the handle shuts
/// the controller down and closes any live transport without firing a
/// terminal close event.
///
/// [`send`]: SturdySocket::send
pub struct SturdySocket {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    registry: Arc<Registry>,
}

impl SturdySocket {
    /// Opens a socket to `url` and starts the connect cycle.
    ///
    /// Fails synchronously on invalid backoff configuration, or when no
    /// transport factory is configured and the built-in one is
    /// unavailable.
    pub fn new(url: impl Into<String>, options: Options) -> Result<Self, Error> {
        let url = url.into();
        let backoff = BackoffConfig {
            min_delay: options.min_reconnect_delay,
            max_delay: options.max_reconnect_delay,
            factor: options.reconnect_backoff_factor,
            max_attempts: options.max_reconnect_attempts,
        };
        backoff.validate()?;

        let factory = match options.transport_factory {
            Some(factory) => factory,
            None => default_factory().ok_or(Error::NoTransportFactory)?,
        };

        let registry = Arc::new(Registry::default());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let controller = Controller {
            url,
            protocols: options.protocols,
            factory,
            backoff,
            connect_timeout: options.connect_timeout,
            gate: ReconnectGate::new(options.should_reconnect),
            registry: registry.clone(),
            state_tx,
            cmd_rx,
            active: None,
            queue: SendQueue::default(),
            attempts: 0,
            has_opened: false,
            is_down: false,
            last_close: None,
            retry_timer: None,
            watchdog: None,
            pending_decision: None,
        };
        tokio::spawn(controller.run());

        Ok(Self {
            cmd_tx,
            state_rx,
            registry,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Sends a payload, or buffers it if no transport is currently open.
    ///
    /// Buffered payloads are delivered in order on the next successful
    /// open, ahead of anything sent after that open. Fails only after
    /// the terminal close.
    pub fn send(&self, payload: Payload) -> Result<(), Error> {
        if self.state() == ConnectionState::Closed {
            return Err(Error::Closed);
        }
        self.cmd_tx
            .send(Command::Send(payload))
            .map_err(|_| Error::Closed)
    }

    /// Force-closes the current transport (if any) and immediately
    /// starts a fresh connect cycle with the attempt counter reset to
    /// zero. Fires one `Down` notification with no diagnostics, then
    /// `Reopen` on success.
    pub fn reconnect(&self) -> Result<(), Error> {
        if self.state() == ConnectionState::Closed {
            return Err(Error::AlreadyClosed);
        }
        self.cmd_tx
            .send(Command::Reconnect)
            .map_err(|_| Error::AlreadyClosed)
    }

    /// Closes the socket for good: cancels timers, closes the transport
    /// if present, and fires the terminal `Close` notification exactly
    /// once. Idempotent.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let _ = self.cmd_tx.send(Command::Close {
            code,
            reason: reason.map(str::to_owned),
        });
    }

    /// Registers a listener for one event type. Any number of listeners
    /// may be registered per type; all of them fire.
    pub fn add_listener(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.registry.add(kind, Arc::new(listener))
    }

    /// Removes a listener registered with [`add_listener`](Self::add_listener).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.registry.remove(id)
    }

    /// Sets the single-slot `open` handler, replacing any previous one.
    /// The slot fires alongside listeners registered for the same type.
    pub fn on_open(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry.set_slot(EventKind::Open, Some(Arc::new(handler)));
    }

    /// Sets the single-slot `message` handler.
    pub fn on_message(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry
            .set_slot(EventKind::Message, Some(Arc::new(handler)));
    }

    /// Sets the single-slot terminal `close` handler.
    pub fn on_close(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry
            .set_slot(EventKind::Close, Some(Arc::new(handler)));
    }

    /// Sets the single-slot `error` handler.
    pub fn on_error(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry
            .set_slot(EventKind::Error, Some(Arc::new(handler)));
    }

    /// Sets the single-slot `down` handler.
    pub fn on_down(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry.set_slot(EventKind::Down, Some(Arc::new(handler)));
    }

    /// Sets the single-slot `reopen` handler.
    pub fn on_reopen(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.registry
            .set_slot(EventKind::Reopen, Some(Arc::new(handler)));
    }

    /// Clears the single-slot handler for `kind`.
    pub fn clear_handler(&self, kind: EventKind) {
        self.registry.set_slot(kind, None);
    }
}

#[cfg(feature = "native-ws")]
fn default_factory() -> Option<Arc<dyn TransportFactory>> {
    Some(Arc::new(crate::ws::WsTransportFactory))
}

#[cfg(not(feature = "native-ws"))]
fn default_factory() -> Option<Arc<dyn TransportFactory>> {
    None
}

struct ActiveTransport {
    handle: Box<dyn Transport>,
    events: TransportEvents,
}

enum Wake {
    Cmd(Option<Command>),
    Transport(Option<TransportEvent>),
    Retry,
    Watchdog,
    Decision(bool),
}

struct Controller {
    url: String,
    protocols: Vec<String>,
    factory: Arc<dyn TransportFactory>,
    backoff: BackoffConfig,
    connect_timeout: Option<Duration>,
    gate: ReconnectGate,
    registry: Arc<Registry>,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,

    active: Option<ActiveTransport>,
    queue: SendQueue,
    /// Reconnection attempts since the last successful open.
    attempts: u32,
    has_opened: bool,
    /// Inside a retry episode: a `Down` was fired and no `Reopen` yet.
    is_down: bool,
    /// Diagnostics of the most recent transport closure.
    last_close: Option<CloseEvent>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    watchdog: Option<Pin<Box<Sleep>>>,
    /// Deferred gate decision for the current episode, with the attempt
    /// index it will schedule on approval. Dropped (and thereby voided)
    /// by manual reconnect and close.
    pending_decision: Option<(u32, BoxFuture<'static, bool>)>,
}

async fn next_transport_event(active: &mut Option<ActiveTransport>) -> Option<TransportEvent> {
    match active {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn poll_decision(decision: &mut Option<(u32, BoxFuture<'static, bool>)>) -> bool {
    match decision {
        Some((_, fut)) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Controller {
    async fn run(mut self) {
        self.begin_attempt();
        loop {
            let wake = tokio::select! {
                command = self.cmd_rx.recv() => Wake::Cmd(command),
                event = next_transport_event(&mut self.active) => Wake::Transport(event),
                () = sleep_opt(&mut self.retry_timer) => Wake::Retry,
                () = sleep_opt(&mut self.watchdog) => Wake::Watchdog,
                approved = poll_decision(&mut self.pending_decision) => Wake::Decision(approved),
            };

            let done = match wake {
                Wake::Cmd(Some(command)) => self.handle_command(command),
                Wake::Cmd(None) => {
                    self.shutdown_silently();
                    true
                }
                Wake::Transport(Some(event)) => self.handle_transport_event(event),
                Wake::Transport(None) => {
                    // Event channel closed without a Closed event: the
                    // transport task died. Treat as an unclean close.
                    self.active = None;
                    self.handle_transport_closed(None)
                }
                Wake::Retry => {
                    self.retry_timer = None;
                    self.begin_attempt();
                    false
                }
                Wake::Watchdog => {
                    self.watchdog = None;
                    warn!(url = %self.url, "connect timeout elapsed, aborting attempt");
                    if let Some(mut active) = self.active.take() {
                        active
                            .handle
                            .close(Some(NORMAL_CLOSURE), Some("connect timeout".into()));
                    }
                    self.handle_transport_closed(None)
                }
                Wake::Decision(approved) => match self.pending_decision.take() {
                    Some((index, _)) => self.resolve_decision(index, approved),
                    None => false,
                },
            };
            if done {
                return;
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state() != state {
            trace!(url = %self.url, state = ?state, "state change");
            self.state_tx.send_replace(state);
        }
    }

    /// Constructs a transport and arms the watchdog for this attempt.
    fn begin_attempt(&mut self) {
        debug!(url = %self.url, attempt = self.attempts, "starting connection attempt");
        self.set_state(ConnectionState::Connecting);
        let (handle, events) = self.factory.connect(&self.url, &self.protocols);
        self.active = Some(ActiveTransport { handle, events });
        self.watchdog = self
            .connect_timeout
            .map(|timeout| Box::pin(tokio::time::sleep(timeout)));
    }

    /// Returns `true` when the controller should terminate.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Send(payload) => {
                if self.state() == ConnectionState::Open {
                    if let Some(active) = self.active.as_mut() {
                        active.handle.send(payload);
                    }
                } else {
                    trace!(buffered = self.queue.len() + 1, "no open transport, buffering payload");
                    self.queue.push(payload);
                }
                false
            }
            Command::Reconnect => {
                self.manual_reconnect();
                false
            }
            Command::Close { code, reason } => {
                self.manual_close(code, reason);
                true
            }
        }
    }

    fn manual_reconnect(&mut self) {
        info!(url = %self.url, "manual reconnect requested");
        self.retry_timer = None;
        self.watchdog = None;
        self.pending_decision = None;
        if let Some(mut active) = self.active.take() {
            active
                .handle
                .close(Some(NORMAL_CLOSURE), Some("manual reconnect".into()));
        }
        self.attempts = 0;
        self.mark_down(None);
        self.begin_attempt();
    }

    fn manual_close(&mut self, code: Option<u16>, reason: Option<String>) {
        self.retry_timer = None;
        self.watchdog = None;
        self.pending_decision = None;
        if let Some(mut active) = self.active.take() {
            active
                .handle
                .close(code.or(Some(NORMAL_CLOSURE)), reason.clone());
        }
        let diagnostics = CloseEvent {
            code: code.unwrap_or(NORMAL_CLOSURE),
            reason: reason.unwrap_or_default(),
            was_clean: true,
        };
        self.terminal_close(Some(diagnostics));
    }

    /// Handle dropped: stop without firing a terminal close, since no
    /// caller is left to act on it.
    fn shutdown_silently(&mut self) {
        debug!(url = %self.url, "handle dropped, shutting down");
        self.retry_timer = None;
        self.watchdog = None;
        self.pending_decision = None;
        if let Some(mut active) = self.active.take() {
            active.handle.close(Some(NORMAL_CLOSURE), None);
        }
        self.state_tx.send_replace(ConnectionState::Closed);
    }

    fn handle_transport_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Opened => {
                self.handle_transport_open();
                false
            }
            TransportEvent::Message(payload) => {
                self.registry.emit(&Event::Message(payload));
                false
            }
            TransportEvent::Error(error) => {
                warn!(url = %self.url, error = %error, "transport error");
                self.registry.emit(&Event::Error(error));
                false
            }
            TransportEvent::Closed {
                code,
                reason,
                was_clean,
            } => {
                self.active = None;
                self.handle_transport_closed(Some(CloseEvent {
                    code,
                    reason,
                    was_clean,
                }))
            }
        }
    }

    fn handle_transport_open(&mut self) {
        self.watchdog = None;
        self.attempts = 0;
        self.set_state(ConnectionState::Open);

        // Flush before notifying, so nothing sent from an open/reopen
        // handler can overtake the buffered backlog.
        let buffered = self.queue.drain();
        if !buffered.is_empty() {
            debug!(url = %self.url, count = buffered.len(), "flushing buffered payloads");
        }
        if let Some(active) = self.active.as_mut() {
            for payload in buffered {
                active.handle.send(payload);
            }
        }

        if self.has_opened {
            info!(url = %self.url, "reconnected");
            self.is_down = false;
            self.registry.emit(&Event::Reopen);
        } else {
            info!(url = %self.url, "connected");
            self.has_opened = true;
            self.is_down = false;
            self.registry.emit(&Event::Open);
        }
    }

    /// One connection attempt failed (transport closed, transport task
    /// died, or the watchdog fired). Returns `true` on terminal close.
    fn handle_transport_closed(&mut self, diagnostics: Option<CloseEvent>) -> bool {
        self.watchdog = None;
        self.last_close = diagnostics.clone();
        self.mark_down(diagnostics.clone());
        self.set_state(ConnectionState::Down);

        // Exhaustion forces the terminal close even if a deferred
        // decision would have approved later.
        let index = self.attempts;
        self.attempts += 1;
        if self.attempts > self.backoff.max_attempts {
            info!(url = %self.url, attempts = index, "retry attempts exhausted");
            self.terminal_close(self.last_close.clone());
            return true;
        }

        match self.gate.decide(diagnostics.as_ref()) {
            Decision::Now(true) => {
                self.schedule_retry(index);
                false
            }
            Decision::Now(false) => {
                info!(url = %self.url, "reconnect vetoed");
                self.terminal_close(self.last_close.clone());
                true
            }
            Decision::Deferred(fut) => {
                debug!(url = %self.url, "awaiting deferred reconnect decision");
                self.pending_decision = Some((index, fut));
                false
            }
        }
    }

    /// A deferred gate decision resolved for the current episode.
    fn resolve_decision(&mut self, index: u32, approved: bool) -> bool {
        if approved {
            self.schedule_retry(index);
            false
        } else {
            info!(url = %self.url, "reconnect vetoed (deferred)");
            self.terminal_close(self.last_close.clone());
            true
        }
    }

    fn schedule_retry(&mut self, index: u32) {
        let delay = self.backoff.delay_for_attempt(index);
        info!(
            url = %self.url,
            attempt = index + 1,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.retry_timer = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Fires `Down` once per episode.
    fn mark_down(&mut self, diagnostics: Option<CloseEvent>) {
        if !self.is_down {
            self.is_down = true;
            warn!(url = %self.url, diagnostics = ?diagnostics, "connection down");
            self.registry.emit(&Event::Down(diagnostics));
        }
    }

    /// Transitions to the irreversible closed state. Callers terminate
    /// the run loop right after, so the notification fires exactly once.
    fn terminal_close(&mut self, diagnostics: Option<CloseEvent>) {
        info!(url = %self.url, "socket closed");
        self.set_state(ConnectionState::Closed);
        self.registry.emit(&Event::Close(diagnostics));
    }
}
