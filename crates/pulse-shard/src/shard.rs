//! Shard runtime
//!
//! Owns the socket, runs the receive/heartbeat loop, interprets operations
//! and close codes, drives reconnection, and forwards named events to the
//! dispatch sink.

use crate::close::{classify_close, was_normal_close, CloseIntent};
use crate::config::ShardConfig;
use crate::decoder::FrameDecoder;
use crate::dispatch::{DispatchSink, ParserRegistry};
use crate::error::{ShardError, ShardResult};
use crate::ratelimit::GatewayRatelimiter;
use crate::status::ConnectionStatus;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pulse_protocol::{Envelope, IdentifyPayload, IdentifyProperties, OpCode, ResumePayload};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Heartbeat interval used before the server negotiates one
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(41_250);

/// Pause before reconnecting after a connection attempt itself failed
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Guild member count above which the server is asked to lazy-load members
const LARGE_THRESHOLD: u16 = 250;

/// Lifecycle of one shard connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// No connection and none being attempted
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Socket open, waiting for the server's Hello
    AwaitingHello,
    /// Cold-start handshake sent
    Identifying,
    /// Warm-resume handshake sent
    Resuming,
    /// Session established, events flowing
    Ready,
    /// Connection lost, reconnect pending
    Reconnecting,
    /// Operator shutdown; no further reconnects
    Killed,
}

/// How one connection attempt ended
enum ConnectionEnd {
    /// The peer closed the socket, possibly with a close code
    Closed(Option<u16>),
    /// A transport or protocol fault ended the receive loop
    Fault(ShardError),
    /// The socket never opened
    ConnectFailed(ShardError),
}

/// One persistent, resumable gateway connection
///
/// The receive/heartbeat loop runs on its own tokio task and is the sole
/// reader of the socket; outbound sends from any task are serialized
/// through a single writer lock.
pub struct Shard {
    config: ShardConfig,
    status: Mutex<ConnectionStatus>,
    registry: ParserRegistry,
    sink: Arc<dyn DispatchSink>,
    ratelimiter: GatewayRatelimiter,
    heartbeat_interval: Mutex<Duration>,
    writer: AsyncMutex<Option<WsWriter>>,
    explicit_close: Mutex<Option<u16>>,
    kill: AtomicBool,
    state_tx: watch::Sender<ShardState>,
    state_rx: watch::Receiver<ShardState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Shard {
    /// Create a shard
    ///
    /// The parser registry and dispatch sink are owned by the surrounding
    /// application; the shard only routes through them.
    #[must_use]
    pub fn new(config: ShardConfig, registry: ParserRegistry, sink: Arc<dyn DispatchSink>) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(ShardState::Disconnected);
        let shard_id = config.shard_id;

        let status = match &config.gateway_url {
            Some(url) => ConnectionStatus::with_endpoint(shard_id, url.clone()),
            None => ConnectionStatus::new(shard_id),
        };

        Arc::new(Self {
            status: Mutex::new(status),
            ratelimiter: GatewayRatelimiter::new(shard_id),
            heartbeat_interval: Mutex::new(DEFAULT_HEARTBEAT_INTERVAL),
            writer: AsyncMutex::new(None),
            explicit_close: Mutex::new(None),
            kill: AtomicBool::new(false),
            handle: Mutex::new(None),
            config,
            registry,
            sink,
            state_tx,
            state_rx,
        })
    }

    /// Shard identity
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.config.shard_id
    }

    /// Construction-time configuration, including the opaque cache flags
    /// forwarded to collaborators
    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ShardState {
        *self.state_rx.borrow()
    }

    /// Snapshot of the session metadata
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.lock().clone()
    }

    /// Round-trip time of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.status.lock().latency()
    }

    /// Wait until the shard reaches the Ready state
    pub async fn wait_until_ready(&self) {
        self.wait_for_state(ShardState::Ready).await;
    }

    /// Wait until the shard reaches a given lifecycle state
    pub async fn wait_for_state(&self, target: ShardState) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// Start (or restart) the connection manager task
    ///
    /// Safe to call repeatedly: a live manager task is left alone, and a
    /// killed shard stays killed.
    pub fn connect(self: &Arc<Self>) {
        if self.kill.load(Ordering::SeqCst) {
            tracing::debug!(shard_id = self.config.shard_id, "Shard was killed, not connecting");
            return;
        }

        let mut handle = self.handle.lock();
        if let Some(task) = handle.as_ref() {
            if !task.is_finished() {
                tracing::debug!(shard_id = self.config.shard_id, "Shard manager already running");
                return;
            }
        }

        let shard = Arc::clone(self);
        *handle = Some(tokio::spawn(shard.socket_manager()));
    }

    /// Close the socket
    ///
    /// The code becomes the authoritative close code for reconnect
    /// classification. With `kill` the shard transitions to `Killed` once
    /// the loop exits and never reconnects.
    pub async fn close(&self, code: Option<u16>, kill: bool) -> ShardResult<()> {
        let code = code.unwrap_or(1000);
        *self.explicit_close.lock() = Some(code);
        if kill {
            self.kill.store(true, Ordering::SeqCst);
        }

        let mut writer = self.writer.lock().await;
        if let Some(socket) = writer.as_mut() {
            socket
                .send(Message::Close(Some(CloseFrame {
                    code: code.into(),
                    reason: "".into(),
                })))
                .await?;
        }
        Ok(())
    }

    /// Shut the shard down for good
    pub async fn kill(&self) -> ShardResult<()> {
        self.close(Some(1000), true).await
    }

    /// Send an application payload (presence updates, member-chunk requests)
    ///
    /// Blocks on the gateway send ratelimiter before writing.
    pub async fn send_payload(&self, op: OpCode, data: Value) -> ShardResult<()> {
        self.send(Envelope::raw(op, data), true).await
    }

    /// Serialize and write one envelope to the socket
    async fn send(&self, envelope: Envelope, ratelimit: bool) -> ShardResult<()> {
        if ratelimit {
            self.ratelimiter.block().await;
        }

        if self.config.debug_events {
            let raw = serde_json::to_value(&envelope).unwrap_or(Value::Null);
            self.sink.notify("raw_socket_sent", &[raw]);
        }

        let json = envelope.to_json()?;
        tracing::trace!(shard_id = self.config.shard_id, op = %envelope.op, "Sending gateway payload");

        {
            let mut writer = self.writer.lock().await;
            let socket = writer.as_mut().ok_or(ShardError::NotConnected)?;
            socket.send(Message::Text(json)).await?;
        }

        self.status.lock().update_send();
        Ok(())
    }

    /// Build and send a heartbeat from the last-known sequence
    async fn send_heartbeat(&self) -> ShardResult<()> {
        let envelope = {
            let mut status = self.status.lock();
            status.update_heartbeat();
            Envelope::heartbeat(status.sequence())
        };
        self.send(envelope, false).await
    }

    /// Cold-start handshake payload
    fn identify_envelope(&self) -> Envelope {
        Envelope::identify(&IdentifyPayload {
            token: self.config.token.clone(),
            intents: self.config.intents_bits(),
            properties: IdentifyProperties::current(),
            compress: true,
            large_threshold: LARGE_THRESHOLD,
            shard: self
                .config
                .shard_count
                .map(|count| [self.config.shard_id, count]),
        })
    }

    /// Warm-resume handshake payload
    ///
    /// Precondition fault when no session id is recorded.
    fn resume_envelope(&self) -> ShardResult<Envelope> {
        let status = self.status.lock();
        let session_id = status
            .session_id()
            .ok_or(ShardError::ResumeUnavailable)?
            .to_string();

        Ok(Envelope::resume(&ResumePayload {
            token: self.config.token.clone(),
            session_id,
            seq: status.sequence().unwrap_or(0),
        }))
    }

    fn set_state(&self, state: ShardState) {
        self.state_tx.send_replace(state);
    }

    // === Connection manager ===

    /// Reconnect-forever driver; one connection attempt at a time, each with
    /// a fresh frame decoder. Exits only on an operator kill.
    async fn socket_manager(self: Arc<Self>) {
        loop {
            // A kill can land while no socket is attached (mid-dial or
            // during the reconnect pause); honor it before dialing again
            if self.kill.load(Ordering::SeqCst) {
                self.set_state(ShardState::Killed);
                tracing::info!(shard_id = self.config.shard_id, "Shard killed");
                return;
            }

            let end = self.run_connection().await;

            // The old connection is gone; release the writer before
            // deciding what to do next.
            self.writer.lock().await.take();

            let explicit = self.explicit_close.lock().take();
            let kill = self.kill.load(Ordering::SeqCst);

            let (code, mut delay) = match end {
                ConnectionEnd::Closed(transport_code) => (explicit.or(transport_code), Duration::ZERO),
                ConnectionEnd::Fault(error) => {
                    // Session state is intact; the close code (if any) still
                    // decides between resume and re-identify.
                    tracing::debug!(
                        shard_id = self.config.shard_id,
                        error = %error,
                        "Shard connection fault"
                    );
                    (explicit, RECONNECT_DELAY)
                }
                ConnectionEnd::ConnectFailed(error) => {
                    tracing::error!(
                        shard_id = self.config.shard_id,
                        error = %error,
                        "Shard crashed while connecting"
                    );
                    self.status.lock().reset();
                    (explicit, RECONNECT_DELAY)
                }
            };

            match classify_close(code, kill) {
                CloseIntent::Terminal => {
                    self.set_state(ShardState::Killed);
                    tracing::info!(shard_id = self.config.shard_id, "Shard killed");
                    return;
                }
                CloseIntent::Resume => {
                    // Sequence and session id are kept; only the frame
                    // buffer dies with the connection.
                    self.dispatch_close_reason(
                        "Shard closed, attempting reconnect",
                        CloseIntent::Resume,
                    );
                }
                CloseIntent::FreshIdentify => {
                    self.status.lock().reset();

                    if was_normal_close(code) {
                        // Server closed normally without a kill request,
                        // likely load balancing; it wants a new session.
                        self.dispatch_close_reason(
                            "Shard closed, attempting new connection",
                            CloseIntent::FreshIdentify,
                        );
                    } else {
                        tracing::error!(
                            shard_id = self.config.shard_id,
                            close_code = ?code,
                            "Shard closed with a non-resumable code"
                        );
                        delay = RECONNECT_DELAY;
                    }
                }
            }

            self.set_state(ShardState::Reconnecting);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One connection attempt: open the socket and run the receive loop
    /// until the connection ends.
    async fn run_connection(&self) -> ConnectionEnd {
        self.set_state(ShardState::Connecting);

        let url = self.status.lock().websocket_url(self.config.api_version);
        tracing::debug!(shard_id = self.config.shard_id, url = %url, "Connecting to gateway");

        let stream = match connect_async(&url).await {
            Ok((stream, _response)) => stream,
            Err(error) => return ConnectionEnd::ConnectFailed(error.into()),
        };

        // A kill issued during the dial had no socket to close; drop the
        // fresh connection instead of handshaking on it
        if self.kill.load(Ordering::SeqCst) {
            return ConnectionEnd::Closed(None);
        }

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);

        // Fresh per connection: buffers never survive a reconnect
        let decoder = FrameDecoder::new();

        self.set_state(ShardState::AwaitingHello);

        match self.receive_loop(reader, decoder).await {
            Ok(code) => ConnectionEnd::Closed(code),
            Err(error) => ConnectionEnd::Fault(error),
        }
    }

    /// The receive/heartbeat loop
    ///
    /// The single suspension point is the bounded wait on the next inbound
    /// unit; the deadline equals the heartbeat interval so liveness is
    /// checked at least once per interval even with no traffic. A heartbeat
    /// is also sent at the top of every iteration when one is overdue,
    /// bounding worst-case heartbeat latency under continuous traffic.
    async fn receive_loop(&self, mut reader: WsReader, mut decoder: FrameDecoder) -> ShardResult<Option<u16>> {
        loop {
            let interval = *self.heartbeat_interval.lock();

            let overdue = {
                let status = self.status.lock();
                status
                    .last_heartbeat()
                    .is_none_or(|sent| sent.elapsed() > interval)
            };
            if overdue {
                tracing::trace!(shard_id = self.config.shard_id, "Heartbeat (interval elapsed)");
                self.send_heartbeat().await?;
            }

            match tokio::time::timeout(interval, reader.next()).await {
                Err(_) => {
                    // Nothing arrived inside the interval; heartbeat
                    // proactively rather than waiting for the next tick
                    tracing::trace!(shard_id = self.config.shard_id, "Heartbeat (receive timeout)");
                    self.send_heartbeat().await?;
                }
                Ok(None) => return Ok(None),
                Ok(Some(Err(error))) => return Err(error.into()),
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => self.handle_message(&text).await?,
                    Message::Binary(chunk) => {
                        if let Some(text) = decoder.feed(&chunk)? {
                            self.handle_message(&text).await?;
                        }
                    }
                    Message::Close(frame) => {
                        let code = frame.map(|f| u16::from(f.code));
                        tracing::debug!(
                            shard_id = self.config.shard_id,
                            close_code = ?code,
                            "Received close frame"
                        );
                        return Ok(code);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                },
            }
        }
    }

    // === Inbound handling ===

    /// Decode one complete JSON message and branch on its operation
    async fn handle_message(&self, raw: &str) -> ShardResult<()> {
        let envelope = Envelope::from_json(raw)?;

        if self.config.debug_events {
            let raw_value = serde_json::from_str(raw).unwrap_or(Value::Null);
            self.sink.notify("raw_socket_received", &[raw_value]);
        }

        // Sequence tracking is independent of which operation carries it
        {
            let mut status = self.status.lock();
            if let Some(sequence) = envelope.s {
                status.update_sequence(sequence);
            }
            status.tick();
        }

        match envelope.op {
            OpCode::Dispatch => self.handle_dispatch(&envelope),

            OpCode::Heartbeat => {
                // Server-initiated heartbeat request
                tracing::debug!(shard_id = self.config.shard_id, "Heartbeat (server request)");
                self.send_heartbeat().await?;
            }

            OpCode::HeartbeatAck => {
                let pre_ready = self.state() != ShardState::Ready;
                self.status.lock().ack(pre_ready);
                tracing::trace!(shard_id = self.config.shard_id, "Heartbeat ACK");
            }

            OpCode::Reconnect => {
                tracing::debug!(shard_id = self.config.shard_id, "Server requested reconnect");
                // 1013 = try again later; always resumable
                self.close(Some(1013), false).await?;
            }

            OpCode::InvalidateSession => {
                self.status.lock().reset();

                if envelope.invalidation_is_final() {
                    tracing::error!(
                        shard_id = self.config.shard_id,
                        "Session invalidated, starting over"
                    );
                } else {
                    tracing::warn!(
                        shard_id = self.config.shard_id,
                        "Session invalidated, resetting instance"
                    );
                }

                self.close(None, false).await?;
            }

            OpCode::Hello => {
                let hello = envelope
                    .as_hello()
                    .ok_or_else(|| ShardError::Protocol("Hello without heartbeat_interval".to_string()))?;
                *self.heartbeat_interval.lock() = Duration::from_millis(hello.heartbeat_interval);

                // The single fork between cold start and warm resume
                if self.status.lock().can_resume() {
                    tracing::debug!(shard_id = self.config.shard_id, "Resuming session");
                    self.set_state(ShardState::Resuming);
                    let resume = self.resume_envelope()?;
                    self.send(resume, false).await?;
                } else {
                    tracing::debug!(shard_id = self.config.shard_id, "Identifying");
                    self.set_state(ShardState::Identifying);
                    let identify = self.identify_envelope();
                    self.send(identify, false).await?;
                }
            }

            // Client-only ops are never expected inbound
            _ => {}
        }

        Ok(())
    }

    /// Route a named dispatch event
    ///
    /// READY and RESUMED are handled here before generic dispatch; every
    /// named event then goes through the parser registry, and an event with
    /// no registered parser is dropped silently.
    fn handle_dispatch(&self, envelope: &Envelope) {
        let Some(name) = envelope.t.as_deref() else {
            return;
        };

        match name {
            "READY" => {
                if let Some(ready) = envelope.as_ready() {
                    self.status.lock().update_ready_data(&ready);
                } else {
                    tracing::warn!(
                        shard_id = self.config.shard_id,
                        "READY without session data, resume will not be possible"
                    );
                }
                self.set_state(ShardState::Ready);
                self.notify_lifecycle("shard_ready", "Shard ready");
            }
            "RESUMED" => {
                self.set_state(ShardState::Ready);
                self.notify_lifecycle("shard_resumed", "Shard resumed");
            }
            _ => {}
        }

        let folded = name.to_lowercase();
        let Some(parser) = self.registry.resolve(&folded) else {
            return;
        };

        let data = envelope.d.clone().unwrap_or(Value::Null);
        match parser(data) {
            Ok(args) => self.sink.notify(&folded, &args),
            Err(error) => {
                // One bad event must never terminate the connection
                tracing::error!(
                    shard_id = self.config.shard_id,
                    event = %folded,
                    error = %error,
                    "Error while parsing event"
                );
            }
        }
    }

    // === Notifications ===

    /// Raise a lifecycle notification, falling back to a log line when
    /// nothing is subscribed
    fn notify_lifecycle(&self, event: &str, fallback: &str) {
        if self.sink.has_subscribers(event) {
            self.sink.notify(event, &[json!(self.config.shard_id)]);
        } else {
            tracing::info!(shard_id = self.config.shard_id, "{fallback}");
        }
    }

    /// Raise a `shard_closed` notification with a close-type tag
    fn dispatch_close_reason(&self, reason: &str, intent: CloseIntent) {
        if self.sink.has_subscribers("shard_closed") {
            self.sink
                .notify("shard_closed", &[json!(self.config.shard_id), json!(intent.as_str())]);
        } else {
            tracing::warn!(
                shard_id = self.config.shard_id,
                close_type = %intent,
                "{reason}"
            );
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("shard_id", &self.config.shard_id)
            .field("state", &self.state())
            .finish()
    }
}
