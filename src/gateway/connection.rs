//! Connection supervisor and handshake state machine.
//!
//! [`Gateway`] owns the physical transport for its lifetime. One run loop
//! connects, drives a single connection until it closes, tears down the
//! per-connection tasks, and reconnects after a fixed delay, forever,
//! unless the caller requests a terminal disconnect. Reconnection is
//! deliberately unbounded: a long-running bot must eventually get back on.
//!
//! The inbound read loop is the only writer of session and connection
//! state. The heartbeat scheduler and the send-queue pump run as separate
//! tasks against the same connection, synchronized through the connection
//! epoch and torn down before the next connect attempt starts.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::presence::PresenceUpdate;

use super::frame::{GatewayFrame, Hello, Opcode};
use super::heartbeat::Heartbeat;
use super::send_queue::{SendQueue, spawn_pump};
use super::session::{SessionInfo, SharedSession};
use super::{CloseReason, ConnectionState, Epoch};

/// Dispatch event that completes a new-session handshake.
const READY_EVENT: &str = "READY";

/// Dispatch event that completes a resumed-session handshake.
const RESUMED_EVENT: &str = "RESUMED";

/// Close code sent when the client deliberately closes to reconnect.
const RECONNECT_CLOSE_CODE: u16 = 4000;

/// Capacity of the per-connection writer channel.
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Bounds of the randomized delay before re-identifying after a
/// non-resumable invalid session, in milliseconds.
const REIDENTIFY_JITTER_MS: std::ops::Range<u64> = 1_000..5_000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Persistent gateway connection manager.
///
/// Create one per bot process with [`Gateway::new`], register listeners on
/// the shared [`EventDispatcher`], then call [`Gateway::run`] (typically in
/// a spawned task). At most one `run` may be active per instance.
#[derive(Debug)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    dispatcher: EventDispatcher,
    session: SharedSession,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    queue_slot: Arc<Mutex<Option<SendQueue>>>,
    epoch_counter: Arc<AtomicU64>,
}

impl Gateway {
    /// Creates a gateway bound to a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid. This is
    /// the only fatal error in the subsystem; everything past this point
    /// is recovered by reconnecting.
    pub fn new(config: GatewayConfig, dispatcher: EventDispatcher) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            session: SharedSession::new(),
            state_tx,
            shutdown_tx,
            queue_slot: Arc::new(Mutex::new(None)),
            epoch_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Returns a receiver that observes connection state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Copy of the current session identity.
    #[must_use]
    pub fn session(&self) -> SessionInfo {
        self.session.snapshot()
    }

    /// Enqueues an outbound frame on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no transport is open.
    pub fn send(&self, frame: GatewayFrame) -> Result<()> {
        let slot = self
            .queue_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(queue) => {
                queue.enqueue(frame);
                Ok(())
            }
            None => Err(Error::NotConnected),
        }
    }

    /// Enqueues a presence/status update (op 3).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no transport is open, or
    /// [`Error::Decode`] if the update cannot be serialized.
    pub fn update_presence(&self, update: &PresenceUpdate) -> Result<()> {
        let d = serde_json::to_value(update)?;
        self.send(GatewayFrame::outbound(Opcode::PresenceUpdate, d))
    }

    /// Requests a terminal disconnect.
    ///
    /// Clears the session (it is not resumable after an explicit
    /// disconnect) and stops the run loop after the current connection
    /// tears down.
    pub fn disconnect(&self) {
        self.state_tx.send_replace(ConnectionState::Closing);
        self.session.clear();
        self.shutdown_tx.send_replace(true);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Drives the connection until [`Gateway::disconnect`] is called.
    ///
    /// Opens the transport, processes the connection until it closes, then
    /// reconnects after [`GatewayConfig::reconnect_delay`]. Transport and
    /// protocol failures are logged and recovered; there is no retry cap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if self.is_shutdown() {
                break;
            }

            let epoch = Epoch::next(&self.epoch_counter);
            self.set_state(ConnectionState::Connecting);
            tracing::info!(url = %self.config.gateway_url, "connecting to gateway");

            match connect_async(self.config.gateway_url.as_str()).await {
                Ok((stream, _response)) => {
                    self.set_state(ConnectionState::AwaitingHello);
                    tracing::info!("transport open, awaiting hello");
                    self.drive_connection(stream, epoch).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gateway connect failed");
                }
            }

            *self
                .queue_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            self.set_state(ConnectionState::Disconnected);

            if self.is_shutdown() {
                break;
            }
            tracing::info!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "reconnecting after delay"
            );
            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Runs one connection from transport-open to transport-close.
    ///
    /// Spawns the writer task and the send-queue pump, then processes
    /// inbound frames one at a time in arrival order. All per-connection
    /// tasks are torn down before this returns, so nothing started under
    /// this epoch can touch the next connection.
    async fn drive_connection(&self, stream: WsStream, epoch: Epoch) {
        let (ws_tx, mut ws_rx) = stream.split();

        let (out_tx, out_rx) = mpsc::channel::<Message>(WRITER_CHANNEL_CAPACITY);
        let writer = tokio::spawn(write_loop(ws_tx, out_rx));

        let (queue, frame_rx) = SendQueue::new();
        let pump = spawn_pump(frame_rx, out_tx.clone());
        *self
            .queue_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(queue.clone());

        let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(4);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut ctx = ConnectionContext {
            config: Arc::clone(&self.config),
            session: self.session.clone(),
            queue,
            dispatcher: self.dispatcher.clone(),
            heartbeat: None,
            close_tx,
            state_tx: self.state_tx.clone(),
            epoch,
        };

        loop {
            // A disconnect requested while the transport was still opening
            // is already latched in the watch channel; changed() alone
            // would never observe it.
            if *shutdown_rx.borrow_and_update() {
                tracing::info!("disconnect requested");
                let _ = out_tx.send(Message::Close(None)).await;
                break;
            }
            tokio::select! {
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<GatewayFrame>(text.as_str()) {
                            Ok(frame) => {
                                if let Some(reason) = ctx.handle_frame(frame) {
                                    tracing::info!(?reason, "closing transport");
                                    send_close(&out_tx, reason).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                // A single bad frame never tears down the
                                // connection; drop it and keep reading.
                                tracing::warn!(error = %e, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        tracing::info!(?close, "transport closed by remote");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        // Errors defer to the close event that follows.
                        tracing::error!(error = %e, "transport error");
                    }
                    None => {
                        tracing::info!("transport stream ended");
                        break;
                    }
                },
                Some(reason) = close_rx.recv() => {
                    tracing::info!(?reason, "closing transport");
                    send_close(&out_tx, reason).await;
                    break;
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("disconnect requested");
                    let _ = out_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        // Teardown order matters: heartbeat and pump must stop before the
        // epoch moves on, so stale timers cannot reach the next connection.
        ctx.heartbeat.take();
        pump.abort();
        drop(out_tx);
        let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    }
}

/// Sends a deliberate close frame, best effort.
async fn send_close(out_tx: &mpsc::Sender<Message>, reason: CloseReason) {
    let frame = CloseFrame {
        code: CloseCode::from(RECONNECT_CLOSE_CODE),
        reason: format!("{reason:?}").into(),
    };
    let _ = out_tx.send(Message::Close(Some(frame))).await;
}

/// Writes queued messages to the transport until the channel closes.
///
/// A write failure drops the message; the read side observes the close
/// and the supervisor reconnects.
async fn write_loop(mut ws_tx: WsSink, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = ws_tx.send(msg).await {
            tracing::debug!(error = %e, "write failed, frame dropped");
        }
    }
    let _ = ws_tx.close().await;
}

/// Per-connection wiring handed to the inbound frame handler.
///
/// The frame handler is the single writer of session and connection state;
/// it runs one frame at a time, in arrival order.
struct ConnectionContext {
    config: Arc<GatewayConfig>,
    session: SharedSession,
    queue: SendQueue,
    dispatcher: EventDispatcher,
    heartbeat: Option<Heartbeat>,
    close_tx: mpsc::Sender<CloseReason>,
    state_tx: watch::Sender<ConnectionState>,
    epoch: Epoch,
}

impl ConnectionContext {
    /// Reacts to one inbound frame.
    ///
    /// Returns the reason to close the transport, if any. Every frame with
    /// a non-null sequence number updates the session sequence before any
    /// opcode-specific handling.
    fn handle_frame(&mut self, frame: GatewayFrame) -> Option<CloseReason> {
        if let Some(s) = frame.s {
            self.session.observe_sequence(s);
        }

        match frame.op {
            Opcode::Hello => self.on_hello(&frame),
            Opcode::Dispatch => self.on_dispatch(frame),
            Opcode::Reconnect => {
                // Session stays resumable; the next Hello triggers Resume.
                Some(CloseReason::ReconnectRequested)
            }
            Opcode::InvalidSession => self.on_invalid_session(&frame),
            Opcode::HeartbeatAck => {
                if let Some(hb) = &self.heartbeat {
                    hb.ack();
                }
                None
            }
            op @ (Opcode::Heartbeat | Opcode::Identify | Opcode::PresenceUpdate | Opcode::Resume) => {
                tracing::warn!(?op, "ignoring client-to-server opcode from remote");
                None
            }
        }
    }

    fn on_hello(&mut self, frame: &GatewayFrame) -> Option<CloseReason> {
        let hello: Hello = match serde_json::from_value(frame.d.clone()) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!(error = %e, "dropping hello with malformed payload");
                return None;
            }
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        tracing::debug!(interval_ms = hello.heartbeat_interval, "hello received");
        self.heartbeat = Some(Heartbeat::start(
            interval,
            self.queue.clone(),
            self.session.clone(),
            self.close_tx.clone(),
            self.epoch.clone(),
        ));

        match self.session.resume_params() {
            Some((session_id, sequence)) => {
                tracing::info!(%session_id, ?sequence, "resuming session");
                self.state_tx.send_replace(ConnectionState::Resuming);
                self.queue
                    .enqueue(GatewayFrame::resume(&self.config.token, &session_id, sequence));
            }
            None => {
                tracing::info!("identifying as a new session");
                self.state_tx.send_replace(ConnectionState::Identifying);
                self.queue.enqueue(GatewayFrame::identify(&self.config));
            }
        }
        None
    }

    fn on_dispatch(&mut self, frame: GatewayFrame) -> Option<CloseReason> {
        let Some(name) = frame.t else {
            tracing::warn!("dropping dispatch without an event name");
            return None;
        };

        if name == READY_EVENT {
            if let Some(session_id) = frame.d.get("session_id").and_then(|v| v.as_str()) {
                self.session.set_session_id(session_id);
            }
            self.state_tx.send_replace(ConnectionState::Ready);
            tracing::info!(session = ?self.session.resume_params().map(|p| p.0), "session ready");
        } else if name == RESUMED_EVENT {
            self.state_tx.send_replace(ConnectionState::Ready);
            tracing::info!("session resumed");
        }

        tracing::debug!(event = %name, sequence = ?frame.s, "dispatch");
        self.dispatcher.emit(name, frame.d);
        None
    }

    fn on_invalid_session(&mut self, frame: &GatewayFrame) -> Option<CloseReason> {
        let resumable = frame.d.as_bool().unwrap_or(false);
        tracing::warn!(resumable, "session invalidated");
        if resumable {
            // Close and let the supervisor reconnect; the retained session
            // turns the next Hello into a Resume.
            return Some(CloseReason::SessionInvalidated);
        }

        self.session.clear();

        // Re-identify on this connection after a randomized delay so a
        // fleet of bots does not stampede the gateway in unison.
        let delay = Duration::from_millis(rand::rng().random_range(REIDENTIFY_JITTER_MS));
        let queue = self.queue.clone();
        let config = Arc::clone(&self.config);
        let epoch = self.epoch.clone();
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !epoch.is_current() {
                return;
            }
            state_tx.send_replace(ConnectionState::Identifying);
            queue.enqueue(GatewayFrame::identify(&config));
        });
        None
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn test_ctx() -> (
        ConnectionContext,
        mpsc::UnboundedReceiver<GatewayFrame>,
        mpsc::Receiver<CloseReason>,
    ) {
        let Ok(config) = GatewayConfig::new("test-token", 513) else {
            panic!("config");
        };
        let (queue, frame_rx) = SendQueue::new();
        let (close_tx, close_rx) = mpsc::channel(4);
        let (state_tx, _) = watch::channel(ConnectionState::AwaitingHello);
        let ctx = ConnectionContext {
            config: Arc::new(config),
            session: SharedSession::new(),
            queue,
            dispatcher: EventDispatcher::new(),
            heartbeat: None,
            close_tx,
            state_tx,
            epoch: Epoch::next(&Arc::new(AtomicU64::new(0))),
        };
        (ctx, frame_rx, close_rx)
    }

    fn hello_frame(interval_ms: u64) -> GatewayFrame {
        GatewayFrame {
            op: Opcode::Hello,
            d: json!({ "heartbeat_interval": interval_ms }),
            s: None,
            t: None,
        }
    }

    fn dispatch_frame(name: &str, s: Option<u64>, d: serde_json::Value) -> GatewayFrame {
        GatewayFrame {
            op: Opcode::Dispatch,
            d,
            s,
            t: Some(name.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hello_without_session_enqueues_exactly_one_identify() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();

        assert_eq!(ctx.handle_frame(hello_frame(600_000)), None);

        let Ok(frame) = frame_rx.try_recv() else {
            panic!("expected an identify frame");
        };
        assert_eq!(frame.op, Opcode::Identify);
        assert_eq!(frame.d["token"], "test-token");
        assert!(frame_rx.try_recv().is_err(), "no other frame expected");
        assert!(ctx.heartbeat.is_some());
        assert_eq!(*ctx.state_tx.borrow(), ConnectionState::Identifying);
    }

    #[tokio::test(start_paused = true)]
    async fn hello_with_session_enqueues_exactly_one_resume() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();
        ctx.session.set_session_id("abc");
        ctx.session.observe_sequence(42);

        assert_eq!(ctx.handle_frame(hello_frame(600_000)), None);

        let Ok(frame) = frame_rx.try_recv() else {
            panic!("expected a resume frame");
        };
        assert_eq!(frame.op, Opcode::Resume);
        assert_eq!(frame.d["session_id"], "abc");
        assert_eq!(frame.d["seq"], 42);
        assert!(frame_rx.try_recv().is_err(), "no identify expected");
        assert_eq!(*ctx.state_tx.borrow(), ConnectionState::Resuming);
    }

    #[tokio::test(start_paused = true)]
    async fn hello_schedules_first_beat_within_one_interval() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();
        let interval_ms = 41_250;
        ctx.handle_frame(hello_frame(interval_ms));

        // Identify first, then the jittered first heartbeat.
        assert!(frame_rx.try_recv().is_ok());
        let start = Instant::now();
        let Some(beat) = frame_rx.recv().await else {
            panic!("expected a heartbeat");
        };
        assert_eq!(beat.op, Opcode::Heartbeat);
        assert!(start.elapsed() < Duration::from_millis(interval_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_is_monotonic_and_every_dispatch_is_published() {
        let (mut ctx, _frame_rx, _close_rx) = test_ctx();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        ctx.dispatcher.on("MESSAGE_CREATE", move |data| {
            let _ = seen_tx.send(data.clone());
        });

        ctx.handle_frame(dispatch_frame("MESSAGE_CREATE", Some(5), json!({"id": 1})));
        ctx.handle_frame(dispatch_frame("MESSAGE_CREATE", Some(3), json!({"id": 2})));

        assert_eq!(ctx.session.last_sequence(), Some(5));
        // Both frames are still published, in arrival order.
        assert_eq!(seen_rx.recv().await.map(|d| d["id"].clone()), Some(json!(1)));
        assert_eq!(seen_rx.recv().await.map(|d| d["id"].clone()), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_captures_the_session_id() {
        let (mut ctx, _frame_rx, _close_rx) = test_ctx();

        ctx.handle_frame(dispatch_frame(
            "READY",
            Some(1),
            json!({ "session_id": "abc", "user": { "username": "bot" } }),
        ));

        assert_eq!(
            ctx.session.resume_params(),
            Some(("abc".to_string(), Some(1)))
        );
        assert_eq!(*ctx.state_tx.borrow(), ConnectionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_request_closes_with_the_session_retained() {
        let (mut ctx, _frame_rx, _close_rx) = test_ctx();
        ctx.session.set_session_id("abc");

        let reason = ctx.handle_frame(GatewayFrame {
            op: Opcode::Reconnect,
            d: serde_json::Value::Null,
            s: None,
            t: None,
        });

        assert_eq!(reason, Some(CloseReason::ReconnectRequested));
        assert!(ctx.session.resume_params().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resumable_invalid_session_closes_with_the_session_retained() {
        let (mut ctx, _frame_rx, _close_rx) = test_ctx();
        ctx.session.set_session_id("abc");

        let reason = ctx.handle_frame(GatewayFrame {
            op: Opcode::InvalidSession,
            d: json!(true),
            s: None,
            t: None,
        });

        assert_eq!(reason, Some(CloseReason::SessionInvalidated));
        assert!(ctx.session.resume_params().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_invalid_session_clears_state_then_reidentifies_after_jitter() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();
        ctx.session.set_session_id("abc");
        ctx.session.observe_sequence(42);

        let reason = ctx.handle_frame(GatewayFrame {
            op: Opcode::InvalidSession,
            d: json!(false),
            s: None,
            t: None,
        });
        assert_eq!(reason, None);

        // Cleared before the fresh identify is enqueued.
        assert_eq!(ctx.session.snapshot(), SessionInfo::default());
        assert!(frame_rx.try_recv().is_err(), "identify must not be immediate");

        let start = Instant::now();
        let Some(frame) = frame_rx.recv().await else {
            panic!("expected a fresh identify");
        };
        assert_eq!(frame.op, Opcode::Identify);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed < Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ack_clears_the_awaiting_flag() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();
        ctx.handle_frame(hello_frame(600_000));

        // Identify, then wait for the first beat so an ack is pending.
        assert!(frame_rx.try_recv().is_ok());
        assert!(frame_rx.recv().await.is_some());
        let Some(hb) = ctx.heartbeat.as_ref() else {
            panic!("heartbeat should be running");
        };
        assert!(hb.awaiting_ack());

        ctx.handle_frame(GatewayFrame {
            op: Opcode::HeartbeatAck,
            d: serde_json::Value::Null,
            s: None,
            t: None,
        });
        let Some(hb) = ctx.heartbeat.as_ref() else {
            panic!("heartbeat should be running");
        };
        assert!(!hb.awaiting_ack());
    }

    #[tokio::test(start_paused = true)]
    async fn any_frame_with_a_sequence_updates_the_session() {
        let (mut ctx, _frame_rx, _close_rx) = test_ctx();

        ctx.handle_frame(GatewayFrame {
            op: Opcode::HeartbeatAck,
            d: serde_json::Value::Null,
            s: Some(10),
            t: None,
        });

        assert_eq!(ctx.session.last_sequence(), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_hello_payload_is_dropped() {
        let (mut ctx, mut frame_rx, _close_rx) = test_ctx();

        let reason = ctx.handle_frame(GatewayFrame {
            op: Opcode::Hello,
            d: json!({ "unexpected": true }),
            s: None,
            t: None,
        });

        assert_eq!(reason, None);
        assert!(ctx.heartbeat.is_none());
        assert!(frame_rx.try_recv().is_err());
    }
}
