//! Gateway layer: wire format, session state, send queue, heartbeat, and
//! the connection supervisor.
//!
//! One [`Gateway`](connection::Gateway) owns one transport at a time and
//! reconnects it forever. Per-connection tasks (heartbeat, queue pump,
//! writer) are tagged with a connection [`Epoch`] so timers started under
//! a previous connection recognize they are stale and no-op.

pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod send_queue;
pub mod session;

pub use connection::Gateway;
pub use frame::{GatewayFrame, Opcode};
pub use send_queue::SendQueue;
pub use session::{SessionInfo, SharedSession};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of the gateway connection.
///
/// Owned exclusively by the connection supervisor; transitions are driven
/// only by transport events and handshake decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; the supervisor is idle or between reconnect attempts.
    #[default]
    Disconnected,
    /// A transport connect attempt is in flight.
    Connecting,
    /// Transport open, waiting for the server's Hello.
    AwaitingHello,
    /// Hello received with no prior session; Identify enqueued.
    Identifying,
    /// Hello received with a retained session; Resume enqueued.
    Resuming,
    /// Handshake complete; dispatch events are flowing.
    Ready,
    /// The caller requested a terminal disconnect.
    Closing,
}

/// Why the read loop is deliberately closing the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The server requested a reconnect (op 7). Session stays resumable.
    ReconnectRequested,
    /// The server invalidated the session but flagged it resumable (op 9).
    SessionInvalidated,
    /// The previous heartbeat was never acknowledged.
    ZombieConnection,
}

/// Monotonically increasing connection generation counter.
///
/// A new value is taken for every connect attempt. Tasks spawned for a
/// connection capture its epoch and check [`Epoch::is_current`] before
/// acting, so a timer that outlives its connection cannot touch the next
/// one.
#[derive(Debug, Clone)]
pub struct Epoch {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl Epoch {
    /// Increments the shared counter and returns the new epoch.
    #[must_use]
    pub fn next(counter: &Arc<AtomicU64>) -> Self {
        let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            counter: Arc::clone(counter),
            value,
        }
    }

    /// Returns `true` while no newer connection attempt has started.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }
}
