//! Outbound send queue with control-plane rate limiting.
//!
//! All outbound frames pass through a single FIFO queue consumed by one
//! pump task, so no frame is ever written in parallel with another. After
//! transmitting a frame the pump waits a per-opcode minimum interval:
//! Identify is limited to one per 5.1 s, everything else to one per 550 ms.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::frame::{GatewayFrame, Opcode};

/// Minimum interval after sending an Identify frame.
pub(crate) const IDENTIFY_SEND_DELAY: Duration = Duration::from_millis(5100);

/// Minimum interval after sending any other frame.
pub(crate) const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(550);

/// Cloneable enqueue handle to a connection's send queue.
///
/// Frames are immutable once enqueued and transmitted in exactly the order
/// they were enqueued. The queue lives for one connection; a fresh
/// connection starts from an empty queue.
#[derive(Debug, Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<GatewayFrame>,
}

impl SendQueue {
    /// Creates a queue handle and the receiver its pump consumes.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Appends a frame to the tail of the queue.
    ///
    /// If the pump has already shut down the frame is dropped; queued
    /// frames do not survive a transport close.
    pub fn enqueue(&self, frame: GatewayFrame) {
        if self.tx.send(frame).is_err() {
            tracing::trace!("send queue pump gone, dropping frame");
        }
    }
}

/// Spawns the single-consumer pump for a connection.
///
/// The pump serializes each frame and forwards it to the connection's
/// writer task through `out_tx`. A send error means the transport is gone;
/// the frame is dropped without retry. The pump parks on an empty queue
/// and is re-armed by the next enqueue.
pub fn spawn_pump(
    mut rx: mpsc::UnboundedReceiver<GatewayFrame>,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let delay = send_delay(frame.op);
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if out_tx.send(Message::text(json)).await.is_err() {
                        tracing::trace!(op = ?frame.op, "transport closed, dropping frame");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, op = ?frame.op, "failed to encode outbound frame");
                }
            }
            tokio::time::sleep(delay).await;
        }
    })
}

/// Returns the minimum interval to wait after sending a frame.
fn send_delay(op: Opcode) -> Duration {
    if op == Opcode::Identify {
        IDENTIFY_SEND_DELAY
    } else {
        DEFAULT_SEND_DELAY
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn frame(op: Opcode, marker: u64) -> GatewayFrame {
        GatewayFrame::outbound(op, json!({ "marker": marker }))
    }

    fn marker_of(msg: &Message) -> u64 {
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            panic!("expected json frame");
        };
        value["d"]["marker"].as_u64().unwrap_or(u64::MAX)
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_transmitted_in_fifo_order() {
        let (queue, rx) = SendQueue::new();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let pump = spawn_pump(rx, out_tx);

        for marker in [1, 2, 3] {
            queue.enqueue(frame(Opcode::Heartbeat, marker));
        }

        for expected in [1, 2, 3] {
            let Some(msg) = out_rx.recv().await else {
                panic!("pump stopped early");
            };
            assert_eq!(marker_of(&msg), expected);
        }
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_sends_are_spaced_by_the_default_delay() {
        let (queue, rx) = SendQueue::new();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let pump = spawn_pump(rx, out_tx);

        queue.enqueue(frame(Opcode::Heartbeat, 1));
        queue.enqueue(frame(Opcode::Heartbeat, 2));

        let start = Instant::now();
        assert!(out_rx.recv().await.is_some());
        assert!(out_rx.recv().await.is_some());
        assert!(start.elapsed() >= DEFAULT_SEND_DELAY);
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn identify_is_spaced_by_the_identify_delay() {
        let (queue, rx) = SendQueue::new();
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let pump = spawn_pump(rx, out_tx);

        queue.enqueue(frame(Opcode::Identify, 1));
        queue.enqueue(frame(Opcode::Heartbeat, 2));

        let start = Instant::now();
        assert!(out_rx.recv().await.is_some());
        assert!(out_rx.recv().await.is_some());
        assert!(start.elapsed() >= IDENTIFY_SEND_DELAY);
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_dropped_when_the_writer_is_gone() {
        let (queue, rx) = SendQueue::new();
        let (out_tx, out_rx) = mpsc::channel(16);
        drop(out_rx);
        let pump = spawn_pump(rx, out_tx);

        // Must not wedge the pump; the task keeps draining.
        queue.enqueue(frame(Opcode::Heartbeat, 1));
        queue.enqueue(frame(Opcode::Heartbeat, 2));
        tokio::time::sleep(DEFAULT_SEND_DELAY * 3).await;
        assert!(!pump.is_finished());
        pump.abort();
    }
}
