//! Heartbeat scheduler.
//!
//! Keeps the connection alive and detects silent failures. The first beat
//! fires after `interval * random(0, 1)` so that many connections started
//! together do not beat in lockstep; subsequent beats fire at the fixed
//! interval. If a beat comes due while the previous one was never
//! acknowledged, the connection is a zombie: the scheduler signals the
//! read loop to close the transport instead of pinging a dead socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::frame::GatewayFrame;
use super::send_queue::SendQueue;
use super::session::SharedSession;
use super::{CloseReason, Epoch};

/// Handle to a running heartbeat task.
///
/// Dropping the handle cancels any pending timer; the task never fires
/// after the owning connection has torn it down.
#[derive(Debug)]
pub struct Heartbeat {
    awaiting_ack: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Starts the scheduler with the server-announced interval.
    #[must_use]
    pub fn start(
        interval: Duration,
        queue: SendQueue,
        session: SharedSession,
        close_tx: mpsc::Sender<CloseReason>,
        epoch: Epoch,
    ) -> Self {
        let awaiting_ack = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&awaiting_ack);
        let task = tokio::spawn(async move {
            run(interval, queue, session, close_tx, epoch, flag).await;
        });
        Self { awaiting_ack, task }
    }

    /// Marks the most recent heartbeat as acknowledged.
    pub fn ack(&self) {
        self.awaiting_ack.store(false, Ordering::SeqCst);
    }

    /// Whether a heartbeat is still waiting for its ack.
    #[must_use]
    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack.load(Ordering::SeqCst)
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    interval: Duration,
    queue: SendQueue,
    session: SharedSession,
    close_tx: mpsc::Sender<CloseReason>,
    epoch: Epoch,
    awaiting_ack: Arc<AtomicBool>,
) {
    // Jittered first beat avoids thundering-herd beats across connections.
    let first = interval.mul_f64(rand::random::<f64>());
    tokio::time::sleep(first).await;

    loop {
        if awaiting_ack.swap(true, Ordering::SeqCst) {
            // Previous beat was never acknowledged.
            tracing::warn!("heartbeat ack missing, treating connection as zombie");
            if epoch.is_current() {
                let _ = close_tx.send(CloseReason::ZombieConnection).await;
            }
            return;
        }
        queue.enqueue(GatewayFrame::heartbeat(session.last_sequence()));
        tokio::time::sleep(interval).await;
    }
}
