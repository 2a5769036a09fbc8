//! The session readiness gate.
//!
//! No response may be generated before the session's instructions and tool
//! manifest have been acknowledged by the remote service. The gate opens on
//! the acknowledgement event or on a bounded timeout, whichever comes
//! first; both paths funnel through [`ReadinessGate::mark_ready`], which
//! reports whether this call performed the transition.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

pub struct ReadinessGate {
    ready: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            ready: AtomicBool::new(false),
            tx,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Opens the gate. Returns `true` only for the call that performed the
    /// transition, so acknowledgement and timeout can race safely.
    pub fn mark_ready(&self) -> bool {
        let first = !self.ready.swap(true, Ordering::SeqCst);
        if first {
            let _ = self.tx.send(true);
        }
        first
    }

    /// Waits until the gate is open.
    pub async fn wait_ready(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
