//! Process-wide session arbitration.
//!
//! At most one session start may be in flight, and at most one transport may
//! be current. Frameworks that invoke startup twice in rapid succession hit
//! the start lock; a new session that wins the lock must close the previous
//! transport before wiring its own. The lock is an RAII permit so every exit
//! path, including errors, releases it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SessionError;
use crate::session::SessionHandle;

#[derive(Default)]
pub struct SessionArbiter {
    starting: Arc<AtomicBool>,
    seq: AtomicU64,
    current: Mutex<Option<SessionHandle>>,
}

impl SessionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the start lock. Fails when another start is in flight.
    pub fn begin_start(&self) -> Result<StartPermit, SessionError> {
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(SessionError::StartInProgress);
        }
        debug!("session start lock taken");
        Ok(StartPermit {
            flag: Arc::clone(&self.starting),
        })
    }

    /// Allocates the next session sequence number. Sequence numbers
    /// disambiguate stale callbacks from the current session across rapid
    /// restarts.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Removes and returns the current session, if any. The caller must end
    /// it before installing a successor.
    pub async fn take_current(&self) -> Option<SessionHandle> {
        self.current.lock().await.take()
    }

    pub async fn set_current(&self, handle: SessionHandle) {
        *self.current.lock().await = Some(handle);
    }
}

/// RAII guard over the start lock.
pub struct StartPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for StartPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        debug!("session start lock released");
    }
}
