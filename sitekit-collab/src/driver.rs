//! Async event loop for a live session.
//!
//! The session itself is synchronous; this loop owns the waiting. It feeds
//! inbound envelopes in arrival order, sleeps until the session's next
//! timer deadline, and runs teardown when asked to stop or when the
//! transport goes away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard, Notify};

use crate::session::{CollabSession, TeardownReport};
use crate::transport::Inbox;

/// Upper bound on a single idle wait; deadlines are re-read after it.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(60);

/// Session shared between the driver and the UI layer issuing local actions.
pub struct SessionHandle {
    session: Mutex<CollabSession>,
    wake: Notify,
}

impl SessionHandle {
    pub fn new(session: CollabSession) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            wake: Notify::new(),
        })
    }

    /// Run a local action, then wake the driver so new deadlines are honored.
    pub async fn with<R>(&self, action: impl FnOnce(&mut CollabSession) -> R) -> R {
        let out = action(&mut *self.session.lock().await);
        self.wake.notify_one();
        out
    }

    /// Direct access for reads. Timer changes made through the guard are
    /// only noticed at the driver's next wake-up.
    pub async fn lock(&self) -> MutexGuard<'_, CollabSession> {
        self.session.lock().await
    }
}

/// Run the session until `shutdown` flips to `true` (or its sender drops)
/// or the inbox closes, then tear it down.
pub async fn drive(
    handle: Arc<SessionHandle>,
    mut inbox: Inbox,
    mut shutdown: watch::Receiver<bool>,
) -> TeardownReport {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = handle
            .lock()
            .await
            .until_next_deadline()
            .unwrap_or(MAX_IDLE_WAIT)
            .min(MAX_IDLE_WAIT);

        tokio::select! {
            env = inbox.recv() => match env {
                Some(env) => handle.lock().await.handle_envelope(env),
                None => {
                    log::info!("Transport closed, ending session");
                    break;
                }
            },
            _ = tokio::time::sleep(wait) => {
                let report = handle.lock().await.tick();
                if !report.pruned.is_empty() {
                    log::debug!("Pruned {} idle peers", report.pruned.len());
                }
            }
            _ = handle.wake.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    let report = handle.lock().await.teardown();
    log::debug!("Session teardown: {report:?}");
    report
}
