use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Named one-shot timers that deliver an event into the owning loop.
///
/// Scheduling an activity aborts its previous not-yet-fired occurrence, so each
/// name has at most one pending firing. The loop re-arms an activity after
/// handling it.
pub struct Scheduler<E> {
    tx: mpsc::Sender<E>,
    pending: HashMap<&'static str, JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: mpsc::Sender<E>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            cancel,
        }
    }

    pub fn schedule(&mut self, name: &'static str, delay: Duration, event: E) {
        if let Some(previous) = self.pending.remove(name) {
            if !previous.is_finished() {
                debug!("[SCHEDULER] Replacing pending '{}'", name);
            }
            previous.abort();
        }

        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if tx.send(event).await.is_err() {
                        trace!("[SCHEDULER] Receiver gone, dropping '{}'", name);
                    }
                }
            }
        });
        self.pending.insert(name, handle);
    }

    /// Returns true if a not-yet-fired occurrence was cancelled
    pub fn cancel(&mut self, name: &str) -> bool {
        match self.pending.remove(name) {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (name, handle) in self.pending.drain() {
            handle.abort();
            trace!("[SCHEDULER] Cancelled '{}'", name);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|h| !h.is_finished()).count()
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}
